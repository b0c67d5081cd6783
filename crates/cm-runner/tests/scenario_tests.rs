//! End-to-end migration scenarios against on-disk databases.
//!
//! The JSON steps under `fixtures/migrations` recreate part of the
//! back-office schema: users, profiles, time-off reset dates and purchase
//! orders.

use cm_core::{Collection, CollectionType, Field, FieldKind};
use cm_db::DbOptions;
use cm_meta::{MetaDb, MetaError};
use cm_runner::{FrozenRegistry, Registry, Runner, RunnerError};
use std::path::{Path, PathBuf};

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/migrations")
}

fn fixture_registry() -> FrozenRegistry {
    let mut registry = Registry::new();
    registry.load_dir(&fixtures()).unwrap();
    registry.freeze().unwrap()
}

fn open(dir: &tempfile::TempDir) -> MetaDb {
    MetaDb::open(&dir.path().join("data.db"), &DbOptions::default()).unwrap()
}

fn exec(db: &MetaDb, sql: &str) -> Result<usize, MetaError> {
    db.transaction(|dao| dao.tx().exec(sql, []).map_err(MetaError::from))
}

fn snapshot(db: &MetaDb, name: &str) -> Collection {
    db.transaction(|dao| dao.find_collection_by_name_or_id(name))
        .unwrap()
}

fn table_sql(db: &MetaDb, name: &str) -> Option<String> {
    db.adapter().table_sql(name).unwrap()
}

// ── 1. Fresh bootstrap ─────────────────────────────────────────────────

#[test]
fn fresh_bootstrap_applies_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let registry = fixture_registry();

    let report = Runner::new(&db, &registry).apply(None).unwrap();
    assert_eq!(report.steps.len(), registry.len());
    assert_eq!(report.last_applied, Some(1717600400));

    let names: Vec<String> = db.collections().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        vec!["payroll_year_end_dates", "profiles", "purchase_orders", "users"]
    );
    assert_eq!(db.applied_migrations().unwrap().len(), registry.len());
    assert!(db.adapter().integrity_check().unwrap().is_empty());

    let users = table_sql(&db, "users").unwrap();
    assert!(users.contains("\"tokenKey\" TEXT DEFAULT '' NOT NULL"), "{users}");
}

#[test]
fn full_round_trip_leaves_only_system_tables() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let registry = fixture_registry();
    let runner = Runner::new(&db, &registry);

    runner.apply(None).unwrap();
    let report = runner.revert(Some(0)).unwrap();
    assert_eq!(report.steps.first(), Some(&1717600400));
    assert_eq!(report.steps.last(), Some(&1717600000));

    assert!(db.collections().unwrap().is_empty());
    for table in ["users", "profiles", "purchase_orders", "time_off_reset_dates"] {
        assert!(!db.adapter().table_exists(table).unwrap(), "{table} left behind");
    }

    // and forward again
    assert_eq!(runner.apply(None).unwrap().steps.len(), registry.len());
}

// ── 2. Add then remove a field ─────────────────────────────────────────

#[test]
fn add_then_remove_field_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);

    let mut base = Collection::new("3esdddggow6dykr", "divisions", CollectionType::Base);
    base.add_field(Field::new("yt7ewxu9", "code", FieldKind::text()).required(true));
    base.add_field(Field::new("pyfibu3y", "name", FieldKind::text()));
    let with_n = {
        let mut c = base.clone();
        c.add_field(Field::new("c0000000", "n", FieldKind::text()));
        c
    };

    let mut registry = Registry::new();
    let create = base.clone();
    registry.register_with_id(
        1,
        "1_created_divisions.json",
        move |dao| dao.save_collection(&create).map(|_| ()),
        |dao| {
            let c = dao.find_collection_by_name_or_id("divisions")?;
            dao.delete_collection(&c).map(|_| ())
        },
    );
    let field = with_n.fields[2].clone();
    registry.register_with_id(
        2,
        "2_add_n.json",
        move |dao| {
            let mut c = dao.find_collection_by_name_or_id("divisions")?;
            c.add_field(field.clone());
            dao.save_collection(&c).map(|_| ())
        },
        |dao| {
            let mut c = dao.find_collection_by_name_or_id("divisions")?;
            c.remove_field("c0000000");
            dao.save_collection(&c).map(|_| ())
        },
    );
    let field = with_n.fields[2].clone();
    registry.register_with_id(
        3,
        "3_remove_n.json",
        |dao| {
            let mut c = dao.find_collection_by_name_or_id("divisions")?;
            c.remove_field("c0000000");
            dao.save_collection(&c).map(|_| ())
        },
        move |dao| {
            let mut c = dao.find_collection_by_name_or_id("divisions")?;
            c.add_field(field.clone());
            dao.save_collection(&c).map(|_| ())
        },
    );
    let registry = registry.freeze().unwrap();
    let runner = Runner::new(&db, &registry);

    let columns = || {
        db.adapter()
            .read(|conn| cm_db::schema::column_names(conn, "divisions"))
            .unwrap()
    };

    runner.apply(Some(1)).unwrap();
    let start_columns = columns();
    assert_eq!(snapshot(&db, "divisions").fields, base.fields);

    runner.apply(Some(2)).unwrap();
    assert_eq!(snapshot(&db, "divisions").fields, with_n.fields);
    assert_eq!(columns().last().map(String::as_str), Some("n"));

    runner.apply(Some(3)).unwrap();
    assert_eq!(snapshot(&db, "divisions").fields, base.fields);

    runner.revert(None).unwrap();
    assert_eq!(snapshot(&db, "divisions").fields, with_n.fields);

    runner.revert(None).unwrap();
    assert_eq!(snapshot(&db, "divisions").fields, base.fields);
    assert_eq!(columns(), start_columns);
    assert!(db.adapter().integrity_check().unwrap().is_empty());
}

// ── 3. Rename collection ───────────────────────────────────────────────

#[test]
fn rename_collection_moves_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let registry = fixture_registry();
    let runner = Runner::new(&db, &registry);

    runner.apply(Some(1717600300)).unwrap();
    exec(&db, "INSERT INTO time_off_reset_dates (id, date) VALUES ('r1', '2024-12-31')").unwrap();

    runner.apply(None).unwrap();
    let err = exec(&db, "SELECT * FROM time_off_reset_dates").unwrap_err();
    assert_eq!(err.kind(), "SqlError");
    assert!(err.to_string().contains("no such table"), "{err}");
    let rows = db
        .adapter()
        .read(|conn| cm_db::schema::row_count(conn, "payroll_year_end_dates"))
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(snapshot(&db, "c9b90wqyjpqa7tk").name, "payroll_year_end_dates");
}

// ── 4. Unique partial index ────────────────────────────────────────────

#[test]
fn unique_partial_index_allows_repeated_blanks() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let registry = fixture_registry();
    Runner::new(&db, &registry).apply(None).unwrap();

    let insert = |id: &str, po: &str| {
        exec(
            &db,
            &format!(
                "INSERT INTO purchase_orders (id, po_number, status, uid) VALUES ('{id}', '{po}', 'Active', 'u1')"
            ),
        )
    };
    insert("p1", "").unwrap();
    insert("p2", "").unwrap();
    insert("p3", "PO1").unwrap();
    let err = insert("p4", "PO1").unwrap_err();
    assert_eq!(err.kind(), "SqlError");
    assert!(err.to_string().contains("UNIQUE"), "{err}");
}

// ── 5. Divergence detection ────────────────────────────────────────────

fn numbered(ids: &[i64]) -> FrozenRegistry {
    let mut registry = Registry::new();
    for &id in ids {
        let name = format!("step_{id}");
        let drop = name.clone();
        registry.register_with_id(
            id,
            &format!("{id}_{name}.json"),
            move |dao| {
                dao.tx()
                    .execute_batch(&format!("CREATE TABLE {name} (v TEXT)"))
                    .map_err(MetaError::from)
            },
            move |dao| {
                dao.tx()
                    .execute_batch(&format!("DROP TABLE {drop}"))
                    .map_err(MetaError::from)
            },
        );
    }
    registry.freeze().unwrap()
}

#[test]
fn removed_step_is_ledger_divergence() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open(&dir);
        Runner::new(&db, &numbered(&[1, 2, 3])).apply(None).unwrap();
    }

    let db = open(&dir);
    let registry = numbered(&[1, 3, 4]);
    let err = Runner::new(&db, &registry).apply(None).unwrap_err();
    assert!(matches!(err, RunnerError::LedgerDivergence { id: 2 }), "got {err:?}");
    assert_eq!(err.kind(), "LedgerDivergence");
    assert!(!db.adapter().table_exists("step_4").unwrap());
}

// ── 6. Mid-step crash ──────────────────────────────────────────────────

#[test]
fn failed_step_rolls_back_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let mut jobs = Collection::new("yovqzrnnomp0lkx", "jobs", CollectionType::Base);
    jobs.add_field(Field::new("zloyds7s", "number", FieldKind::text()));

    let before;
    {
        let db = open(&dir);
        let base = numbered(&[1]);
        Runner::new(&db, &base).apply(None).unwrap();
        before = db.collections().unwrap();

        let mut registry = Registry::new();
        registry.register_with_id(1, "1_step_1.json", |_| Ok(()), |_| Ok(()));
        let broken = jobs.clone();
        registry.register_with_id(
            2,
            "2_created_jobs.json",
            move |dao| {
                dao.save_collection(&broken)?;
                Err(MetaError::NotFound {
                    what: "injected failure".into(),
                })
            },
            |_| Ok(()),
        );
        let registry = registry.freeze().unwrap();
        let err = Runner::new(&db, &registry).apply(None).unwrap_err();
        assert!(matches!(err, RunnerError::StepFailed { id: 2, .. }), "got {err:?}");
    }

    let db = open(&dir);
    let ids: Vec<i64> = db.applied_migrations().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(db.collections().unwrap(), before);
    assert!(!db.adapter().table_exists("jobs").unwrap());

    let mut registry = Registry::new();
    registry.register_with_id(1, "1_step_1.json", |_| Ok(()), |_| Ok(()));
    let fixed = jobs.clone();
    registry.register_with_id(
        2,
        "2_created_jobs.json",
        move |dao| dao.save_collection(&fixed).map(|_| ()),
        |_| Ok(()),
    );
    let registry = registry.freeze().unwrap();
    let report = Runner::new(&db, &registry).apply(None).unwrap();
    assert_eq!(report.steps, vec![2]);
    assert!(db.adapter().table_exists("jobs").unwrap());
}
