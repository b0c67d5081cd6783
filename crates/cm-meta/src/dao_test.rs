use super::*;
use crate::MetaDb;
use cm_core::{CollectionType, Field, FieldKind, RelationOptions, RuleKind};

fn profiles() -> Collection {
    let mut c = Collection::new("glmf9xpnwgpwudm", "profiles", CollectionType::Base);
    c.add_field(Field::new("e7uz2a2n", "given_name", FieldKind::text()).required(true));
    c.add_field(Field::new("7msjafmr", "surname", FieldKind::text()).required(true));
    c
}

fn time_entries() -> Collection {
    let mut c = Collection::new("ranctx5xgih6n3a", "time_entries", CollectionType::Base);
    c.add_field(Field::new("fq3k9cuw", "hours", FieldKind::number()));
    c.add_field(Field::new(
        "tvgcwbqo",
        "uid",
        FieldKind::Relation(RelationOptions {
            collection_id: CollectionId::new("glmf9xpnwgpwudm"),
            cascade_delete: false,
            min_select: None,
            max_select: Some(1),
            display_fields: None,
        }),
    ));
    c
}

fn save(db: &MetaDb, c: &Collection) -> MetaResult<Vec<DdlStatement>> {
    db.transaction(|dao| dao.save_collection(c))
}

fn columns(db: &MetaDb, table: &str) -> Vec<String> {
    db.adapter()
        .read(|conn| schema::column_names(conn, table))
        .unwrap()
}

#[test]
fn test_save_creates_table_and_row() {
    let db = MetaDb::open_memory().unwrap();
    let stmts = save(&db, &profiles()).unwrap();
    assert_eq!(stmts[0].op, DdlOp::CreateTable);
    assert_eq!(
        columns(&db, "profiles"),
        vec!["id", "created", "updated", "given_name", "surname"]
    );

    let loaded = db
        .transaction(|dao| dao.find_collection_by_name_or_id("PROFILES"))
        .unwrap();
    assert_eq!(loaded.id, "glmf9xpnwgpwudm");
    assert_eq!(loaded.fields, profiles().fields);
    assert!(loaded.created.is_some());
}

#[test]
fn test_round_trip_preserves_rules_verbatim() {
    let db = MetaDb::open_memory().unwrap();
    let mut c = profiles();
    c.rules.set(RuleKind::List, Some("  @request.auth.id != \"\"  ".into()));
    c.rules.set(RuleKind::View, Some(String::new()));
    save(&db, &c).unwrap();

    let loaded = db
        .transaction(|dao| dao.find_collection_by_name_or_id("glmf9xpnwgpwudm"))
        .unwrap();
    assert_eq!(loaded.rules, c.rules);
    assert_eq!(loaded.rules.get(RuleKind::Create), None);
}

#[test]
fn test_second_save_is_noop() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    assert!(save(&db, &profiles()).unwrap().is_empty());
}

#[test]
fn test_missing_relation_target_is_reference_error() {
    let db = MetaDb::open_memory().unwrap();
    let err = save(&db, &time_entries()).unwrap_err();
    assert!(
        matches!(&err, MetaError::Reference { missing_collection_id } if missing_collection_id == "glmf9xpnwgpwudm"),
        "got {err:?}"
    );
    assert_eq!(err.kind(), "ReferenceError");
    assert!(!db.adapter().table_exists("time_entries").unwrap());
}

#[test]
fn test_name_conflict() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let clash = Collection::new("abcdefghijklmno", "Profiles", CollectionType::Base);
    let err = save(&db, &clash).unwrap_err();
    assert!(matches!(err, MetaError::Conflict { .. }), "got {err:?}");
    assert_eq!(err.kind(), "ConflictError");
}

#[test]
fn test_system_table_name_is_taken() {
    let db = MetaDb::open_memory().unwrap();
    let c = Collection::new("abcdefghijklmno", "_migrations", CollectionType::Base);
    let err = save(&db, &c).unwrap_err();
    assert!(matches!(err, MetaError::Conflict { .. }), "got {err:?}");
}

#[test]
fn test_type_is_immutable() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let mut auth = profiles();
    auth.kind = CollectionType::Auth;
    let err = save(&db, &auth).unwrap_err();
    assert!(matches!(&err, MetaError::Validation { field, .. } if field == "type"));
}

#[test]
fn test_index_on_unknown_column_rejected() {
    let db = MetaDb::open_memory().unwrap();
    let mut c = profiles();
    c.indexes = vec!["CREATE INDEX idx_nick ON profiles (nickname)".into()];
    let err = save(&db, &c).unwrap_err();
    assert!(matches!(err, MetaError::Planner(_)), "got {err:?}");
    assert_eq!(err.kind(), "ValidationError");
}

#[test]
fn test_required_add_on_non_empty_table_fails_atomically() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    db.transaction(|dao| {
        dao.tx()
            .exec("INSERT INTO profiles (id, given_name, surname) VALUES ('p1', 'Ada', 'Lovelace')", [])
            .map_err(MetaError::from)
    })
    .unwrap();

    let mut c = profiles();
    c.add_field(Field::new("pd2bpjfm", "payroll_id", FieldKind::text()).required(true));
    let err = save(&db, &c).unwrap_err();
    assert_eq!(err.kind(), "SqlError", "got {err:?}");

    assert!(!columns(&db, "profiles").contains(&"payroll_id".to_string()));
    let stored = db.collections().unwrap();
    assert_eq!(stored[0].fields.len(), 2);
}

#[test]
fn test_delete_refuses_referenced_collection() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    save(&db, &time_entries()).unwrap();

    let err = db
        .transaction(|dao| dao.delete_collection(&profiles()))
        .unwrap_err();
    assert_eq!(err.kind(), "ReferentialPolicyError");
    assert!(err.to_string().contains("time_entries"));

    db.transaction(|dao| dao.delete_collection(&time_entries()))
        .unwrap();
    db.transaction(|dao| dao.delete_collection(&profiles()))
        .unwrap();
    assert!(db.collections().unwrap().is_empty());
    assert!(!db.adapter().table_exists("profiles").unwrap());
}

#[test]
fn test_delete_refuses_system_collection() {
    let db = MetaDb::open_memory().unwrap();
    let mut c = profiles();
    c.system = true;
    save(&db, &c).unwrap();
    let err = db.transaction(|dao| dao.delete_collection(&c)).unwrap_err();
    assert!(matches!(&err, MetaError::Validation { field, .. } if field == "system"));
}

#[test]
fn test_find_unknown_is_not_found() {
    let db = MetaDb::open_memory().unwrap();
    let err = db
        .transaction(|dao| dao.find_collection_by_name_or_id("nope"))
        .unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));
}

#[test]
fn test_import_resolves_relations_within_snapshot() {
    let db = MetaDb::open_memory().unwrap();
    // dependent listed before its target
    db.transaction(|dao| dao.import_collections(&[time_entries(), profiles()], false))
        .unwrap();
    let names: Vec<String> = db.collections().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["profiles", "time_entries"]);
}

#[test]
fn test_import_delete_missing() {
    let db = MetaDb::open_memory().unwrap();
    let mut legacy = Collection::new("m19q72syy0e3lvm", "purchase_orders", CollectionType::Base);
    legacy.add_field(Field::new("po1", "po_number", FieldKind::text()));
    save(&db, &legacy).unwrap();
    save(&db, &profiles()).unwrap();

    db.transaction(|dao| dao.import_collections(&[profiles(), time_entries()], true))
        .unwrap();
    let names: Vec<String> = db.collections().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["profiles", "time_entries"]);
    assert!(!db.adapter().table_exists("purchase_orders").unwrap());
}

#[test]
fn test_rewrite_keeps_dependent_view() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let mut view = Collection::new("v0000000000001a", "profile_names", CollectionType::View);
    view.options.query = Some("SELECT id, given_name FROM profiles".into());
    save(&db, &view).unwrap();

    let mut c = profiles();
    c.remove_field("7msjafmr");
    let stmts = save(&db, &c).unwrap();
    assert!(stmts.iter().any(|s| s.op == DdlOp::CopyRows));
    assert!(db.adapter().table_exists("profile_names").unwrap());
}

#[test]
fn test_dependency_order_puts_targets_first() {
    let both = [time_entries(), profiles()];
    let order: Vec<&str> = dependency_order(&both).iter().map(|c| c.name.as_str()).collect();
    assert_eq!(order, vec!["profiles", "time_entries"]);
}

#[test]
fn test_dependency_order_keeps_input_order_on_cycle() {
    let mut a = profiles();
    a.add_field(Field::new("bk000001", "entry", FieldKind::relation_to("ranctx5xgih6n3a")));
    let both = [time_entries(), a];
    let order: Vec<&str> = dependency_order(&both).iter().map(|c| c.name.as_str()).collect();
    assert_eq!(order, vec!["time_entries", "profiles"]);
}

fn seed_profile(db: &MetaDb) {
    db.transaction(|dao| {
        dao.tx()
            .exec("INSERT INTO profiles (id, given_name, surname) VALUES ('p1', 'Ada', 'Lovelace')", [])
            .map_err(MetaError::from)
    })
    .unwrap();
}

fn profile_row(db: &MetaDb, columns: &str) -> Vec<String> {
    let sql = format!("SELECT {columns} FROM profiles WHERE id = 'p1'");
    let n = columns.split(',').count();
    db.adapter()
        .read(|conn| {
            conn.query_row(&sql, [], |row| {
                (0..n)
                    .map(|i| row.get::<_, rusqlite::types::Value>(i).map(|v| format!("{v:?}")))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(cm_db::DbError::from)
        })
        .unwrap()
}

#[test]
fn test_rename_chain_keeps_values() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    seed_profile(&db);

    let mut c = profiles();
    c.fields[0].name = "surname".into();
    c.fields[1].name = "family_name".into();
    save(&db, &c).unwrap();

    assert_eq!(
        columns(&db, "profiles"),
        vec!["id", "created", "updated", "surname", "family_name"]
    );
    assert_eq!(
        profile_row(&db, "surname, family_name"),
        vec!["Text(\"Ada\")", "Text(\"Lovelace\")"]
    );
}

#[test]
fn test_rename_swap_keeps_values() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    seed_profile(&db);

    let mut c = profiles();
    c.fields[0].name = "surname".into();
    c.fields[1].name = "given_name".into();
    save(&db, &c).unwrap();

    assert_eq!(
        profile_row(&db, "given_name, surname"),
        vec!["Text(\"Lovelace\")", "Text(\"Ada\")"]
    );
    let stored = db.collections().unwrap();
    assert_eq!(stored[0].fields[0].name, "surname");
}

#[test]
fn test_removed_name_reused_with_other_kind() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    seed_profile(&db);

    let mut c = profiles();
    c.remove_field("7msjafmr");
    c.add_field(Field::new("fielda02", "surname", FieldKind::number()));
    save(&db, &c).unwrap();

    assert_eq!(
        columns(&db, "profiles"),
        vec!["id", "created", "updated", "given_name", "surname"]
    );
    assert_eq!(profile_row(&db, "given_name, surname"), vec!["Text(\"Ada\")", "Integer(0)"]);
}

#[test]
fn test_rename_retargets_dependent_view() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let mut view = Collection::new("v0000000000001a", "profile_names", CollectionType::View);
    view.options.query = Some("SELECT profiles.id, given_name FROM profiles".into());
    save(&db, &view).unwrap();

    let mut c = profiles();
    c.name = "people".into();
    save(&db, &c).unwrap();
    let stored = db
        .transaction(|dao| dao.find_collection_by_name_or_id("profile_names"))
        .unwrap();
    assert_eq!(
        stored.options.query.as_deref(),
        Some("SELECT people.id, given_name FROM people")
    );

    c.remove_field("7msjafmr");
    let stmts = save(&db, &c).unwrap();
    assert!(stmts.iter().any(|s| s.op == DdlOp::CopyRows));
    assert!(db.adapter().table_exists("profile_names").unwrap());
}

#[test]
fn test_rename_with_rewrite_recreates_view_on_new_name() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let mut view = Collection::new("v0000000000001a", "profile_names", CollectionType::View);
    view.options.query = Some("SELECT id, given_name FROM profiles".into());
    save(&db, &view).unwrap();

    let mut c = profiles();
    c.name = "people".into();
    c.remove_field("7msjafmr");
    save(&db, &c).unwrap();

    let sql = db.adapter().table_sql("profile_names").unwrap().unwrap();
    assert!(sql.contains("FROM people"), "{sql}");
}

fn collection_row(db: &MetaDb) -> Vec<String> {
    db.adapter()
        .read(|conn| {
            conn.query_row(
                "SELECT id, name, type, system, schema, indexes, rules, options, created, updated \
                 FROM _collections WHERE id = 'glmf9xpnwgpwudm'",
                [],
                |row| {
                    (0..10)
                        .map(|i| row.get::<_, rusqlite::types::Value>(i).map(|v| format!("{v:?}")))
                        .collect::<rusqlite::Result<Vec<_>>>()
                },
            )
            .map_err(cm_db::DbError::from)
        })
        .unwrap()
}

fn normalized_sql(db: &MetaDb, table: &str) -> String {
    let sql = db.adapter().table_sql(table).unwrap().unwrap();
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn test_add_then_remove_restores_row_exactly() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let row = collection_row(&db);
    let table_sql = normalized_sql(&db, "profiles");

    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut c = db.collections().unwrap().remove(0);
    c.add_field(Field::new("n0000001", "n", FieldKind::text()));
    save(&db, &c).unwrap();
    assert_ne!(collection_row(&db), row);

    std::thread::sleep(std::time::Duration::from_millis(5));
    c.remove_field("n0000001");
    save(&db, &c).unwrap();
    assert_eq!(collection_row(&db), row);
    assert_eq!(normalized_sql(&db, "profiles"), table_sql);
}

#[test]
fn test_new_content_gets_fresh_updated() {
    let db = MetaDb::open_memory().unwrap();
    save(&db, &profiles()).unwrap();
    let first = db.collections().unwrap().remove(0).updated;

    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut c = profiles();
    c.add_field(Field::new("n0000001", "n", FieldKind::text()));
    save(&db, &c).unwrap();
    let second = db.collections().unwrap().remove(0).updated;
    assert!(second > first, "{first:?} -> {second:?}");
}

#[test]
fn test_unique_flag_on_same_column_in_two_collections() {
    let db = MetaDb::open_memory().unwrap();
    let mut people = profiles();
    people.fields[1].unique = true;
    save(&db, &people).unwrap();

    let mut contacts = Collection::new("k2ptv0c9fz1qm7d", "contacts", CollectionType::Base);
    contacts.add_field(Field::new("s0rn4m3x", "surname", FieldKind::text()).unique(true));
    save(&db, &contacts).unwrap();

    let names = |table: &str| {
        db.adapter()
            .read(|conn| schema::index_names(conn, table))
            .unwrap()
    };
    assert_eq!(names("profiles"), vec!["_glmf9xpnwgpwudm_unique_surname"]);
    assert_eq!(names("contacts"), vec!["_k2ptv0c9fz1qm7d_unique_surname"]);
}
