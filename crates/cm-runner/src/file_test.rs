use super::*;
use cm_meta::MetaDb;

const ADD_JOB_NUMBER: &str = r#"{
  "up": [
    {
      "op": "create_collection",
      "collection": {
        "id": "yovqzrnnomp0lkx",
        "name": "jobs",
        "type": "base",
        "system": false,
        "schema": [
          {"id": "ocxmutn0", "name": "description", "type": "text", "required": false, "options": {}}
        ],
        "indexes": [],
        "listRule": "@request.auth.id != \"\"",
        "viewRule": null,
        "createRule": null,
        "updateRule": null,
        "deleteRule": null,
        "options": {}
      }
    },
    {
      "op": "add_field",
      "target": "jobs",
      "at": 0,
      "field": {"id": "zloyds7s", "name": "number", "type": "text", "required": false, "options": {}}
    },
    {"op": "set_indexes", "target": "jobs", "indexes": ["CREATE UNIQUE INDEX `idx_V1RKd7H` ON `jobs` (`number`)"]},
    {"op": "set_rule", "target": "yovqzrnnomp0lkx", "rule": "viewRule", "value": ""}
  ],
  "down": [
    {"op": "delete_collection", "target": "jobs"}
  ]
}"#;

fn run(db: &MetaDb, f: &StepFn) -> MetaResult<()> {
    db.transaction(|dao| f(dao))
}

#[test]
fn test_decode_ops() {
    let file: MigrationFile = serde_json::from_str(ADD_JOB_NUMBER).unwrap();
    assert_eq!(file.up.len(), 4);
    assert!(matches!(&file.up[3], Op::SetRule { rule: RuleKind::View, value: Some(v), .. } if v.is_empty()));
    assert!(matches!(&file.down[0], Op::DeleteCollection { target } if target == "jobs"));
}

#[test]
fn test_unknown_op_and_keys_rejected() {
    assert!(serde_json::from_str::<MigrationFile>(r#"{"up": [{"op": "truncate", "target": "jobs"}]}"#).is_err());
    assert!(serde_json::from_str::<MigrationFile>(
        r#"{"up": [{"op": "delete_collection", "target": "jobs", "force": true}]}"#
    )
    .is_err());
    assert!(serde_json::from_str::<MigrationFile>(r#"{"up": [], "sideways": []}"#).is_err());
}

#[test]
fn test_misspelt_rule_key_rejected() {
    let typo = ADD_JOB_NUMBER.replace("\"listRule\"", "\"listRulee\"");
    let err = serde_json::from_str::<MigrationFile>(&typo).unwrap_err();
    assert!(err.to_string().contains("listRulee"), "{err}");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1717600000_created_jobs.json");
    std::fs::write(&path, &typo).unwrap();
    let err = MigrationFile::load(&path).unwrap_err();
    assert!(matches!(err, RunnerError::MigrationFile { .. }), "got {err:?}");
}

#[test]
fn test_apply_ops_then_revert() {
    let db = MetaDb::open_memory().unwrap();
    let file: MigrationFile = serde_json::from_str(ADD_JOB_NUMBER).unwrap();
    let (up, down) = file.into_fns();

    run(&db, &up).unwrap();
    let jobs = db.collections().unwrap().remove(0);
    assert_eq!(jobs.fields[0].name, "number");
    assert_eq!(jobs.rules.view_rule.as_deref(), Some(""));
    assert_eq!(jobs.indexes.len(), 1);

    run(&db, &down).unwrap();
    assert!(db.collections().unwrap().is_empty());
    assert!(!db.adapter().table_exists("jobs").unwrap());
}

#[test]
fn test_rename_collection_retargets_indexes() {
    let db = MetaDb::open_memory().unwrap();
    let (up, _) = serde_json::from_str::<MigrationFile>(ADD_JOB_NUMBER)
        .unwrap()
        .into_fns();
    run(&db, &up).unwrap();

    let rename = Op::RenameCollection {
        target: "jobs".into(),
        name: "projects".into(),
    };
    db.transaction(|dao| rename.apply(dao)).unwrap();

    let projects = db.collections().unwrap().remove(0);
    assert_eq!(projects.name, "projects");
    assert!(projects.indexes[0].contains("\"projects\""));
    assert!(db.adapter().table_exists("projects").unwrap());
}

#[test]
fn test_remove_unknown_field_is_not_found() {
    let db = MetaDb::open_memory().unwrap();
    let (up, _) = serde_json::from_str::<MigrationFile>(ADD_JOB_NUMBER)
        .unwrap()
        .into_fns();
    run(&db, &up).unwrap();

    let op = Op::RemoveField {
        target: "jobs".into(),
        field_id: "missing1".into(),
    };
    let err = db.transaction(|dao| op.apply(dao)).unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));
}

#[test]
fn test_sql_op_runs_raw_batch() {
    let db = MetaDb::open_memory().unwrap();
    let op = Op::Sql {
        sql: "CREATE TABLE scratch (a TEXT); INSERT INTO scratch VALUES ('x');".into(),
    };
    db.transaction(|dao| op.apply(dao)).unwrap();
    assert!(db.adapter().table_exists("scratch").unwrap());
}

#[test]
fn test_scaffold_decodes_to_empty_file() {
    let file: MigrationFile = serde_json::from_str(&MigrationFile::scaffold()).unwrap();
    assert_eq!(file, MigrationFile::default());
}
