use super::*;

fn noop(_: &Dao<'_>) -> MetaResult<()> {
    Ok(())
}

#[test]
fn test_freeze_sorts_by_id() {
    let mut registry = Registry::new();
    registry
        .register("1717600002_updated_jobs.rs", noop, noop)
        .unwrap();
    registry
        .register("migrations/1717600001_created_jobs.rs", noop, noop)
        .unwrap();
    registry.register_with_id(5, "seed.rs", noop, noop);

    let frozen = registry.freeze().unwrap();
    let ids: Vec<i64> = frozen.steps().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![5, 1717600001, 1717600002]);
    assert_eq!(frozen.get(1717600001).unwrap().file, "1717600001_created_jobs.rs");
    assert!(!frozen.contains(6));
}

#[test]
fn test_duplicate_id_fails_freeze() {
    let mut registry = Registry::new();
    registry.register("1717600001_a.rs", noop, noop).unwrap();
    registry.register("1717600001_b.rs", noop, noop).unwrap();
    let err = registry.freeze().unwrap_err();
    assert!(
        matches!(&err, RunnerError::DuplicateMigrationId { id: 1717600001, .. }),
        "got {err:?}"
    );
    assert_eq!(err.kind(), "DuplicateMigrationId");
}

#[test]
fn test_register_rejects_unnumbered_file() {
    let mut registry = Registry::new();
    assert!(registry.register("created_jobs.rs", noop, noop).is_err());
}

#[test]
fn test_load_dir_reads_json_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("2_second.json"), MigrationFile::scaffold()).unwrap();
    std::fs::write(dir.path().join("1_first.json"), MigrationFile::scaffold()).unwrap();
    std::fs::write(dir.path().join("README.md"), "notes").unwrap();

    let mut registry = Registry::new();
    assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
    let frozen = registry.freeze().unwrap();
    assert_eq!(frozen.len(), 2);
    assert_eq!(frozen.steps()[0].file, "1_first.json");
}

#[test]
fn test_load_dir_missing_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = Registry::new();
    assert_eq!(registry.load_dir(&dir.path().join("nope")).unwrap(), 0);
    assert!(registry.freeze().unwrap().is_empty());
}

#[test]
fn test_load_dir_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("3_broken.json"), "{\"up\": [{\"op\": \"explode\"}]}").unwrap();
    let err = Registry::new().load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, RunnerError::MigrationFile { .. }), "got {err:?}");
}

#[test]
fn test_macro_uses_source_file_name() {
    let mut registry = Registry::new();
    // this file is not named <id>_<name>.rs
    let err = crate::register_migration!(registry, noop, noop).unwrap_err();
    assert!(matches!(err, RunnerError::InvalidFileName { file } if file == "registry_test.rs"));
}
