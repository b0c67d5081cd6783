use super::*;
use crate::commands::common::Failure;

#[test]
fn test_scaffold_writes_empty_step() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");

    let path = scaffold(&migrations, 1717600500, "updated_profiles").unwrap();
    assert_eq!(path, migrations.join("1717600500_updated_profiles.json"));

    let file = MigrationFile::load(&path).unwrap();
    assert!(file.up.is_empty());
    assert!(file.down.is_empty());
}

#[test]
fn test_scaffold_rejects_bad_name() {
    let dir = tempfile::tempdir().unwrap();
    let err = scaffold(dir.path(), 1717600500, "updated profiles").unwrap_err();
    assert_eq!(Failure::classify(&err).kind, "ValidationError");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_scaffold_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(dir.path(), 1717600500, "updated_profiles").unwrap();
    let err = scaffold(dir.path(), 1717600500, "updated_profiles").unwrap_err();
    assert!(err.to_string().contains("already exists"), "{err}");
}
