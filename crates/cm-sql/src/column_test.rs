use super::*;
use cm_core::{CollectionType, JsonOptions, SelectOptions};

fn render(field: Field) -> String {
    ColumnDef::for_field(&field).to_string()
}

#[test]
fn test_text_columns() {
    assert_eq!(
        render(Field::new("a1", "description", FieldKind::text())),
        r#""description" TEXT DEFAULT '' NOT NULL"#
    );
    assert_eq!(
        render(Field::new("a2", "number", FieldKind::text()).required(true)),
        r#""number" TEXT NOT NULL CHECK ("number" != '')"#
    );
}

#[test]
fn test_number_and_bool_columns() {
    assert_eq!(
        render(Field::new("n1", "hours", FieldKind::number())),
        r#""hours" NUMERIC DEFAULT 0 NOT NULL"#
    );
    assert_eq!(
        render(Field::new("b1", "committed", FieldKind::bool()).required(true)),
        r#""committed" BOOLEAN NOT NULL CHECK ("committed" = 1)"#
    );
}

#[test]
fn test_multi_valued_columns() {
    let divisions = FieldKind::Select(SelectOptions {
        values: vec!["a".into(), "b".into()],
        max_select: 3,
    });
    assert_eq!(
        render(Field::new("s1", "divisions", divisions.clone())),
        r#""divisions" JSON DEFAULT '[]' NOT NULL"#
    );
    assert_eq!(
        render(Field::new("s1", "divisions", divisions).required(true)),
        r#""divisions" JSON NOT NULL CHECK (json_array_length("divisions") > 0)"#
    );
}

#[test]
fn test_single_relation_is_text() {
    let field = Field::new("rjasv0rb", "uid", FieldKind::relation_to("_pb_users_auth_"));
    assert_eq!(ColumnDef::for_field(&field).ty, ColumnType::Text);
}

#[test]
fn test_json_columns() {
    let kind = FieldKind::Json(JsonOptions { max_size: 2_000_000 });
    assert_eq!(
        render(Field::new("j1", "payload", kind.clone())),
        r#""payload" JSON DEFAULT NULL"#
    );
    assert_eq!(
        render(Field::new("j1", "payload", kind).required(true)),
        r#""payload" JSON NOT NULL CHECK ("payload" NOT IN ('', 'null', '""', '[]', '{}'))"#
    );
}

#[test]
fn test_rename_is_not_a_shape_change() {
    let a = ColumnDef::for_field(&Field::new("z1", "job_number", FieldKind::text()));
    let b = ColumnDef::for_field(&Field::new("z1", "number", FieldKind::text()));
    assert!(!a.shape_differs(&b));
    let c = ColumnDef::for_field(&Field::new("z1", "number", FieldKind::text()).required(true));
    assert!(b.shape_differs(&c));
}

#[test]
fn test_system_columns_for_auth() {
    let users = Collection::new("_pb_users_auth_", "users", CollectionType::Auth);
    let names: Vec<_> = system_columns(&users).into_iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        vec!["id", "created", "updated", "email", "tokenKey", "passwordHash", "verified", "emailVisibility"]
    );
    assert_eq!(
        system_columns(&users)[0].to_string(),
        r#""id" TEXT PRIMARY KEY NOT NULL"#
    );
}

#[test]
fn test_primary_key_field_folds_into_id() {
    let mut c = Collection::new("pbc_2078099607", "purchase_orders", CollectionType::Base);
    let mut opts = cm_core::TextOptions::default();
    opts.primary_key = true;
    c.add_field(Field::new("text3208210256", "id", FieldKind::Text(opts)));
    c.add_field(Field::new("p1", "po_number", FieldKind::text()));
    let cols = table_columns(&c);
    assert_eq!(cols.len(), 4);
    assert!(has_column(&c, "PO_NUMBER"));
}

#[test]
fn test_relaxed_definition() {
    let col = ColumnDef::for_field(&Field::new("a", "week", FieldKind::number()).required(true));
    assert_eq!(col.relaxed(), r#""week" NUMERIC"#);
    assert_eq!(col.ty.zero_literal(), "0");
}
