use std::sync::Arc;

use crate::{
    DynProvider, ErrorKind, FieldDecl, FieldKind, MapKey, MapValue, TypeProvider, Value,
};

fn test_provider() -> DynProvider {
    DynProvider::new().with_type(
        crate::MessageDecl::new("test.Account")
            .field("name", FieldDecl::new(FieldKind::String))
            .field("balance", FieldDecl::new(FieldKind::Int))
            .field("nickname", FieldDecl::wrapper(FieldKind::String))
            .field("tags", FieldDecl::new(FieldKind::List))
            .field("labels", FieldDecl::new(FieldKind::Map))
            .field("owner", FieldDecl::new(FieldKind::Message("test.Account".into())))
            .field("legacy_id", FieldDecl::new(FieldKind::Int).with_presence()),
    )
}

fn make(fields: Vec<(&str, Value)>) -> Value {
    test_provider().new_value(
        "test.Account",
        fields
            .into_iter()
            .map(|(k, v)| (Arc::from(k), v))
            .collect(),
    )
}

fn expect_error(value: &Value, kind: ErrorKind) {
    match value {
        Value::Error(e) => assert_eq!(e.kind, kind, "unexpected error: {e}"),
        other => panic!("expected {kind:?} error, got {other}"),
    }
}

#[test]
fn create_unknown_type_fails() {
    let p = test_provider();
    let v = p.new_value("test.Missing", vec![]);
    expect_error(&v, ErrorKind::AttributeNotFound);
}

#[test]
fn create_unknown_field_fails() {
    let v = make(vec![("bogus", Value::Int(1))]);
    expect_error(&v, ErrorKind::NoSuchField);
}

#[test]
fn create_checks_field_kinds() {
    let v = make(vec![("balance", Value::string("not an int"))]);
    expect_error(&v, ErrorKind::BadFormat);
}

#[test]
fn null_unsets_wrapper_and_message_fields() {
    let p = test_provider();
    let v = make(vec![
        ("nickname", Value::Null),
        ("owner", Value::Null),
        ("name", Value::string("n")),
    ]);

    // Unset wrapper reads as null, not as the wrapped kind's default.
    assert_eq!(p.select_field(&v, "nickname"), Value::Null);
    assert_eq!(p.select_field(&v, "owner"), Value::Null);
    assert_eq!(p.has_field(&v, "nickname"), Value::Bool(false));
}

#[test]
fn null_on_primitive_field_fails() {
    let v = make(vec![("balance", Value::Null)]);
    expect_error(&v, ErrorKind::BadFormat);
}

#[test]
fn select_unset_scalar_reads_default() {
    let p = test_provider();
    let v = make(vec![]);
    assert_eq!(p.select_field(&v, "balance"), Value::Int(0));
    assert_eq!(p.select_field(&v, "name"), Value::string(""));
    assert_eq!(p.select_field(&v, "tags"), Value::list(vec![]));
}

#[test]
fn select_undeclared_field_fails() {
    let p = test_provider();
    let v = make(vec![]);
    expect_error(&p.select_field(&v, "bogus"), ErrorKind::NoSuchField);
}

#[test]
fn select_on_scalar_holder_fails() {
    let p = test_provider();
    expect_error(
        &p.select_field(&Value::Int(1), "field"),
        ErrorKind::AttributeNotFound,
    );
}

#[test]
fn select_on_map_holder_is_key_lookup() {
    let p = test_provider();
    let map = Value::Map(
        [(MapKey::String("k".into()), Value::Int(7))]
            .into_iter()
            .collect(),
    );
    assert_eq!(p.select_field(&map, "k"), Value::Int(7));
    expect_error(&p.select_field(&map, "missing"), ErrorKind::NoSuchKey);
}

#[test]
fn has_distinguishes_presence_kinds() {
    let p = test_provider();

    // proto3-style scalar: set-to-default is indistinguishable from unset.
    let v = make(vec![("balance", Value::Int(0))]);
    assert_eq!(p.has_field(&v, "balance"), Value::Bool(false));
    let v = make(vec![("balance", Value::Int(5))]);
    assert_eq!(p.has_field(&v, "balance"), Value::Bool(true));

    // Explicit presence: set-to-default is observable.
    let v = make(vec![("legacy_id", Value::Int(0))]);
    assert_eq!(p.has_field(&v, "legacy_id"), Value::Bool(true));
    let v = make(vec![]);
    assert_eq!(p.has_field(&v, "legacy_id"), Value::Bool(false));

    // Wrapper: set-to-default is observable too.
    let v = make(vec![("nickname", Value::string(""))]);
    assert_eq!(p.has_field(&v, "nickname"), Value::Bool(true));
}

#[test]
fn has_on_containers_requires_non_empty() {
    let p = test_provider();
    let v = make(vec![("tags", Value::list(vec![]))]);
    assert_eq!(p.has_field(&v, "tags"), Value::Bool(false));

    let v = make(vec![("tags", Value::list(vec![Value::Int(1)]))]);
    assert_eq!(p.has_field(&v, "tags"), Value::Bool(true));

    let v = make(vec![("labels", Value::Map(MapValue::new()))]);
    assert_eq!(p.has_field(&v, "labels"), Value::Bool(false));
}

#[test]
fn has_on_map_holder_tests_keys() {
    let p = test_provider();
    let map = Value::Map(
        [(MapKey::String("k".into()), Value::Null)]
            .into_iter()
            .collect(),
    );
    assert_eq!(p.has_field(&map, "k"), Value::Bool(true));
    assert_eq!(p.has_field(&map, "missing"), Value::Bool(false));
}

#[test]
fn struct_equality_after_default_normalization() {
    // Setting a non-presence field to its default equals leaving it unset.
    let a = make(vec![("balance", Value::Int(0)), ("name", Value::string("x"))]);
    let b = make(vec![("name", Value::string("x"))]);
    assert!(crate::runtime_equals(&a, &b));
}
