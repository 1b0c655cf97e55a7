mod common;

use common::row;
use serde_json::json;
use std::collections::BTreeMap;
use tenant_runtime::types::Header;
use tenant_runtime::{AttrType, Constraints, Db, QueryOptions, QuotaConfig, Queryable, RuntimeError, Value};

fn db() -> Db {
    Db::in_memory(QuotaConfig::default())
}

fn users(db: &Db) {
    let mut header = Header::new();
    header.insert("id".into(), AttrType::number().serial().unwrap().unique());
    header.insert("name".into(), AttrType::string().unique());
    header.insert("age".into(), AttrType::number());
    db.create("User", &header, Constraints::new()).unwrap();
}

#[test]
fn test_user_post_scenario() {
    let db = db();
    users(&db);

    let inserted = db.insert("User", row([("name", "anton".into()), ("age", 22.into())])).unwrap();
    assert_eq!(inserted.get("id"), Some(&Value::from(0)));

    let rows = db
        .query("User where name == $", QueryOptions::new().params(["anton"]))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_json(), json!({"id": 0, "name": "anton", "age": 22}));

    let mut header = Header::new();
    header.insert("author".into(), AttrType::number().integer().unwrap().foreign("User", "id"));
    header.insert("text".into(), AttrType::string());
    db.create("Post", &header, Constraints::new()).unwrap();
    db.insert("Post", row([("author", 0.into()), ("text", "hi".into())])).unwrap();

    // Restrictive references
    assert!(matches!(
        db.insert("Post", row([("author", 7.into()), ("text", "ghost".into())])),
        Err(RuntimeError::Constraint(_))
    ));
    assert!(matches!(
        db.delete("User", QueryOptions::new()),
        Err(RuntimeError::Constraint(_))
    ));

    assert!(matches!(db.drop(&["User"]), Err(RuntimeError::Dependency(_))));
    db.drop(&["User", "Post"]).unwrap();
    assert!(db.list().unwrap().is_empty());
}

#[test]
fn test_failed_add_attrs_is_atomic() {
    let db = db();
    db.create_json("R", &json!({"a": "number"}), &json!(null)).unwrap();
    db.insert_json("R", &json!({"a": 1})).unwrap();

    assert!(db.add_attrs_json("R", &json!({"b": ["bogus", null]})).is_err());
    assert_eq!(db.header("R").unwrap(), vec!["a".to_string()]);

    // Existing rows need a value for the new attribute
    let mut attrs = BTreeMap::new();
    attrs.insert("b".to_string(), (AttrType::number(), None));
    attrs.insert("c".to_string(), (AttrType::number(), Some(Value::from(5))));
    assert!(matches!(db.add_attrs("R", attrs), Err(RuntimeError::Constraint(_))));
    assert_eq!(db.header("R").unwrap(), vec!["a".to_string()]);

    db.add_attrs_json("R", &json!({"c": ["number", 5]})).unwrap();
    assert_eq!(db.field("c", "R", QueryOptions::new()).unwrap(), vec![Value::from(5)]);
}

#[test]
fn test_foreign_key_needs_key() {
    let db = db();
    let foreign = json!({"foreign": [[["ref"], "Parent", ["x"]]]});

    db.create_json("Parent", &json!({"x": "number", "y": "number"}), &json!(null)).unwrap();
    let err = db.create_json("Child", &json!({"ref": "number"}), &foreign).unwrap_err();
    assert!(matches!(err, RuntimeError::Constraint(_) | RuntimeError::Value(_)), "{}", err);

    db.drop(&["Parent"]).unwrap();
    db.create_json("Parent", &json!({"x": "number", "y": "number"}), &json!({"unique": [["x"]]}))
        .unwrap();
    db.create_json("Child", &json!({"ref": "number"}), &foreign).unwrap();
    assert_eq!(db.foreign_keys("Child").unwrap().len(), 1);
}

#[test]
fn test_rel_var_quota() {
    let db = db();
    let header: Header = [("x".to_string(), AttrType::number())].into();
    for i in 0..500 {
        db.create(&format!("R{}", i), &header, Constraints::new()).unwrap();
    }
    assert!(matches!(
        db.create("R500", &header, Constraints::new()),
        Err(RuntimeError::Quota(_))
    ));

    let names = db.list().unwrap();
    assert_eq!(names.len(), 500);
    assert!(names.iter().all(|name| name != "R500"));
}

#[test]
fn test_queryable_composition() {
    let db = db();
    users(&db);
    for (name, age) in [("anton", 22), ("bob", 30), ("carol", 41)] {
        db.insert("User", row([("name", name.into()), ("age", age.into())])).unwrap();
    }

    let users = db.rel("User").unwrap();
    let adults = users.filter("age > $", vec![Value::from(25)]).unwrap();
    assert_eq!(adults.count().unwrap(), 2);
    assert_eq!(
        adults.by("name", Vec::new()).field("name").unwrap(),
        vec![Value::from("bob"), Value::from("carol")]
    );

    let oldest = users.by("age", Vec::new()).range(2, None).all().unwrap();
    assert_eq!(oldest.len(), 1);
    assert_eq!(oldest[0].get("name"), Some(&Value::from("carol")));
    assert!(matches!(
        users.by("age", Vec::new()).range(1, None).filter("age > 0", Vec::new()),
        Err(RuntimeError::Usage(_))
    ));

    let bob = users.whose("name == $", vec![Value::from("bob")]).unwrap();
    assert_eq!(bob.get("age"), Some(&Value::from(30)));
    match users.whose("age > $", vec![Value::from(0)]) {
        Err(RuntimeError::Query(message)) => assert!(message.contains('3'), "{}", message),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(adults.delete().unwrap(), 2);
    assert_eq!(users.count().unwrap(), 1);
}

#[test]
fn test_windowed_mutations_touch_window_only() {
    let db = db();
    users(&db);
    for (name, age) in [("carol", 41), ("anton", 22), ("bob", 30)] {
        db.insert("User", row([("name", name.into()), ("age", age.into())])).unwrap();
    }

    let first = db.rel("User").unwrap().by("name", Vec::new()).range(0, Some(1));
    assert_eq!(first.count().unwrap(), 1);
    assert_eq!(first.delete().unwrap(), 1);
    assert_eq!(db.rel("User").unwrap().count().unwrap(), 2);
    assert!(db
        .query("User where name == $", QueryOptions::new().params(["anton"]))
        .unwrap()
        .is_empty());

    let changed = db
        .update_by_values("User", QueryOptions::new().by("name").length(1), row([("name", "zed".into())]))
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(
        db.field("name", "User", QueryOptions::new().by("name")).unwrap(),
        vec![Value::from("carol"), Value::from("zed")]
    );
}

#[test]
fn test_serial_out_of_range_rejected() {
    let db = db();
    users(&db);
    let err = db
        .insert("User", row([("id", Value::Number(1e20)), ("name", "big".into()), ("age", 1.into())]))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Type(_)), "{}", err);
    assert_eq!(db.rel("User").unwrap().count().unwrap(), 0);
}

#[test]
fn test_add_attrs_respects_row_size() {
    let db = Db::in_memory(QuotaConfig::small());
    db.create_json("B", &json!({"a": "number"}), &json!(null)).unwrap();
    db.insert_json("B", &json!({"a": 1})).unwrap();

    let blob = "x".repeat(8192);
    let result = db.add_attrs_json("B", &json!({"blob": ["string", blob]}));
    assert!(matches!(result, Err(RuntimeError::Quota(_))));
    assert_eq!(db.header("B").unwrap(), vec!["a".to_string()]);
}
