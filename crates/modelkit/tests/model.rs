use std::cell::RefCell;
use std::rc::Rc;

use modelkit::{
    types, EntityError, Fields, Model, ModelEvent, ModelHooks, ModelSchema, Structure, TypeParams,
    Value,
};
use regex::Regex;
use serde_json::json;

struct User;

impl ModelSchema for User {
    fn structure() -> Structure {
        Structure::new()
            .field("id", types::number().primary())
            .field("name", types::string().flag("trim").required())
            .field("email", types::string().flag("lower"))
            .field("age", types::number().flag("unsigned"))
            .field("role", types::string().enum_values(["admin", "user"]))
            .field("tags", types::array("string").flag("unique"))
    }
}

struct Metrics;

impl ModelSchema for Metrics {
    fn structure() -> Structure {
        Structure::new().any_key(types::number().key_pattern(Regex::new("^x_").expect("pattern")))
    }
}

struct Period;

fn normalize_period(row: &mut Fields) {
    let start = row.get("start").and_then(Value::as_f64);
    let end = row.get("end").and_then(Value::as_f64);
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            row.insert("start".to_string(), Value::from(end));
            row.insert("end".to_string(), Value::from(start));
        }
    }
}

fn period_not_empty(row: &Fields) -> Result<(), EntityError> {
    let start = row.get("start").and_then(Value::as_f64);
    let end = row.get("end").and_then(Value::as_f64);
    match (start, end) {
        (Some(start), Some(end)) if start == end => {
            Err(EntityError::RowRejected("period is empty".to_string()))
        }
        _ => Ok(()),
    }
}

fn add_length(json: &mut serde_json::Map<String, serde_json::Value>) {
    let start = json.get("start").and_then(serde_json::Value::as_f64);
    let end = json.get("end").and_then(serde_json::Value::as_f64);
    if let (Some(start), Some(end)) = (start, end) {
        json.insert("length".to_string(), json!((end - start) as i64));
    }
}

impl ModelSchema for Period {
    fn structure() -> Structure {
        Structure::new()
            .field("start", "number")
            .field("end", "number")
    }

    fn hooks() -> ModelHooks {
        ModelHooks {
            prepare: Some(normalize_period),
            validate: Some(period_not_empty),
            prepare_json: Some(add_length),
            ..ModelHooks::default()
        }
    }
}

fn user() -> Model {
    Model::new::<User>(json!({"id": 1, "name": " Ann "})).expect("valid user")
}

#[test]
fn required_field_is_enforced_and_value_is_prepared() {
    let err = Model::new::<User>(json!({"id": 1})).unwrap_err();
    assert_eq!(err, EntityError::Required { key: "name".into() });

    let model = user();
    assert_eq!(model.get("name").as_str(), Some("Ann"));
    assert_eq!(
        model.set(json!({"name": null})),
        Err(EntityError::Required { key: "name".into() })
    );
}

#[test]
fn every_declared_field_is_materialized() {
    let model = user();
    let keys: Vec<String> = model.row().keys().cloned().collect();
    assert_eq!(keys, vec!["id", "name", "email", "age", "role", "tags"]);
    assert!(model.has_property("email"));
    assert!(!model.has_value("email"));
}

#[test]
fn set_to_current_value_is_silent() {
    let model = user();
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);
    model.on("change", move |_| *counter.borrow_mut() += 1);

    let before = model.row();
    model.set(json!({"name": "Ann "})).expect("same prepared value");
    assert!(Rc::ptr_eq(&before, &model.row()));
    assert_eq!(*fired.borrow(), 0);

    model.set(json!({"name": "Bob"})).expect("new value");
    assert!(!Rc::ptr_eq(&before, &model.row()));
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn change_events_carry_previous_and_new_values() {
    let model = user();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    model.on("change:email", move |event| {
        if let ModelEvent::ChangeKey { key, prev, change } = event {
            sink.borrow_mut().push(format!(
                "{key}: {:?} -> {:?}",
                prev.as_str(),
                change.as_str()
            ));
        }
    });
    let sink = Rc::clone(&seen);
    model.on("change", move |event| {
        if let ModelEvent::Change { prev, changes } = event {
            sink.borrow_mut().push(format!(
                "change {} was {:?}",
                changes.keys().cloned().collect::<Vec<_>>().join(","),
                prev.get("email").and_then(Value::as_str)
            ));
        }
    });

    model.set(json!({"email": "ANN@X.ORG", "age": 3})).expect("valid");
    assert_eq!(
        *seen.borrow(),
        vec![
            "email: None -> Some(\"ann@x.org\")".to_string(),
            "change email,age was None".to_string(),
        ]
    );
}

#[test]
fn primary_key_is_immutable_after_construction() {
    let model = user();
    assert_eq!(
        model.set(json!({"id": 2})),
        Err(EntityError::ConstValue { key: "id".into() })
    );
    assert_eq!(model.get("id").as_f64(), Some(1.0));
    assert_eq!(model.primary_value().as_f64(), Some(1.0));
    model.set(json!({"id": 1})).expect("unchanged primary is fine");
}

#[test]
fn invalid_values_are_reported_with_their_rendering() {
    let model = user();
    assert_eq!(
        model.set(json!({"role": "root"})),
        Err(EntityError::InvalidValue {
            key: "role".into(),
            value: "\"root\"".into()
        })
    );
    assert_eq!(
        model.set(json!({"age": -1})),
        Err(EntityError::InvalidValue {
            key: "age".into(),
            value: "-1".into()
        })
    );
    assert_eq!(
        model.set(json!({"nickname": "x"})),
        Err(EntityError::UnknownProperty {
            key: "nickname".into()
        })
    );
    assert_eq!(model.set(json!([1])), Err(EntityError::DataShouldBeObject));
}

#[test]
fn is_valid_distinguishes_malformed_calls() {
    let model = user();
    assert_eq!(model.is_valid(json!({"age": 5})), Ok(true));
    assert_eq!(model.is_valid(json!({"age": "nope"})), Ok(false));
    assert_eq!(model.is_valid(json!("nope")), Err(EntityError::DataShouldBeObject));
    assert!(model.get("age").is_null());
}

#[test]
fn catch_all_key_matcher() {
    let metrics = Model::new::<Metrics>(Value::Null).expect("empty metrics");
    metrics.set(json!({"x_1": "5"})).expect("matching key");
    assert_eq!(metrics.get("x_1").as_f64(), Some(5.0));
    assert_eq!(
        metrics.set(json!({"y": 5})),
        Err(EntityError::InvalidKey { key: "y".into() })
    );
}

#[test]
fn row_hooks_prepare_validate_and_json() {
    let period = Model::new::<Period>(json!({"start": 10, "end": 2})).expect("valid period");
    assert_eq!(period.get("start").as_f64(), Some(2.0));
    assert_eq!(period.get("end").as_f64(), Some(10.0));

    assert_eq!(
        period.set(json!({"end": 2})),
        Err(EntityError::RowRejected("period is empty".into()))
    );
    assert_eq!(
        period.to_json().expect("serializable"),
        json!({"start": 2, "end": 10, "length": 8})
    );
}

#[test]
fn unique_array_and_json_export() {
    let model = Model::new::<User>(json!({
        "id": 7,
        "name": "Eve",
        "tags": ["a", "b", "a"],
    }))
    .expect("valid user");
    assert_eq!(
        model.to_json().expect("serializable"),
        json!({
            "id": 7,
            "name": "Eve",
            "email": null,
            "age": null,
            "role": null,
            "tags": ["a", "b"],
        })
    );
}

#[test]
fn clone_is_equal_and_independent() {
    let model = Model::new::<User>(json!({"id": 3, "name": "Kim", "tags": ["x"]}))
        .expect("valid user");
    let copy = model.deep_clone();

    assert!(copy.equal(&model));
    assert!(model.equal(&copy));
    assert_ne!(copy.cid(), model.cid());
    assert!(!Rc::ptr_eq(&copy.row(), &model.row()));
    assert!(!copy.get("tags").same(&model.get("tags")));
    assert_eq!(copy.primary_value().as_f64(), Some(3.0));

    copy.set(json!({"name": "Lee"})).expect("valid");
    assert_eq!(model.get("name").as_str(), Some("Kim"));
    assert!(!copy.equal(&model));
}

#[test]
fn equal_against_plain_rows() {
    let model = user();
    let row = json!({
        "id": 1, "name": "Ann", "email": null, "age": null, "role": null, "tags": null
    });
    assert!(model.equal(row.clone()));

    let mut extra = row;
    extra["unknown"] = json!(1);
    assert!(!model.equal(extra));
    assert!(!model.equal(json!({"id": 1, "name": "Ann"})));
}

#[test]
fn custom_prepare_and_validate_run_on_non_null_values() {
    struct Slug;

    impl ModelSchema for Slug {
        fn structure() -> Structure {
            Structure::new().field(
                "slug",
                TypeParams::new("string")
                    .prepare(|value, _, _| {
                        Ok(Value::from(value.as_str().unwrap_or_default().replace(' ', "-")))
                    })
                    .validate(|value, _| value.as_str().is_some_and(|s| s.len() <= 8)),
            )
        }
    }

    let slug = Model::new::<Slug>(json!({"slug": "a b c"})).expect("valid");
    assert_eq!(slug.get("slug").as_str(), Some("a-b-c"));
    assert!(slug.set(json!({"slug": null})).is_ok());
    assert!(matches!(
        slug.set(json!({"slug": "far too long"})),
        Err(EntityError::InvalidValue { .. })
    ));
}

#[test]
fn reserved_primary_key_name_is_rejected() {
    struct Bad;

    impl ModelSchema for Bad {
        fn structure() -> Structure {
            Structure::new().field("row", types::number().primary())
        }
    }

    let err = Model::new::<Bad>(Value::Null).unwrap_err();
    assert!(matches!(err.root(), EntityError::ReservedPrimaryKey { .. }));
}
