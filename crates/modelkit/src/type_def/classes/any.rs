//! The untyped variant and the generic graph algorithms every other variant
//! falls back to.

use std::rc::Rc;

use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::Model;
use crate::type_def::{TypeParams, TypeVariant};
use crate::value::{date_to_iso, number_to_json, Value};

/// Accepts any value unchanged. Registered as `"*"` and `"any"`.
#[derive(Debug, Default)]
pub struct AnyType;

impl TypeVariant for AnyType {
    fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        value_to_json(value, stack)
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, _parent: Option<&Model>) -> Value {
        clone_value(value, guard)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        equal_values(a, b, guard)
    }
}

pub fn construct(_params: &mut TypeParams, _key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    Ok(Box::new(AnyType))
}

pub(crate) fn rc_id<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Plain JSON for `value`. Entities delegate to their own serialization;
/// arrays and objects recurse element-wise with `value` on the active path.
///
/// # Errors
///
/// [`EntityError::CircularStructureToJson`] when a composite is reached
/// again while it is still being serialized.
pub fn value_to_json(value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => Ok(number_to_json(*n)),
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Date(d) => Ok(serde_json::Value::String(date_to_iso(d))),
        Value::Regex(r) => Ok(serde_json::Value::String(r.as_str().to_string())),
        Value::Model(m) => m.to_json_with(stack),
        Value::Collection(c) => c.to_json_with(stack),
        Value::Array(items) => stack.within(rc_id(items), |stack| {
            items
                .iter()
                .map(|item| value_to_json(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        }),
        Value::Object(fields) => stack.within(rc_id(fields), |stack| {
            let mut json = serde_json::Map::with_capacity(fields.len());
            for (key, item) in fields.iter() {
                json.insert(key.clone(), value_to_json(item, stack)?);
            }
            Ok(serde_json::Value::Object(json))
        }),
        Value::Custom(c) => stack.within(rc_id(c), |_| Ok(c.to_json())),
    }
}

/// Deep copy of `value`. A composite seen earlier in the same call maps to
/// the copy already made for it.
pub fn clone_value(value: &Value, guard: &mut CycleGuard) -> Value {
    match value {
        Value::Model(m) => Value::Model(m.deep_clone_with(guard)),
        Value::Collection(c) => Value::Collection(c.deep_clone_with(guard)),
        Value::Array(items) => {
            let id = rc_id(items);
            if let Some(done) = guard.get(id) {
                return done.clone();
            }
            let copy = Value::array(items.iter().map(|item| clone_value(item, guard)).collect());
            guard.add(id, copy.clone());
            copy
        }
        Value::Object(fields) => {
            let id = rc_id(fields);
            if let Some(done) = guard.get(id) {
                return done.clone();
            }
            let copy = Value::object(
                fields
                    .iter()
                    .map(|(key, item)| (key.clone(), clone_value(item, guard)))
                    .collect(),
            );
            guard.add(id, copy.clone());
            copy
        }
        Value::Custom(c) => {
            let id = rc_id(c);
            if let Some(done) = guard.get(id) {
                return done.clone();
            }
            let copy = Value::Custom(c.clone_value());
            guard.add(id, copy.clone());
            copy
        }
        // dates are values; regexes are immutable and shared
        _ => value.clone(),
    }
}

/// Structural equality.
///
/// An array reached a second time is equal only to the counterpart it was
/// first compared with, and so is a collection. An object or model reached a
/// second time is reported equal without comparing again, which keeps aliased
/// graphs linear at the cost of precision.
pub fn equal_values(a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Regex(x), Value::Regex(y)) => x.as_str() == y.as_str(),
        (Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return false;
            }
            let id = rc_id(xs);
            if let Some(seen) = guard.get(id) {
                return seen.same(b);
            }
            guard.add(id, b.clone());
            xs.iter()
                .zip(ys.iter())
                .all(|(x, y)| equal_values(x, y, guard))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            let id = rc_id(xs);
            if guard.contains(id) {
                return true;
            }
            guard.add(id, b.clone());
            if xs.len() != ys.len() {
                return false;
            }
            xs.iter().all(|(key, x)| match ys.get(key) {
                Some(y) => equal_values(x, y, guard),
                None => false,
            })
        }
        (Value::Model(x), Value::Model(_)) => {
            if guard.contains(x.identity()) {
                return true;
            }
            x.equal_with(b, guard)
        }
        (Value::Collection(x), Value::Collection(_)) => x.equal_with(b, guard),
        (Value::Custom(x), Value::Custom(y)) => x.equals(y.as_ref()),
        _ => a.same(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_json_of_nested_plain_values() {
        let value = Value::from(json!({"a": [1, 2.5, "x"], "b": {"c": null}}));
        let out = value_to_json(&value, &mut JsonStack::new()).unwrap();
        assert_eq!(out, json!({"a": [1, 2.5, "x"], "b": {"c": null}}));
    }

    #[test]
    fn test_json_of_date() {
        let date = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let out = value_to_json(&Value::from(date), &mut JsonStack::new()).unwrap();
        assert_eq!(out, json!("2020-01-02T03:04:05.000Z"));
    }

    #[test]
    fn test_shared_array_serializes_twice() {
        let shared = Value::from(json!([1]));
        let value = Value::array(vec![shared.clone(), shared]);
        let out = value_to_json(&value, &mut JsonStack::new()).unwrap();
        assert_eq!(out, json!([[1], [1]]));
    }

    #[test]
    fn test_clone_is_independent_and_keeps_sharing() {
        let shared = Value::from(json!({"x": 1}));
        let value = Value::array(vec![shared.clone(), shared.clone()]);
        let copy = clone_value(&value, &mut CycleGuard::new());

        let items = copy.as_array().unwrap();
        assert!(!items[0].same(&shared));
        assert!(items[0].same(&items[1]));
        assert!(equal_values(&copy, &value, &mut CycleGuard::new()));
    }

    #[test]
    fn test_equal_arrays_and_objects() {
        let mut guard = CycleGuard::new();
        assert!(equal_values(
            &Value::from(json!({"a": [1, {"b": true}]})),
            &Value::from(json!({"a": [1, {"b": true}]})),
            &mut guard
        ));
        assert!(!equal_values(
            &Value::from(json!([1, 2])),
            &Value::from(json!([1, 2, 3])),
            &mut CycleGuard::new()
        ));
        assert!(!equal_values(
            &Value::from(json!({"a": null})),
            &Value::from(json!({})),
            &mut CycleGuard::new()
        ));
        assert!(!equal_values(
            &Value::from(json!({"a": 1})),
            &Value::from(json!({"a": 1, "b": 2})),
            &mut CycleGuard::new()
        ));
    }

    #[test]
    fn test_equal_nan_and_dates() {
        let mut guard = CycleGuard::new();
        assert!(equal_values(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN),
            &mut guard
        ));
        let date = Utc.with_ymd_and_hms(2021, 5, 6, 0, 0, 0).unwrap();
        assert!(equal_values(&Value::from(date), &Value::from(date), &mut guard));
        assert!(!equal_values(&Value::from(1), &Value::from("1"), &mut guard));
    }

    #[test]
    fn test_equal_regex_by_source() {
        let a = Value::from(regex::Regex::new("^a+$").unwrap());
        let b = Value::from(regex::Regex::new("^a+$").unwrap());
        assert!(equal_values(&a, &b, &mut CycleGuard::new()));
    }
}
