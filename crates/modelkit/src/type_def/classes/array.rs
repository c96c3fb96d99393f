use std::rc::Rc;

use super::any::{equal_values, rc_id, value_to_json};
use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::Model;
use crate::type_def::{create_type, Type, TypeDecl, TypeParams, TypeVariant};
use crate::value::{compare_values, render_value, Value};

/// Arrays whose elements share one declared type.
///
/// Declared as `{type: "array", element: decl}` or with the `[decl]`
/// shorthand. Options: `sort`, `unique`, `nullAsEmpty`, `emptyAsNull`.
#[derive(Debug)]
pub struct ArrayType {
    element: Rc<Type>,
    sort: bool,
    unique: bool,
    null_as_empty: bool,
    empty_as_null: bool,
}

/// `[decl]` → `{type: "array", element: decl}`.
pub fn normalize(params: &mut TypeParams) {
    let element = match params.type_.as_deref() {
        Some(TypeDecl::List(items)) => items.first().cloned(),
        _ => return,
    };
    params.set_tag("array");
    if params.element.is_none() {
        params.element = element.map(Box::new);
    }
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let null_as_empty = params.option_bool("nullAsEmpty");
    let empty_as_null = params.option_bool("emptyAsNull");
    if null_as_empty && empty_as_null {
        return Err(EntityError::ConflictingParameters {
            first: "nullAsEmpty",
            second: "emptyAsNull",
        });
    }

    let element = match params.element.take() {
        Some(decl) => create_type(*decl, key)?,
        None => create_type(TypeDecl::from("any"), key)?,
    };

    Ok(Box::new(ArrayType {
        element,
        sort: params.option_bool("sort"),
        unique: params.option_bool("unique"),
        null_as_empty,
        empty_as_null,
    }))
}

impl ArrayType {
    pub fn element(&self) -> &Rc<Type> {
        &self.element
    }
}

impl TypeVariant for ArrayType {
    fn prepare(&self, value: Value, key: &str, model: &Model) -> Result<Value, EntityError> {
        let items = match &value {
            Value::Null if self.null_as_empty => return Ok(Value::array(Vec::new())),
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => Rc::clone(items),
            other => {
                return Err(EntityError::InvalidTypeValue {
                    key: key.to_string(),
                    expected: "array".to_string(),
                    invalid_value: render_value(other),
                })
            }
        };

        let mut prepared: Vec<Value> = Vec::with_capacity(items.len());
        for item in items.iter() {
            let item = self.element.prepare(item.clone(), key, model)?;
            if !self.element.validate(&item, key) {
                return Err(EntityError::InvalidValue {
                    key: key.to_string(),
                    value: render_value(&item),
                });
            }
            if self.unique && prepared.iter().any(|seen| seen.same(&item)) {
                continue;
            }
            prepared.push(item);
        }
        if self.sort {
            prepared.sort_by(compare_values);
        }
        if prepared.is_empty() && self.empty_as_null {
            return Ok(Value::Null);
        }

        let unchanged = prepared.len() == items.len()
            && prepared.iter().zip(items.iter()).all(|(a, b)| a.same(b));
        Ok(if unchanged { value } else { Value::array(prepared) })
    }

    fn adopt(&self, value: &Value, owner: &Model) {
        if let Value::Array(items) = value {
            for item in items.iter() {
                self.element.adopt(item, owner);
            }
        }
    }

    fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        let Value::Array(items) = value else {
            return value_to_json(value, stack);
        };
        stack.within(rc_id(items), |stack| {
            items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        Ok(serde_json::Value::Null)
                    } else {
                        self.element.to_json(item, stack)
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        })
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, parent: Option<&Model>) -> Value {
        let Value::Array(items) = value else {
            return value.clone();
        };
        let id = rc_id(items);
        if let Some(done) = guard.get(id) {
            return done.clone();
        }
        let copy = Value::array(
            items
                .iter()
                .map(|item| self.element.clone_value(item, guard, parent))
                .collect(),
        );
        guard.add(id, copy.clone());
        copy
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        let (Value::Array(xs), Value::Array(ys)) = (a, b) else {
            return equal_values(a, b, guard);
        };
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
            .all(|(x, y)| self.element.equal(x, y, guard))
    }

    fn type_as_string(&self, _tag: &str) -> String {
        format!("array<{}>", self.element.type_as_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EntityError;
    use crate::type_def::{create_type, TypeDecl};
    use crate::value::Value;
    use crate::Model;
    use serde_json::json;

    fn prepare(decl: serde_json::Value, input: serde_json::Value) -> Result<Value, EntityError> {
        let ty = create_type(TypeDecl::from(decl), "tags")?;
        ty.prepare(Value::from(input), "tags", &Model::detached())
    }

    #[test]
    fn test_shorthand_declares_element() {
        let ty = create_type(TypeDecl::from(json!(["number"])), "tags").unwrap();
        assert_eq!(ty.tag(), "array");
        assert_eq!(ty.type_as_string(), "array<number>");
    }

    #[test]
    fn test_elements_are_prepared() {
        let out = prepare(json!(["number"]), json!(["1", 2])).unwrap();
        let items: Vec<f64> = out.as_array().unwrap().iter().filter_map(Value::as_f64).collect();
        assert_eq!(items, vec![1.0, 2.0]);
    }

    #[test]
    fn test_element_failure() {
        let err = prepare(json!(["number"]), json!(["x"])).unwrap_err();
        assert!(matches!(err, EntityError::InvalidTypeValue { .. }));
        let err = prepare(json!({"type": "array", "element": {"type": "number", "enum": [1]}}), json!([2]))
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidValue { .. }));
    }

    #[test]
    fn test_sort_and_unique() {
        let out = prepare(
            json!({"type": "array", "element": "string", "sort": true, "unique": true}),
            json!(["b", "a", "b", "10"]),
        )
        .unwrap();
        let items: Vec<&str> = out.as_array().unwrap().iter().filter_map(Value::as_str).collect();
        assert_eq!(items, vec!["10", "a", "b"]);
    }

    #[test]
    fn test_identity_kept_when_unchanged() {
        let ty = create_type(TypeDecl::from(json!(["string"])), "tags").unwrap();
        let input = Value::from(json!(["a", "b"]));
        let out = ty.prepare(input.clone(), "tags", &Model::detached()).unwrap();
        assert!(out.same(&input));
    }

    #[test]
    fn test_null_and_empty_options() {
        let out = prepare(json!({"type": "array", "nullAsEmpty": true}), json!(null)).unwrap();
        assert_eq!(out.as_array().map(|a| a.len()), Some(0));
        let out = prepare(json!({"type": "array", "emptyAsNull": true}), json!([])).unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn test_rejects_non_array() {
        let err = prepare(json!(["string"]), json!("a")).unwrap_err();
        assert!(matches!(err, EntityError::InvalidTypeValue { .. }));
    }
}
