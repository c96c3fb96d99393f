use std::rc::Rc;

use super::any::{clone_value, equal_values};
use crate::error::EntityError;
use crate::guard::CycleGuard;
use crate::model::Model;
use crate::type_def::{create_type, Type, TypeParams, TypeVariant};
use crate::value::{render_value, Value};

/// One of several types: the first alternative that prepares and validates
/// the input wins.
#[derive(Debug)]
pub struct OrType {
    alternatives: Vec<Rc<Type>>,
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let alternatives = std::mem::take(&mut params.or)
        .into_iter()
        .map(|decl| create_type(decl, key))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Box::new(OrType { alternatives }))
}

impl TypeVariant for OrType {
    fn prepare(&self, value: Value, key: &str, model: &Model) -> Result<Value, EntityError> {
        if value.is_null() {
            return Ok(value);
        }
        for alternative in &self.alternatives {
            if let Ok(prepared) = alternative.prepare(value.clone(), key, model) {
                if alternative.validate(&prepared, key) {
                    return Ok(prepared);
                }
            }
        }
        Err(EntityError::InvalidValue {
            key: key.to_string(),
            value: render_value(&value),
        })
    }

    fn adopt(&self, value: &Value, owner: &Model) {
        for alternative in &self.alternatives {
            alternative.adopt(value, owner);
        }
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, _parent: Option<&Model>) -> Value {
        clone_value(value, guard)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        equal_values(a, b, guard)
    }

    fn type_as_string(&self, _tag: &str) -> String {
        self.alternatives
            .iter()
            .map(|alternative| alternative.type_as_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EntityError;
    use crate::type_def::{create_type, TypeDecl};
    use crate::value::Value;
    use crate::Model;
    use serde_json::json;

    #[test]
    fn test_first_matching_alternative_wins() {
        let ty = create_type(TypeDecl::from(json!({"type": "or", "or": ["boolean", "date"]})), "x")
            .unwrap();
        let owner = Model::detached();
        assert_eq!(ty.prepare(Value::from(1), "x", &owner).unwrap().as_bool(), Some(true));
        assert!(ty
            .prepare(Value::from("2020-01-01"), "x", &owner)
            .unwrap()
            .as_date()
            .is_some());
        assert_eq!(ty.type_as_string(), "boolean | date");
    }

    #[test]
    fn test_no_alternative_matches() {
        let ty = create_type(TypeDecl::from(json!({"type": "or", "or": ["number", "boolean"]})), "x")
            .unwrap();
        let err = ty.prepare(Value::from("abc"), "x", &Model::detached()).unwrap_err();
        assert_eq!(
            err,
            EntityError::InvalidValue {
                key: "x".into(),
                value: "\"abc\"".into()
            }
        );
    }
}
