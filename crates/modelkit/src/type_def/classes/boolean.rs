use crate::error::EntityError;
use crate::model::Model;
use crate::type_def::{TypeParams, TypeVariant};
use crate::value::{render_value, Value};

/// `true` / `false`; the numbers `0` and `1` are accepted as well.
#[derive(Debug, Default)]
pub struct BooleanType;

pub fn construct(_params: &mut TypeParams, _key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    Ok(Box::new(BooleanType))
}

impl TypeVariant for BooleanType {
    fn prepare(&self, value: Value, key: &str, _model: &Model) -> Result<Value, EntityError> {
        match value {
            Value::Null | Value::Bool(_) => Ok(value),
            Value::Number(n) if n == 0.0 => Ok(Value::Bool(false)),
            Value::Number(n) if n == 1.0 => Ok(Value::Bool(true)),
            other => Err(EntityError::InvalidTypeValue {
                key: key.to_string(),
                expected: "boolean".to_string(),
                invalid_value: render_value(&other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EntityError;
    use crate::type_def::{create_type, TypeDecl};
    use crate::value::Value;
    use crate::Model;

    #[test]
    fn test_accepts_zero_and_one() {
        let ty = create_type(TypeDecl::from("boolean"), "flag").unwrap();
        let owner = Model::detached();
        assert_eq!(ty.prepare(Value::from(1), "flag", &owner).unwrap().as_bool(), Some(true));
        assert_eq!(ty.prepare(Value::from(0), "flag", &owner).unwrap().as_bool(), Some(false));
        assert_eq!(ty.prepare(Value::from(false), "flag", &owner).unwrap().as_bool(), Some(false));
        assert!(ty.prepare(Value::Null, "flag", &owner).unwrap().is_null());
    }

    #[test]
    fn test_rejects_other_values() {
        let ty = create_type(TypeDecl::from("boolean"), "flag").unwrap();
        let err = ty.prepare(Value::from("true"), "flag", &Model::detached()).unwrap_err();
        assert_eq!(
            err,
            EntityError::InvalidTypeValue {
                key: "flag".into(),
                expected: "boolean".into(),
                invalid_value: "\"true\"".into()
            }
        );
        assert!(ty.prepare(Value::from(2), "flag", &Model::detached()).is_err());
    }
}
