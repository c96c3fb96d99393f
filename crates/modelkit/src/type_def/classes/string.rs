use crate::error::EntityError;
use crate::model::Model;
use crate::type_def::{TypeParams, TypeVariant};
use crate::value::{number_to_string, render_value, Value};

/// Text values.
///
/// Finite numbers are accepted and stored in their decimal form. Options:
///
/// - `nullAsEmpty`: absent input becomes `""`
/// - `emptyAsNull`: `""` (after trimming) becomes absent
/// - `trim`, `lower`, `upper`: normalisation applied in that order
#[derive(Debug, Default)]
pub struct StringType {
    null_as_empty: bool,
    empty_as_null: bool,
    trim: bool,
    lower: bool,
    upper: bool,
}

pub fn construct(params: &mut TypeParams, _key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let variant = StringType {
        null_as_empty: params.option_bool("nullAsEmpty"),
        empty_as_null: params.option_bool("emptyAsNull"),
        trim: params.option_bool("trim"),
        lower: params.option_bool("lower"),
        upper: params.option_bool("upper"),
    };

    if variant.null_as_empty && variant.empty_as_null {
        return Err(EntityError::ConflictingParameters {
            first: "nullAsEmpty",
            second: "emptyAsNull",
        });
    }
    if variant.lower && variant.upper {
        return Err(EntityError::ConflictingParameters {
            first: "lower",
            second: "upper",
        });
    }

    Ok(Box::new(variant))
}

impl TypeVariant for StringType {
    fn prepare(&self, value: Value, key: &str, _model: &Model) -> Result<Value, EntityError> {
        let mut text = match value {
            Value::Null if self.null_as_empty => return Ok(Value::from("")),
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s,
            Value::Number(n) if n.is_finite() => number_to_string(n),
            other => {
                return Err(EntityError::InvalidTypeValue {
                    key: key.to_string(),
                    expected: "string".to_string(),
                    invalid_value: render_value(&other),
                })
            }
        };

        if self.trim {
            text = text.trim().to_string();
        }
        if self.empty_as_null && text.is_empty() {
            return Ok(Value::Null);
        }
        if self.lower {
            text = text.to_lowercase();
        } else if self.upper {
            text = text.to_uppercase();
        }

        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EntityError;
    use crate::type_def::{create_type, TypeDecl};
    use crate::value::Value;
    use crate::Model;
    use serde_json::json;

    fn prepare(decl: serde_json::Value, input: Value) -> Result<Value, EntityError> {
        let ty = create_type(TypeDecl::from(decl), "name")?;
        ty.prepare(input, "name", &Model::detached())
    }

    #[test]
    fn test_numbers_become_text() {
        let out = prepare(json!("string"), Value::from(10)).unwrap();
        assert_eq!(out.as_str(), Some("10"));
        let out = prepare(json!("string"), Value::from(1.5)).unwrap();
        assert_eq!(out.as_str(), Some("1.5"));
    }

    #[test]
    fn test_rejects_non_text() {
        for bad in [
            Value::from(true),
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::from(json!({"a": 1})),
            Value::from(json!([1])),
        ] {
            let err = prepare(json!("string"), bad).unwrap_err();
            assert!(matches!(err, EntityError::InvalidTypeValue { .. }), "{err}");
        }
    }

    #[test]
    fn test_trim_and_case() {
        let out = prepare(json!({"type": "string", "trim": true, "lower": true}), Value::from("  HeLLo "))
            .unwrap();
        assert_eq!(out.as_str(), Some("hello"));
        let out = prepare(json!({"type": "string", "upper": true}), Value::from("abc")).unwrap();
        assert_eq!(out.as_str(), Some("ABC"));
    }

    #[test]
    fn test_null_and_empty_options() {
        let out = prepare(json!({"type": "string", "nullAsEmpty": true}), Value::Null).unwrap();
        assert_eq!(out.as_str(), Some(""));
        let out = prepare(
            json!({"type": "string", "emptyAsNull": true, "trim": true}),
            Value::from("   "),
        )
        .unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn test_conflicting_null_options() {
        let err = create_type(
            TypeDecl::from(json!({"type": "string", "nullAsEmpty": true, "emptyAsNull": true})),
            "name",
        )
        .unwrap_err();
        assert_eq!(
            err.root(),
            &EntityError::ConflictingParameters {
                first: "nullAsEmpty",
                second: "emptyAsNull"
            }
        );
    }
}
