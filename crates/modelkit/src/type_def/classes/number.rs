use crate::error::EntityError;
use crate::model::Model;
use crate::type_def::{TypeParams, TypeVariant};
use crate::value::{render_value, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rounding {
    Round(i32),
    Floor(i32),
    Ceil(i32),
}

impl Rounding {
    fn apply(self, n: f64) -> f64 {
        let (Rounding::Round(digits) | Rounding::Floor(digits) | Rounding::Ceil(digits)) = self;
        let factor = 10f64.powi(digits);
        let scaled = n * factor;
        if !scaled.is_finite() {
            return n;
        }
        let rounded = match self {
            // half-way values round towards +Infinity
            Rounding::Round(_) => (scaled + 0.5).floor(),
            Rounding::Floor(_) => scaled.floor(),
            Rounding::Ceil(_) => scaled.ceil(),
        };
        rounded / factor
    }
}

/// Finite numbers.
///
/// Numeric strings are parsed and blank strings count as absent. Options:
///
/// - `nullAsZero` / `zeroAsNull`
/// - `round`, `floor`, `ceil`: number of decimal digits to keep
/// - `unsigned`: negative values fail validation
#[derive(Debug, Default)]
pub struct NumberType {
    null_as_zero: bool,
    zero_as_null: bool,
    rounding: Option<Rounding>,
    unsigned: bool,
}

/// Digits past this are below `f64` precision.
const MAX_DIGITS: f64 = 15.0;

fn digits(params: &TypeParams, name: &str) -> Option<i32> {
    match params.options.get(name) {
        Some(serde_json::Value::Bool(true)) => Some(0),
        Some(serde_json::Value::Number(n)) => {
            n.as_f64().map(|d| d.clamp(0.0, MAX_DIGITS) as i32)
        }
        _ => None,
    }
}

pub fn construct(params: &mut TypeParams, _key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let null_as_zero = params.option_bool("nullAsZero");
    let zero_as_null = params.option_bool("zeroAsNull");
    if null_as_zero && zero_as_null {
        return Err(EntityError::ConflictingParameters {
            first: "nullAsZero",
            second: "zeroAsNull",
        });
    }

    let declared = [
        ("round", digits(params, "round").map(Rounding::Round)),
        ("floor", digits(params, "floor").map(Rounding::Floor)),
        ("ceil", digits(params, "ceil").map(Rounding::Ceil)),
    ];
    let mut rounding: Option<(&'static str, Rounding)> = None;
    for (name, mode) in declared {
        let Some(mode) = mode else { continue };
        if let Some((first, _)) = rounding {
            return Err(EntityError::ConflictingParameters { first, second: name });
        }
        rounding = Some((name, mode));
    }

    Ok(Box::new(NumberType {
        null_as_zero,
        zero_as_null,
        rounding: rounding.map(|(_, mode)| mode),
        unsigned: params.option_bool("unsigned"),
    }))
}

impl NumberType {
    fn invalid(key: &str, value: &Value) -> EntityError {
        EntityError::InvalidTypeValue {
            key: key.to_string(),
            expected: "number".to_string(),
            invalid_value: render_value(value),
        }
    }
}

impl TypeVariant for NumberType {
    fn prepare(&self, value: Value, key: &str, _model: &Model) -> Result<Value, EntityError> {
        let parsed = match &value {
            Value::Null => None,
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Some(n),
                _ => return Err(Self::invalid(key, &value)),
            },
            _ => return Err(Self::invalid(key, &value)),
        };

        let Some(mut n) = parsed else {
            return Ok(if self.null_as_zero {
                Value::Number(0.0)
            } else {
                Value::Null
            });
        };

        if let Some(mode) = self.rounding {
            n = mode.apply(n);
        }
        if self.zero_as_null && n == 0.0 {
            return Ok(Value::Null);
        }
        Ok(Value::Number(n))
    }

    fn validate(&self, value: &Value, _key: &str) -> bool {
        match value {
            Value::Number(n) if self.unsigned => *n >= 0.0,
            _ => true,
        }
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
        let ty = create_type(TypeDecl::from(decl), "n")?;
        ty.prepare(input, "n", &Model::detached())
    }

    #[test]
    fn test_parses_numeric_strings() {
        assert_eq!(prepare(json!("number"), Value::from(" 42 ")).unwrap().as_f64(), Some(42.0));
        assert_eq!(prepare(json!("number"), Value::from("-1.5")).unwrap().as_f64(), Some(-1.5));
        assert!(prepare(json!("number"), Value::from("")).unwrap().is_null());
    }

    #[test]
    fn test_rejects_non_numbers() {
        for bad in [
            Value::from("abc"),
            Value::from("NaN"),
            Value::from(true),
            Value::Number(f64::NAN),
            Value::Number(f64::NEG_INFINITY),
            Value::from(json!([1])),
        ] {
            let err = prepare(json!("number"), bad).unwrap_err();
            assert!(matches!(err, EntityError::InvalidTypeValue { .. }), "{err}");
        }
    }

    #[test]
    fn test_excess_digits_keep_the_value_finite() {
        let out = prepare(json!({"type": "number", "round": 400}), Value::from(1.5)).unwrap();
        assert_eq!(out.as_f64(), Some(1.5));
        let out = prepare(json!({"type": "number", "floor": 2}), Value::from(1e307)).unwrap();
        assert_eq!(out.as_f64(), Some(1e307));
    }

    #[test]
    fn test_rounding_modes() {
        let round = |decl, n: f64| prepare(decl, Value::from(n)).unwrap().as_f64().unwrap();
        assert_eq!(round(json!({"type": "number", "round": 1}), 1.25), 1.3);
        assert_eq!(round(json!({"type": "number", "round": 0}), -2.5), -2.0);
        assert_eq!(round(json!({"type": "number", "floor": 0}), 1.9), 1.0);
        assert_eq!(round(json!({"type": "number", "ceil": 2}), 1.001), 1.01);
    }

    #[test]
    fn test_null_and_zero_options() {
        let out = prepare(json!({"type": "number", "nullAsZero": true}), Value::Null).unwrap();
        assert_eq!(out.as_f64(), Some(0.0));
        let out = prepare(json!({"type": "number", "zeroAsNull": true}), Value::from(0)).unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn test_conflicting_rounding() {
        let err = create_type(
            TypeDecl::from(json!({"type": "number", "round": 1, "ceil": 1})),
            "n",
        )
        .unwrap_err();
        assert_eq!(
            err.root(),
            &EntityError::ConflictingParameters {
                first: "round",
                second: "ceil"
            }
        );
    }

    #[test]
    fn test_unsigned() {
        let ty = create_type(TypeDecl::from(json!({"type": "number", "unsigned": true})), "n").unwrap();
        assert!(ty.validate(&Value::from(0), "n"));
        assert!(!ty.validate(&Value::from(-1), "n"));
        assert!(ty.validate(&Value::Null, "n"));
    }
}
