use std::any::Any;

use crate::error::EntityError;
use crate::guard::CycleGuard;
use crate::model::Model;
use crate::type_def::{ClassRef, TypeParams, TypeVariant};
use crate::value::{render_value, Value};

use super::any::{clone_value, equal_values};

/// Instances of one application class implementing
/// [`crate::value::CustomValue`].
#[derive(Debug)]
pub struct CustomClassType {
    class: ClassRef,
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let class = params.class.take().ok_or_else(|| EntityError::UnknownType {
        key: key.to_string(),
        type_name: "CustomClass without a class".to_string(),
    })?;
    Ok(Box::new(CustomClassType { class }))
}

impl TypeVariant for CustomClassType {
    fn prepare(&self, value: Value, key: &str, _model: &Model) -> Result<Value, EntityError> {
        let accepted = match &value {
            Value::Null => true,
            Value::Custom(instance) => Any::type_id(instance.as_any()) == self.class.type_id,
            _ => false,
        };
        if accepted {
            return Ok(value);
        }
        Err(EntityError::InvalidTypeValue {
            key: key.to_string(),
            expected: self.class.name.to_string(),
            invalid_value: render_value(&value),
        })
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, _parent: Option<&Model>) -> Value {
        clone_value(value, guard)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        equal_values(a, b, guard)
    }

    fn type_as_string(&self, _tag: &str) -> String {
        self.class.name.to_string()
    }
}
