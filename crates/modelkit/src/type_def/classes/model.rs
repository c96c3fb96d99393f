use crate::error::EntityError;
use crate::guard::CycleGuard;
use crate::model::Model;
use crate::schema::ModelRef;
use crate::type_def::{TypeDecl, TypeParams, TypeVariant};
use crate::value::{render_value, Value};

use super::any::equal_values;

/// A nested model of one declared kind. The owning model becomes the
/// nested model's parent.
#[derive(Debug)]
pub struct ModelRefType {
    model: ModelRef,
}

/// A bare model reference → `{type: "model", model}`.
pub fn normalize(params: &mut TypeParams) {
    let model = match params.type_.as_deref() {
        Some(TypeDecl::Model(model)) => *model,
        _ => return,
    };
    params.set_tag("model");
    if params.model.is_none() {
        params.model = Some(model);
    }
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let model = params.model.take().ok_or_else(|| EntityError::UnknownType {
        key: key.to_string(),
        type_name: "model without a model kind".to_string(),
    })?;
    Ok(Box::new(ModelRefType { model }))
}

impl TypeVariant for ModelRefType {
    fn prepare(&self, value: Value, _key: &str, _owner: &Model) -> Result<Value, EntityError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Model(model) if model.kind_id() == self.model.type_id() => {
                Ok(Value::Model(model))
            }
            Value::Model(model) => Err(EntityError::WrongModelKind {
                expected: self.model.name().to_string(),
                actual: model.kind_name().to_string(),
                collection: None,
            }),
            value @ Value::Object(_) => {
                let model = Model::from_kind(self.model.kind()?, value)?;
                Ok(Value::Model(model))
            }
            other => Err(EntityError::InvalidModelRow {
                model: self.model.name().to_string(),
                invalid_value: render_value(&other),
            }),
        }
    }

    fn adopt(&self, value: &Value, owner: &Model) {
        if let Value::Model(model) = value {
            if model.kind_id() != self.model.type_id() {
                return;
            }
            model.set_parent(Some(owner));
        }
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, parent: Option<&Model>) -> Value {
        let Value::Model(model) = value else {
            return value.clone();
        };
        let copy = model.deep_clone_with(guard);
        if parent.is_some() {
            copy.set_parent(parent);
        }
        Value::Model(copy)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        equal_values(a, b, guard)
    }

    fn type_as_string(&self, _tag: &str) -> String {
        self.model.name().to_string()
    }
}
