use crate::collection::Collection;
use crate::error::EntityError;
use crate::guard::CycleGuard;
use crate::model::Model;
use crate::schema::CollectionRef;
use crate::type_def::{TypeDecl, TypeParams, TypeVariant};
use crate::value::{render_value, Value};

use super::any::equal_values;

/// A nested collection of one declared kind, owned by the model holding it.
#[derive(Debug)]
pub struct CollectionRefType {
    collection: CollectionRef,
}

/// A bare collection reference → `{type: "collection", collection}`.
pub fn normalize(params: &mut TypeParams) {
    let collection = match params.type_.as_deref() {
        Some(TypeDecl::Collection(collection)) => *collection,
        _ => return,
    };
    params.set_tag("collection");
    if params.collection.is_none() {
        params.collection = Some(collection);
    }
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let collection = params.collection.take().ok_or_else(|| EntityError::UnknownType {
        key: key.to_string(),
        type_name: "collection without a collection kind".to_string(),
    })?;
    Ok(Box::new(CollectionRefType { collection }))
}

impl TypeVariant for CollectionRefType {
    fn prepare(&self, value: Value, _key: &str, _owner: &Model) -> Result<Value, EntityError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Collection(collection) if collection.kind_id() == self.collection.type_id() => {
                Ok(Value::Collection(collection))
            }
            Value::Collection(collection) => Err(EntityError::WrongModelKind {
                expected: self.collection.name().to_string(),
                actual: collection.kind_name().to_string(),
                collection: None,
            }),
            value @ Value::Array(_) => {
                let collection = Collection::from_kind(self.collection.kind()?, value)?;
                Ok(Value::Collection(collection))
            }
            other => Err(EntityError::InvalidModelRow {
                model: self.collection.name().to_string(),
                invalid_value: render_value(&other),
            }),
        }
    }

    fn adopt(&self, value: &Value, owner: &Model) {
        if let Value::Collection(collection) = value {
            if collection.kind_id() != self.collection.type_id() {
                return;
            }
            collection.set_parent(Some(owner));
        }
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, parent: Option<&Model>) -> Value {
        let Value::Collection(collection) = value else {
            return value.clone();
        };
        let copy = collection.deep_clone_with(guard);
        if parent.is_some() {
            copy.set_parent(parent);
        }
        Value::Collection(copy)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        equal_values(a, b, guard)
    }

    fn type_as_string(&self, _tag: &str) -> String {
        self.collection.name().to_string()
    }
}
