use std::rc::Rc;

use indexmap::IndexMap;

use super::any::{equal_values, rc_id, value_to_json};
use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::Model;
use crate::type_def::{create_type, Type, TypeDecl, TypeParams, TypeVariant};
use crate::value::{render_value, Fields, Value};

/// Plain objects.
///
/// With a `structure` the object is an embedded record: undeclared keys are
/// rejected and every declared key is materialized. With an `element`
/// declaration every value shares that type. Without either, any plain
/// object is accepted as is.
#[derive(Debug)]
pub struct ObjectType {
    structure: Option<IndexMap<String, Rc<Type>>>,
    element: Option<Rc<Type>>,
}

/// A nested structure literal → `{type: "object", structure}`.
pub fn normalize(params: &mut TypeParams) {
    let structure = match params.type_.as_deref() {
        Some(TypeDecl::Structure(structure)) => structure.clone(),
        _ => return,
    };
    params.set_tag("object");
    if params.structure.is_none() {
        params.structure = Some(structure);
    }
}

pub fn construct(params: &mut TypeParams, key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    let structure = match params.structure.take() {
        Some(structure) => {
            let mut fields = IndexMap::with_capacity(structure.len());
            for (field, decl) in structure {
                let ty = create_type(decl, &field).map_err(|err| err.in_field(&field))?;
                fields.insert(field, ty);
            }
            Some(fields)
        }
        None => None,
    };
    let element = params
        .element
        .take()
        .map(|decl| create_type(*decl, key))
        .transpose()?;

    Ok(Box::new(ObjectType { structure, element }))
}

impl ObjectType {
    fn field_type(&self, key: &str) -> Option<&Rc<Type>> {
        match &self.structure {
            Some(fields) => fields.get(key),
            None => self.element.as_ref(),
        }
    }

    fn prepare_field(
        ty: &Type,
        value: Value,
        path: &str,
        model: &Model,
    ) -> Result<Value, EntityError> {
        let value = ty.prepare(value, path, model)?;
        if !ty.validate(&value, path) {
            return Err(EntityError::InvalidValue {
                key: path.to_string(),
                value: render_value(&value),
            });
        }
        if value.is_null() && ty.is_required() {
            return Err(EntityError::Required {
                key: path.to_string(),
            });
        }
        Ok(value)
    }
}

impl TypeVariant for ObjectType {
    fn prepare(&self, value: Value, key: &str, model: &Model) -> Result<Value, EntityError> {
        let input = match &value {
            Value::Null => return Ok(Value::Null),
            Value::Object(fields) => Rc::clone(fields),
            other => {
                return Err(EntityError::InvalidTypeValue {
                    key: key.to_string(),
                    expected: "object".to_string(),
                    invalid_value: render_value(other),
                })
            }
        };

        let mut prepared = Fields::with_capacity(input.len());
        if let Some(structure) = &self.structure {
            if let Some(unknown) = input.keys().find(|k| !structure.contains_key(*k)) {
                return Err(EntityError::UnknownProperty {
                    key: format!("{key}.{unknown}"),
                });
            }
            for (field, ty) in structure {
                let raw = match input.get(field) {
                    Some(v) => v.clone(),
                    None => ty.default_value(),
                };
                let path = format!("{key}.{field}");
                prepared.insert(field.clone(), Self::prepare_field(ty, raw, &path, model)?);
            }
        } else if let Some(element) = &self.element {
            for (field, raw) in input.iter() {
                let path = format!("{key}.{field}");
                prepared.insert(
                    field.clone(),
                    Self::prepare_field(element, raw.clone(), &path, model)?,
                );
            }
        } else {
            return Ok(value);
        }

        let unchanged = prepared.len() == input.len()
            && prepared
                .iter()
                .zip(input.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.same(b));
        Ok(if unchanged { value } else { Value::object(prepared) })
    }

    fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        let Value::Object(fields) = value else {
            return value_to_json(value, stack);
        };
        stack.within(rc_id(fields), |stack| {
            let mut json = serde_json::Map::with_capacity(fields.len());
            for (field, item) in fields.iter() {
                let out = match self.field_type(field) {
                    _ if item.is_null() => serde_json::Value::Null,
                    Some(ty) => ty.to_json(item, stack)?,
                    None => value_to_json(item, stack)?,
                };
                json.insert(field.clone(), out);
            }
            Ok(serde_json::Value::Object(json))
        })
    }

    fn clone_value(&self, value: &Value, guard: &mut CycleGuard, parent: Option<&Model>) -> Value {
        let Value::Object(fields) = value else {
            return value.clone();
        };
        let id = rc_id(fields);
        if let Some(done) = guard.get(id) {
            return done.clone();
        }
        let copy = Value::object(
            fields
                .iter()
                .map(|(field, item)| {
                    let item = match self.field_type(field) {
                        Some(ty) => ty.clone_value(item, guard, parent),
                        None => super::any::clone_value(item, guard),
                    };
                    (field.clone(), item)
                })
                .collect(),
        );
        guard.add(id, copy.clone());
        copy
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        let (Value::Object(xs), Value::Object(ys)) = (a, b) else {
            return equal_values(a, b, guard);
        };
        let id = rc_id(xs);
        if guard.contains(id) {
            return true;
        }
        guard.add(id, b.clone());
        if xs.len() != ys.len() {
            return false;
        }
        xs.iter().all(|(field, x)| match (ys.get(field), self.field_type(field)) {
            (Some(y), Some(ty)) => ty.equal(x, y, guard),
            (Some(y), None) => equal_values(x, y, guard),
            (None, _) => false,
        })
    }

    fn type_as_string(&self, tag: &str) -> String {
        match (&self.structure, &self.element) {
            (Some(fields), _) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(field, ty)| format!("{field}: {}", ty.type_as_string()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            (None, Some(element)) => format!("object<{}>", element.type_as_string()),
            (None, None) => tag.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EntityError;
    use crate::guard::JsonStack;
    use crate::type_def::{create_type, TypeDecl};
    use crate::value::Value;
    use crate::Model;
    use serde_json::json;

    fn address() -> std::rc::Rc<crate::type_def::Type> {
        create_type(
            TypeDecl::from(json!({"city": {"type": "string", "required": true}, "zip": "number"})),
            "address",
        )
        .unwrap()
    }

    #[test]
    fn test_structure_materializes_declared_keys() {
        let ty = address();
        assert_eq!(ty.tag(), "object");
        let out = ty
            .prepare(Value::from(json!({"city": "Oslo"})), "address", &Model::detached())
            .unwrap();
        assert_eq!(
            ty.to_json(&out, &mut JsonStack::new()).unwrap(),
            json!({"city": "Oslo", "zip": null})
        );
    }

    #[test]
    fn test_structure_rejects_unknown_keys() {
        let err = address()
            .prepare(
                Value::from(json!({"city": "Oslo", "street": "x"})),
                "address",
                &Model::detached(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            EntityError::UnknownProperty {
                key: "address.street".into()
            }
        );
    }

    #[test]
    fn test_structure_required_field() {
        let err = address()
            .prepare(Value::from(json!({"zip": 1})), "address", &Model::detached())
            .unwrap_err();
        assert_eq!(
            err,
            EntityError::Required {
                key: "address.city".into()
            }
        );
    }

    #[test]
    fn test_element_values() {
        let ty = create_type(
            TypeDecl::from(json!({"type": "object", "element": "number"})),
            "scores",
        )
        .unwrap();
        let out = ty
            .prepare(Value::from(json!({"a": "1", "b": 2})), "scores", &Model::detached())
            .unwrap();
        assert_eq!(
            ty.to_json(&out, &mut JsonStack::new()).unwrap(),
            json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn test_nested_declaration_error_names_both_keys() {
        let err = create_type(TypeDecl::from(json!({"zip": "nope"})), "address").unwrap_err();
        assert!(err.to_string().starts_with("address: zip: "), "{err}");
    }

    #[test]
    fn test_identity_kept_when_unchanged() {
        let ty = address();
        let input = Value::from(json!({"city": "Oslo", "zip": 1}));
        let out = ty.prepare(input.clone(), "address", &Model::detached()).unwrap();
        assert!(out.same(&input));
    }
}
