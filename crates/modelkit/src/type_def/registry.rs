//! Process-wide table from type tag to variant constructor.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{OnceLock, PoisonError, RwLock};

use log::debug;

use super::classes;
use super::params::{TypeDecl, TypeParams};
use super::{Type, TypeVariant};
use crate::error::EntityError;
use crate::schema::is_reserved_member;

/// Builds a variant from its parameter object. The constructor takes the
/// variant specific parameters it consumes out of `params`.
pub type VariantCtor = fn(&mut TypeParams, &str) -> Result<Box<dyn TypeVariant>, EntityError>;

/// Rewrites a shorthand declaration into a tagged parameter object.
pub type NormalizeFn = fn(&mut TypeParams);

#[derive(Clone, Copy)]
struct VariantEntry {
    construct: VariantCtor,
    normalize: Option<NormalizeFn>,
}

static REGISTRY: OnceLock<RwLock<HashMap<String, VariantEntry>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, VariantEntry>> {
    REGISTRY.get_or_init(|| RwLock::new(builtin_variants()))
}

fn builtin_variants() -> HashMap<String, VariantEntry> {
    let plain = |construct: VariantCtor| VariantEntry {
        construct,
        normalize: None,
    };
    let mut table = HashMap::new();
    table.insert("*".to_string(), plain(classes::any::construct));
    table.insert("any".to_string(), plain(classes::any::construct));
    table.insert("string".to_string(), plain(classes::string::construct));
    table.insert("number".to_string(), plain(classes::number::construct));
    table.insert("boolean".to_string(), plain(classes::boolean::construct));
    table.insert("date".to_string(), plain(classes::date::construct));
    table.insert(
        "array".to_string(),
        VariantEntry {
            construct: classes::array::construct,
            normalize: Some(classes::array::normalize),
        },
    );
    table.insert(
        "object".to_string(),
        VariantEntry {
            construct: classes::object::construct,
            normalize: Some(classes::object::normalize),
        },
    );
    table.insert("or".to_string(), plain(classes::or::construct));
    table.insert(
        "model".to_string(),
        VariantEntry {
            construct: classes::model::construct,
            normalize: Some(classes::model::normalize),
        },
    );
    table.insert(
        "collection".to_string(),
        VariantEntry {
            construct: classes::collection::construct,
            normalize: Some(classes::collection::normalize),
        },
    );
    table.insert(
        "CustomClass".to_string(),
        plain(classes::custom_class::construct),
    );
    table
}

/// Register (or replace) the variant for `tag`. Last writer wins.
pub fn register_type(tag: &str, construct: VariantCtor) {
    register_entry(tag, VariantEntry { construct, normalize: None });
}

/// Like [`register_type`], with a normalizer that may recognise shorthand
/// declarations and rewrite them to `tag`.
pub fn register_type_with(tag: &str, construct: VariantCtor, normalize: NormalizeFn) {
    register_entry(
        tag,
        VariantEntry {
            construct,
            normalize: Some(normalize),
        },
    );
}

fn register_entry(tag: &str, entry: VariantEntry) {
    debug!("registering type variant {tag:?}");
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(tag.to_string(), entry);
}

pub fn is_registered(tag: &str) -> bool {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(tag)
}

/// Resolve the declaration of field `key` into a frozen [`Type`].
pub fn create_type(decl: TypeDecl, key: &str) -> Result<Rc<Type>, EntityError> {
    let decl = match decl {
        TypeDecl::Helper(helper) => TypeDecl::Params(Box::new(helper())),
        other => other,
    };

    let mut params = match decl {
        TypeDecl::Params(params) if params.type_.is_some() => *params,
        other => TypeParams::wrap(other),
    };

    // Copy the table out so normalizers and constructors never run under
    // the lock; constructors resolve nested declarations recursively.
    let entries: Vec<VariantEntry> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .copied()
        .collect();
    for entry in &entries {
        if let Some(normalize) = entry.normalize {
            normalize(&mut params);
        }
    }

    let entry = params.tag().and_then(|tag| {
        registry()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .copied()
    });
    let Some(entry) = entry else {
        return Err(EntityError::UnknownType {
            key: key.to_string(),
            type_name: params
                .type_
                .as_ref()
                .map_or_else(|| "undefined".to_string(), |t| t.describe()),
        });
    };

    if params.primary && is_reserved_member(key) {
        return Err(EntityError::ReservedPrimaryKey {
            key: key.to_string(),
        });
    }

    let variant = (entry.construct)(&mut params, key).map_err(|err| err.in_field(key))?;
    let ty = Type::from_params(params, variant).map_err(|err| err.in_field(key))?;
    Ok(Rc::new(ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;

    #[derive(Debug)]
    struct Upper;

    impl TypeVariant for Upper {
        fn type_as_string(&self, _tag: &str) -> String {
            "UPPER".to_string()
        }
    }

    fn construct_upper(
        _params: &mut TypeParams,
        _key: &str,
    ) -> Result<Box<dyn TypeVariant>, EntityError> {
        Ok(Box::new(Upper))
    }

    #[test]
    fn test_unknown_tag() {
        let err = create_type(TypeDecl::from("nope"), "x").unwrap_err();
        assert_eq!(
            err,
            EntityError::UnknownType {
                key: "x".into(),
                type_name: "nope".into()
            }
        );
    }

    #[test]
    fn test_register_custom_variant() {
        register_type("test-upper", construct_upper);
        assert!(is_registered("test-upper"));
        let ty = create_type(TypeDecl::from("test-upper"), "x").unwrap();
        assert_eq!(ty.type_as_string(), "UPPER");
    }

    #[test]
    fn test_reserved_primary_key() {
        for key in ["row", "primaryKey", "primaryValue", "set", "to_json"] {
            let err = create_type(TypeDecl::from(json!({"type": "number", "primary": true})), key)
                .unwrap_err();
            assert_eq!(err, EntityError::ReservedPrimaryKey { key: key.into() });
        }
        assert!(create_type(TypeDecl::from(json!({"type": "number", "primary": true})), "id").is_ok());
    }

    #[test]
    fn test_helper_marker() {
        fn helper() -> TypeParams {
            TypeParams::new("number").required()
        }
        let ty = create_type(TypeDecl::helper(helper), "n").unwrap();
        assert_eq!(ty.tag(), "number");
        assert!(ty.is_required());
    }

    #[test]
    fn test_bare_tag_is_wrapped() {
        let ty = create_type(TypeDecl::from("boolean"), "flag").unwrap();
        assert_eq!(ty.tag(), "boolean");
        assert!(!ty.is_required());
        assert!(ty.default_value().is_null());
        assert!(ty.validate(&Value::Null, "flag"));
    }

    #[test]
    fn test_construction_error_is_prefixed_with_key() {
        let err = create_type(
            TypeDecl::from(json!({"type": "string", "lower": true, "upper": true})),
            "name",
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("name: "));
        assert!(matches!(err.root(), EntityError::ConflictingParameters { .. }));
    }
}
