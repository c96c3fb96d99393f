//! Declaration helpers.
//!
//! Each helper returns the parameter object of one built-in variant, ready
//! for the builder methods of [`TypeParams`]:
//!
//! ```ignore
//! Structure::new()
//!     .field("name", types::string().flag("trim").required())
//!     .field("tags", types::array("string").flag("unique"))
//!     .field("age", TypeDecl::helper(types::number))
//! ```

use crate::schema::{CollectionRef, CollectionSchema, ModelRef, ModelSchema};
use crate::type_def::{ClassRef, Structure, TypeDecl, TypeParams};
use crate::value::CustomValue;

pub fn any() -> TypeParams {
    TypeParams::new("any")
}

pub fn string() -> TypeParams {
    TypeParams::new("string")
}

pub fn number() -> TypeParams {
    TypeParams::new("number")
}

pub fn boolean() -> TypeParams {
    TypeParams::new("boolean")
}

pub fn date() -> TypeParams {
    TypeParams::new("date")
}

pub fn array(element: impl Into<TypeDecl>) -> TypeParams {
    TypeParams::new("array").element(element)
}

pub fn object(structure: Structure) -> TypeParams {
    TypeParams::new("object").structure(structure)
}

/// Object whose values all share the `element` type.
pub fn map_of(element: impl Into<TypeDecl>) -> TypeParams {
    TypeParams::new("object").element(element)
}

pub fn or<I, D>(alternatives: I) -> TypeParams
where
    I: IntoIterator<Item = D>,
    D: Into<TypeDecl>,
{
    TypeParams::new("or").or(alternatives)
}

pub fn model<M: ModelSchema>() -> TypeParams {
    let mut params = TypeParams::new("model");
    params.model = Some(ModelRef::of::<M>());
    params
}

pub fn collection<C: CollectionSchema>() -> TypeParams {
    let mut params = TypeParams::new("collection");
    params.collection = Some(CollectionRef::of::<C>());
    params
}

pub fn custom_class<T: CustomValue>() -> TypeParams {
    let mut params = TypeParams::new("CustomClass");
    params.class = Some(ClassRef::of::<T>());
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::create_type;

    #[test]
    fn test_helpers_resolve() {
        assert_eq!(create_type(string().into(), "a").unwrap().tag(), "string");
        assert_eq!(
            create_type(array(number()).into(), "a").unwrap().type_as_string(),
            "array<number>"
        );
        assert_eq!(
            create_type(map_of("boolean").into(), "a").unwrap().type_as_string(),
            "object<boolean>"
        );
        assert_eq!(
            create_type(or(["string", "number"]).into(), "a")
                .unwrap()
                .type_as_string(),
            "string | number"
        );
        assert_eq!(
            create_type(object(Structure::new().field("x", "number")).into(), "a")
                .unwrap()
                .type_as_string(),
            "{x: number}"
        );
    }
}
