//! Type declarations as written by schema authors.
//!
//! A field is declared with a [`TypeDecl`]: a bare tag (`"string"`), a
//! parameter object ([`TypeParams`]), a nested [`Structure`], an array
//! shorthand (`[decl]`), a model or collection reference, or a zero-argument
//! helper producing parameters. Declarations may also be read from JSON.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::Model;
use crate::schema::{CollectionRef, ModelRef};
use crate::value::{CustomValue, Value};

/// Custom coercion, run after the built-in one on non-null values.
pub type PrepareFn = Rc<dyn Fn(Value, &str, &Model) -> Result<Value, EntityError>>;
/// Custom predicate, AND-ed with the built-in validation of non-null values.
pub type ValidateFn = Rc<dyn Fn(&Value, &str) -> bool>;
/// Key predicate for catch-all (`"*"`) fields.
pub type KeyFn = Rc<dyn Fn(&str) -> bool>;
pub type ToJsonFn = Rc<dyn Fn(&Value, &mut JsonStack) -> Result<serde_json::Value, EntityError>>;
pub type CloneFn = Rc<dyn Fn(&Value, &mut CycleGuard) -> Value>;
pub type EqualFn = Rc<dyn Fn(&Value, &Value, &mut CycleGuard) -> bool>;
pub type DefaultFn = Rc<dyn Fn() -> Value>;

/// How a field's custom `validate` was declared.
#[derive(Clone)]
pub enum ValidatorSpec {
    Predicate(ValidateFn),
    Pattern(Regex),
    /// Raw JSON declaration; a string is compiled as a pattern when the type
    /// is built, anything else is rejected.
    Declared(serde_json::Value),
}

/// How a catch-all field restricts extra keys.
#[derive(Clone)]
pub enum KeyMatcher {
    Predicate(KeyFn),
    Pattern(Regex),
    Declared(serde_json::Value),
}

#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(DefaultFn),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Factory(f) => f(),
        }
    }
}

/// Reference to a [`CustomValue`] implementor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassRef {
    pub type_id: std::any::TypeId,
    pub name: &'static str,
}

impl ClassRef {
    pub fn of<T: CustomValue>() -> Self {
        Self {
            type_id: std::any::TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ── TypeDecl ───────────────────────────────────────────────────────────────

/// One field declaration.
#[derive(Clone)]
pub enum TypeDecl {
    Tag(String),
    Params(Box<TypeParams>),
    Structure(Structure),
    List(Vec<TypeDecl>),
    Model(ModelRef),
    Collection(CollectionRef),
    Helper(fn() -> TypeParams),
    /// A JSON declaration that fits none of the shapes above.
    Invalid(serde_json::Value),
}

impl TypeDecl {
    /// Zero-argument helper marker, e.g. `TypeDecl::helper(types::number)`.
    pub fn helper(f: fn() -> TypeParams) -> Self {
        TypeDecl::Helper(f)
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TypeDecl::Tag(tag) => tag.clone(),
            TypeDecl::Params(p) => match &p.type_ {
                Some(inner) => inner.describe(),
                None => "{}".to_string(),
            },
            TypeDecl::Structure(_) => "{structure}".to_string(),
            TypeDecl::List(items) => format!(
                "[{}]",
                items.iter().map(TypeDecl::describe).collect::<Vec<_>>().join(",")
            ),
            TypeDecl::Model(m) => m.name().to_string(),
            TypeDecl::Collection(c) => c.name().to_string(),
            TypeDecl::Helper(_) => "helper".to_string(),
            TypeDecl::Invalid(v) => v.to_string(),
        }
    }
}

impl fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDecl::Params(p) => p.fmt(f),
            TypeDecl::Structure(s) => s.fmt(f),
            other => write!(f, "TypeDecl({})", other.describe()),
        }
    }
}

impl From<&str> for TypeDecl {
    fn from(tag: &str) -> Self {
        TypeDecl::Tag(tag.to_string())
    }
}

impl From<String> for TypeDecl {
    fn from(tag: String) -> Self {
        TypeDecl::Tag(tag)
    }
}

impl From<TypeParams> for TypeDecl {
    fn from(params: TypeParams) -> Self {
        TypeDecl::Params(Box::new(params))
    }
}

impl From<Structure> for TypeDecl {
    fn from(structure: Structure) -> Self {
        TypeDecl::Structure(structure)
    }
}

impl From<Vec<TypeDecl>> for TypeDecl {
    fn from(items: Vec<TypeDecl>) -> Self {
        TypeDecl::List(items)
    }
}

impl From<ModelRef> for TypeDecl {
    fn from(model: ModelRef) -> Self {
        TypeDecl::Model(model)
    }
}

impl From<CollectionRef> for TypeDecl {
    fn from(collection: CollectionRef) -> Self {
        TypeDecl::Collection(collection)
    }
}

impl From<serde_json::Value> for TypeDecl {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(tag) => TypeDecl::Tag(tag),
            serde_json::Value::Array(items) => {
                TypeDecl::List(items.into_iter().map(TypeDecl::from).collect())
            }
            serde_json::Value::Object(map) if map.contains_key("type") => {
                TypeDecl::Params(Box::new(TypeParams::from_json_map(map)))
            }
            serde_json::Value::Object(map) => TypeDecl::Structure(Structure::from_json_map(map)),
            other => TypeDecl::Invalid(other),
        }
    }
}

// ── TypeParams ─────────────────────────────────────────────────────────────

/// Parameter object of a declaration: `{type, ...params}`.
///
/// The common parameters are wired by [`crate::type_def::Type`]; variant
/// parameters (`element`, `or`, `structure`, entity references and the
/// free-form `options`) are consumed by the variant constructor.
#[derive(Clone, Default)]
pub struct TypeParams {
    pub type_: Option<Box<TypeDecl>>,
    pub required: bool,
    pub primary: bool,
    pub constant: bool,
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<DefaultValue>,
    pub prepare: Option<PrepareFn>,
    pub validate: Option<ValidatorSpec>,
    pub key: Option<KeyMatcher>,
    pub to_json: Option<ToJsonFn>,
    pub clone: Option<CloneFn>,
    pub equal: Option<EqualFn>,

    pub element: Option<Box<TypeDecl>>,
    pub or: Vec<TypeDecl>,
    pub structure: Option<Structure>,
    pub model: Option<ModelRef>,
    pub collection: Option<CollectionRef>,
    pub class: Option<ClassRef>,
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for TypeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeParams")
            .field("type", &self.type_.as_ref().map(|t| t.describe()))
            .field("required", &self.required)
            .field("primary", &self.primary)
            .field("const", &self.constant)
            .field("enum", &self.enum_values)
            .field("options", &self.options)
            .finish()
    }
}

impl TypeParams {
    /// Parameters for the registered type `tag`.
    pub fn new(tag: &str) -> Self {
        Self {
            type_: Some(Box::new(TypeDecl::Tag(tag.to_string()))),
            ..Self::default()
        }
    }

    /// Wrap a bare declaration as `{type: decl}`.
    pub fn wrap(decl: TypeDecl) -> Self {
        Self {
            type_: Some(Box::new(decl)),
            ..Self::default()
        }
    }

    /// The tag, once the declaration has been normalized to one.
    pub fn tag(&self) -> Option<&str> {
        match self.type_.as_deref() {
            Some(TypeDecl::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    pub fn set_tag(&mut self, tag: &str) {
        self.type_ = Some(Box::new(TypeDecl::Tag(tag.to_string())));
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn enum_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(DefaultValue::Factory(Rc::new(f)));
        self
    }

    pub fn prepare(
        mut self,
        f: impl Fn(Value, &str, &Model) -> Result<Value, EntityError> + 'static,
    ) -> Self {
        self.prepare = Some(Rc::new(f));
        self
    }

    pub fn validate(mut self, f: impl Fn(&Value, &str) -> bool + 'static) -> Self {
        self.validate = Some(ValidatorSpec::Predicate(Rc::new(f)));
        self
    }

    pub fn validate_pattern(mut self, pattern: Regex) -> Self {
        self.validate = Some(ValidatorSpec::Pattern(pattern));
        self
    }

    pub fn validate_spec(mut self, spec: ValidatorSpec) -> Self {
        self.validate = Some(spec);
        self
    }

    pub fn key(mut self, f: impl Fn(&str) -> bool + 'static) -> Self {
        self.key = Some(KeyMatcher::Predicate(Rc::new(f)));
        self
    }

    pub fn key_pattern(mut self, pattern: Regex) -> Self {
        self.key = Some(KeyMatcher::Pattern(pattern));
        self
    }

    pub fn to_json(
        mut self,
        f: impl Fn(&Value, &mut JsonStack) -> Result<serde_json::Value, EntityError> + 'static,
    ) -> Self {
        self.to_json = Some(Rc::new(f));
        self
    }

    pub fn clone_with(mut self, f: impl Fn(&Value, &mut CycleGuard) -> Value + 'static) -> Self {
        self.clone = Some(Rc::new(f));
        self
    }

    pub fn equal(
        mut self,
        f: impl Fn(&Value, &Value, &mut CycleGuard) -> bool + 'static,
    ) -> Self {
        self.equal = Some(Rc::new(f));
        self
    }

    pub fn element(mut self, decl: impl Into<TypeDecl>) -> Self {
        self.element = Some(Box::new(decl.into()));
        self
    }

    pub fn or<I, D>(mut self, decls: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<TypeDecl>,
    {
        self.or = decls.into_iter().map(Into::into).collect();
        self
    }

    pub fn structure(mut self, structure: Structure) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn option(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(name.to_string(), value.into());
        self
    }

    /// Shorthand for a boolean option set to `true`.
    pub fn flag(self, name: &str) -> Self {
        self.option(name, true)
    }

    pub fn option_bool(&self, name: &str) -> bool {
        self.options
            .get(name)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn option_f64(&self, name: &str) -> Option<f64> {
        self.options.get(name).and_then(serde_json::Value::as_f64)
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut params = TypeParams::default();
        for (name, value) in map {
            match name.as_str() {
                "type" => params.type_ = Some(Box::new(TypeDecl::from(value))),
                "required" => params.required = value.as_bool().unwrap_or(false),
                "primary" => params.primary = value.as_bool().unwrap_or(false),
                "const" => params.constant = value.as_bool().unwrap_or(false),
                "enum" => {
                    if let serde_json::Value::Array(items) = value {
                        params.enum_values = Some(items.into_iter().map(Value::from).collect());
                    }
                }
                "default" => params.default = Some(DefaultValue::Value(Value::from(value))),
                "validate" => params.validate = Some(ValidatorSpec::Declared(value)),
                "key" => params.key = Some(KeyMatcher::Declared(value)),
                "element" => params.element = Some(Box::new(TypeDecl::from(value))),
                "or" => {
                    if let serde_json::Value::Array(items) = value {
                        params.or = items.into_iter().map(TypeDecl::from).collect();
                    }
                }
                "structure" => {
                    if let serde_json::Value::Object(fields) = value {
                        params.structure = Some(Structure::from_json_map(fields));
                    }
                }
                _ => {
                    params.options.insert(name, value);
                }
            }
        }
        params
    }
}

// ── Structure ──────────────────────────────────────────────────────────────

/// Field name to declaration mapping. The key `"*"` declares the catch-all.
#[derive(Clone, Debug, Default)]
pub struct Structure {
    fields: IndexMap<String, TypeDecl>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: &str, decl: impl Into<TypeDecl>) -> Self {
        self.fields.insert(key.to_string(), decl.into());
        self
    }

    /// Declare the catch-all type for undeclared keys.
    pub fn any_key(self, decl: impl Into<TypeDecl>) -> Self {
        self.field("*", decl)
    }

    pub fn get(&self, key: &str) -> Option<&TypeDecl> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeDecl)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a structure from a JSON object of declarations.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EntityError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map.clone())),
            _ => Err(EntityError::DataShouldBeObject),
        }
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, TypeDecl::from(v)))
                .collect(),
        }
    }
}

impl IntoIterator for Structure {
    type Item = (String, TypeDecl);
    type IntoIter = indexmap::map::IntoIter<String, TypeDecl>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
