//! Runtime type system.
//!
//! A field declaration ([`TypeDecl`]) is resolved once, through the process
//! wide registry, into a frozen [`Type`]: the common parameters every field
//! carries (`required`, `primary`, `const`, `enum`, `default` and the author
//! supplied overrides) wrapped around one [`TypeVariant`] that implements the
//! value-kind specific behaviour.

pub mod classes;
pub mod params;
pub mod registry;

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::Model;
use crate::value::{number_to_string, render_value, Value};

pub use params::{
    ClassRef, CloneFn, DefaultFn, DefaultValue, EqualFn, KeyFn, KeyMatcher, PrepareFn, Structure,
    ToJsonFn, TypeDecl, TypeParams, ValidateFn, ValidatorSpec,
};
pub use registry::{create_type, is_registered, register_type, register_type_with, VariantCtor};

/// Value-kind specific half of a [`Type`].
///
/// Every method has the behaviour of the untyped base so a variant only
/// overrides what it changes.
pub trait TypeVariant: fmt::Debug {
    /// Zero value for absent input.
    fn default_value(&self) -> Value {
        Value::Null
    }

    /// Coerce raw input into its stored form. Returning `Value::Null` is
    /// always legal and means "absent".
    fn prepare(&self, value: Value, _key: &str, _model: &Model) -> Result<Value, EntityError> {
        Ok(value)
    }

    /// Link entities held by a committed value to `owner`. Runs only after
    /// the row has been replaced.
    fn adopt(&self, _value: &Value, _owner: &Model) {}

    /// Must accept `Value::Null`; absence is checked through `required`.
    fn validate(&self, _value: &Value, _key: &str) -> bool {
        true
    }

    fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        classes::any::value_to_json(value, stack)
    }

    /// Deep copy. `parent` is the model receiving the copy.
    fn clone_value(&self, value: &Value, _guard: &mut CycleGuard, _parent: Option<&Model>) -> Value {
        value.clone()
    }

    fn equal(&self, a: &Value, b: &Value, _guard: &mut CycleGuard) -> bool {
        a.same(b)
    }

    fn type_as_string(&self, tag: &str) -> String {
        tag.to_string()
    }
}

/// A resolved, immutable field type.
pub struct Type {
    tag: String,
    required: bool,
    primary: bool,
    constant: bool,
    enum_values: Option<Vec<Value>>,
    default: Option<DefaultValue>,
    prepare: Option<PrepareFn>,
    validate: Option<ValidateFn>,
    key: Option<KeyFn>,
    to_json: Option<ToJsonFn>,
    clone: Option<CloneFn>,
    equal: Option<EqualFn>,
    variant: Box<dyn TypeVariant>,
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("tag", &self.tag)
            .field("required", &self.required)
            .field("primary", &self.primary)
            .field("const", &self.constant)
            .field("enum", &self.enum_values)
            .field("variant", &self.variant)
            .finish()
    }
}

impl Type {
    /// Wire the common parameters around a constructed variant.
    pub(crate) fn from_params(
        params: TypeParams,
        variant: Box<dyn TypeVariant>,
    ) -> Result<Self, EntityError> {
        let tag = params.tag().unwrap_or_default().to_string();
        let validate = params.validate.map(compile_validator).transpose()?;
        let key = params.key.map(compile_key_matcher).transpose()?;

        Ok(Self {
            tag,
            // primary implies required and const
            required: params.required || params.primary,
            primary: params.primary,
            constant: params.constant || params.primary,
            enum_values: params.enum_values,
            default: params.default,
            prepare: params.prepare,
            validate,
            key,
            to_json: params.to_json,
            clone: params.clone,
            equal: params.equal,
            variant,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_const(&self) -> bool {
        self.constant
    }

    pub fn enum_values(&self) -> Option<&[Value]> {
        self.enum_values.as_deref()
    }

    pub fn variant(&self) -> &dyn TypeVariant {
        self.variant.as_ref()
    }

    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(default) => default.produce(),
            None => self.variant.default_value(),
        }
    }

    /// Built-in coercion, then the custom one on non-null results.
    pub fn prepare(&self, value: Value, key: &str, model: &Model) -> Result<Value, EntityError> {
        let value = self.variant.prepare(value, key, model)?;
        match &self.prepare {
            Some(custom) if !value.is_null() => custom(value, key, model),
            _ => Ok(value),
        }
    }

    pub fn validate(&self, value: &Value, key: &str) -> bool {
        if let Some(values) = &self.enum_values {
            if !value.is_null() && !values.iter().any(|v| v.same(value)) {
                return false;
            }
        }
        if !self.variant.validate(value, key) {
            return false;
        }
        match &self.validate {
            Some(custom) if !value.is_null() => custom(value, key),
            _ => true,
        }
    }

    /// Whether a catch-all declaration accepts the undeclared key `key`.
    pub fn validate_key(&self, key: &str) -> bool {
        self.key.as_ref().map_or(true, |matcher| matcher(key))
    }

    pub fn adopt(&self, value: &Value, owner: &Model) {
        self.variant.adopt(value, owner);
    }

    pub fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        match &self.to_json {
            Some(custom) => custom(value, stack),
            None => self.variant.to_json(value, stack),
        }
    }

    pub fn clone_value(&self, value: &Value, guard: &mut CycleGuard, parent: Option<&Model>) -> Value {
        match &self.clone {
            Some(custom) => custom(value, guard),
            None => self.variant.clone_value(value, guard, parent),
        }
    }

    pub fn equal(&self, a: &Value, b: &Value, guard: &mut CycleGuard) -> bool {
        match &self.equal {
            Some(custom) => custom(a, b, guard),
            None => self.variant.equal(a, b, guard),
        }
    }

    pub fn type_as_string(&self) -> String {
        self.variant.type_as_string(&self.tag)
    }
}

/// Patterns are tested against the textual form of scalars.
fn pattern_matches(pattern: &Regex, value: &Value) -> bool {
    match value {
        Value::String(s) => pattern.is_match(s),
        Value::Number(n) => pattern.is_match(&number_to_string(*n)),
        Value::Bool(b) => pattern.is_match(if *b { "true" } else { "false" }),
        _ => false,
    }
}

fn pattern_validator(pattern: Regex) -> ValidateFn {
    Rc::new(move |value, _key| pattern_matches(&pattern, value))
}

fn pattern_key_matcher(pattern: Regex) -> KeyFn {
    Rc::new(move |key| pattern.is_match(key))
}

fn declared_as_string(declared: &serde_json::Value) -> String {
    render_value(&Value::from(declared.clone()))
}

fn compile_validator(spec: ValidatorSpec) -> Result<ValidateFn, EntityError> {
    match spec {
        ValidatorSpec::Predicate(f) => Ok(f),
        ValidatorSpec::Pattern(pattern) => Ok(pattern_validator(pattern)),
        ValidatorSpec::Declared(serde_json::Value::String(source)) => Regex::new(&source)
            .map(pattern_validator)
            .map_err(|_| EntityError::InvalidValidator {
                invalid_value: render_value(&Value::from(source.as_str())),
            }),
        ValidatorSpec::Declared(other) => Err(EntityError::InvalidValidator {
            invalid_value: declared_as_string(&other),
        }),
    }
}

fn compile_key_matcher(matcher: KeyMatcher) -> Result<KeyFn, EntityError> {
    match matcher {
        KeyMatcher::Predicate(f) => Ok(f),
        KeyMatcher::Pattern(pattern) => Ok(pattern_key_matcher(pattern)),
        KeyMatcher::Declared(serde_json::Value::String(source)) => Regex::new(&source)
            .map(pattern_key_matcher)
            .map_err(|_| EntityError::InvalidKeyValidator {
                invalid_value: render_value(&Value::from(source.as_str())),
            }),
        KeyMatcher::Declared(other) => Err(EntityError::InvalidKeyValidator {
            invalid_value: declared_as_string(&other),
        }),
    }
}
