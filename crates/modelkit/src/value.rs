//! Dynamic values stored in model rows.
//!
//! Composite values (arrays, objects, entities, custom class instances) are
//! reference counted. Their identity is pointer identity, which is what the
//! cycle guards key on and what change detection compares.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use modelkit_util::strings::{as_string, truncate};
use regex::Regex;

use crate::collection::Collection;
use crate::model::Model;

/// Field name to value mapping, in insertion order.
pub type Fields = IndexMap<String, Value>;

/// A frozen snapshot of a model's fields.
pub type Row = Rc<Fields>;

const RENDER_LIMIT: usize = 80;

/// Instances of application classes carried inside rows.
///
/// Declared on a field with [`crate::types::custom_class`]; the field then
/// only accepts instances of that concrete type.
pub trait CustomValue: fmt::Debug + 'static {
    /// Name used in diagnostics.
    fn class_name(&self) -> &'static str;

    fn to_json(&self) -> serde_json::Value;

    /// Structurally independent copy.
    fn clone_value(&self) -> Rc<dyn CustomValue>;

    fn equals(&self, other: &dyn CustomValue) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A value held by a model field.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Regex(Rc<Regex>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Fields>),
    Model(Model),
    Collection(Collection),
    Custom(Rc<dyn CustomValue>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<Vec<Value>>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Fields>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Downcast a custom class instance to its concrete type.
    pub fn as_custom<T: CustomValue>(&self) -> Option<&T> {
        match self {
            Value::Custom(c) => c.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Pointer identity of composite values; `None` for scalars.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Regex(r) => Some(Rc::as_ptr(r) as *const () as usize),
            Value::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            Value::Model(m) => Some(m.identity()),
            Value::Collection(c) => Some(c.identity()),
            Value::Custom(c) => Some(Rc::as_ptr(c) as *const () as usize),
            _ => None,
        }
    }

    /// Identity comparison: scalars by value, composites by reference.
    ///
    /// NaN is the same as NaN, so re-assigning NaN is not a change.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Regex(_), Value::Regex(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
            | (Value::Model(_), Value::Model(_))
            | (Value::Collection(_), Value::Collection(_))
            | (Value::Custom(_), Value::Custom(_)) => self.identity() == other.identity(),
            _ => false,
        }
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Regex(_) => "regexp",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Model(_) => "model",
            Value::Collection(_) => "collection",
            Value::Custom(_) => "custom",
        }
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(items))
    }

    pub fn object(fields: Fields) -> Value {
        Value::Object(Rc::new(fields))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({})", date_to_iso(d)),
            Value::Regex(r) => write!(f, "Regex(/{}/)", r.as_str()),
            Value::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Value::Object(o) => f.debug_map().entries(o.iter()).finish(),
            Value::Model(m) => write!(f, "Model({} {})", m.kind_name(), m.cid()),
            Value::Collection(c) => {
                write!(f, "Collection({} {}, len {})", c.kind_name(), c.cid(), c.len())
            }
            Value::Custom(c) => write!(f, "Custom({c:?})"),
        }
    }
}

// ── Conversions ────────────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Regex> for Value {
    fn from(r: Regex) -> Self {
        Value::Regex(Rc::new(r))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::object(fields)
    }
}

impl From<Model> for Value {
    fn from(m: Model) -> Self {
        Value::Model(m)
    }
}

impl From<&Model> for Value {
    fn from(m: &Model) -> Self {
        Value::Model(m.clone())
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        Value::Collection(c)
    }
}

impl From<&Collection> for Value {
    fn from(c: &Collection) -> Self {
        Value::Collection(c.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Rendering ──────────────────────────────────────────────────────────────

/// ISO-8601 rendering with millisecond precision and a `Z` suffix.
pub fn date_to_iso(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decimal rendering of a number the way string coercion produces it:
/// integral values carry no fraction and negative zero renders as `0`.
pub fn number_to_string(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    format!("{n}")
}

/// Plain JSON number for `n`; integral values stay integers and non-finite
/// values become `null`.
pub fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn render_into(value: &Value, out: &mut String, depth: usize) {
    if out.len() > RENDER_LIMIT {
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&number_to_string(*n)),
        Value::String(s) => out.push_str(&as_string(s)),
        Value::Date(d) => out.push_str(&date_to_iso(d)),
        Value::Regex(r) => {
            out.push('/');
            out.push_str(r.as_str());
            out.push('/');
        }
        Value::Array(items) => {
            if depth > 2 {
                out.push_str("[...]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_into(item, out, depth + 1);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            if depth > 2 {
                out.push_str("{...}");
                return;
            }
            out.push('{');
            for (i, (key, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&as_string(key));
                out.push(':');
                render_into(item, out, depth + 1);
            }
            out.push('}');
        }
        Value::Model(m) => out.push_str(&format!("[model {}]", m.kind_name())),
        Value::Collection(c) => out.push_str(&format!("[collection {}]", c.kind_name())),
        Value::Custom(c) => out.push_str(&format!("[object {}]", c.class_name())),
    }
}

/// Human-readable rendering of an offending value, carried by errors.
///
/// Entities are never descended into, so the rendering is cycle safe.
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    render_into(value, &mut out, 0);
    truncate(&out, RENDER_LIMIT)
}

// ── Ordering ───────────────────────────────────────────────────────────────

fn order_class(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Date(_) => 4,
        _ => 5,
    }
}

/// Natural `<` / `>` ordering of two values: numbers numerically, strings
/// by code point (no collation), dates by instant, booleans false first.
///
/// Values of different kinds are ordered by kind so the result is a total
/// order; composite values compare equal to each other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match x.partial_cmp(y) {
            Some(ord) => ord,
            None => x.is_nan().cmp(&y.is_nan()),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        _ => order_class(a).cmp(&order_class(b)),
    }
}
