use thiserror::Error;

/// Every failure raised by schema compilation, row preparation, validation
/// and serialization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    // ── Schema definition ────────────────────────────────────────────────
    #[error("unknown type \"{type_name}\" for key \"{key}\"")]
    UnknownType { key: String, type_name: String },

    #[error("\"{key}\" is a reserved word and cannot be used as a primary key")]
    ReservedPrimaryKey { key: String },

    #[error("invalid validate parameter: {invalid_value}")]
    InvalidValidator { invalid_value: String },

    #[error("invalid key validator: {invalid_value}")]
    InvalidKeyValidator { invalid_value: String },

    #[error("conflicting parameters: {first} and {second}")]
    ConflictingParameters {
        first: &'static str,
        second: &'static str,
    },

    /// A type variant failed to build; `key` names the declaring field.
    #[error("{key}: {source}")]
    Field {
        key: String,
        #[source]
        source: Box<EntityError>,
    },

    // ── Input shape ──────────────────────────────────────────────────────
    #[error("unknown property \"{key}\"")]
    UnknownProperty { key: String },

    #[error("invalid key \"{key}\"")]
    InvalidKey { key: String },

    #[error("data should be an object")]
    DataShouldBeObject,

    #[error("expected {expected}, got {actual}{}", in_collection(.collection))]
    WrongModelKind {
        expected: String,
        actual: String,
        collection: Option<String>,
    },

    #[error("invalid row for {model}: {invalid_value}")]
    InvalidModelRow {
        model: String,
        invalid_value: String,
    },

    #[error("sort requires a comparator or at least one key")]
    InvalidSortParams,

    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    // ── Values ───────────────────────────────────────────────────────────
    #[error("invalid {expected} for key \"{key}\": {invalid_value}")]
    InvalidTypeValue {
        key: String,
        expected: String,
        invalid_value: String,
    },

    #[error("invalid value for key \"{key}\": {value}")]
    InvalidValue { key: String, value: String },

    #[error("required key \"{key}\"")]
    Required { key: String },

    #[error("cannot assign to read only property \"{key}\"")]
    ConstValue { key: String },

    #[error("{0}")]
    RowRejected(String),

    // ── Serialization ────────────────────────────────────────────────────
    #[error("converting circular structure to JSON")]
    CircularStructureToJson,
}

fn in_collection(collection: &Option<String>) -> String {
    match collection {
        Some(name) => format!(" in collection {name}"),
        None => String::new(),
    }
}

impl EntityError {
    /// The innermost error, with every [`EntityError::Field`] prefix removed.
    pub fn root(&self) -> &EntityError {
        match self {
            EntityError::Field { source, .. } => source.root(),
            other => other,
        }
    }

    /// Prefix `key` onto a construction failure, once per key.
    pub(crate) fn in_field(self, key: &str) -> Self {
        if matches!(&self, EntityError::Field { key: inner, .. } if inner == key) {
            return self;
        }
        EntityError::Field {
            key: key.to_string(),
            source: Box::new(self),
        }
    }
}
