//! modelkit - schema-validated, observable entities.
//!
//! This crate provides:
//! - A pluggable runtime type system resolving field declarations through a
//!   process-wide registry (`string`, `number`, `array`, `object`, `or`,
//!   nested models and collections, custom classes, ...)
//! - [`Model`]: a frozen row that is replaced wholesale by every validated
//!   `set`, with per-field and per-row change notifications
//! - [`Collection`]: an ordered sequence of models of one kind with
//!   array-like mutators emitting `add` / `remove` notifications
//! - Cycle-safe `equal`, `deep_clone`, `to_json` and `walk` over graphs of
//!   nested entities
//!
//! # Example
//!
//! ```
//! use modelkit::{types, Model, ModelSchema, Structure};
//! use serde_json::json;
//!
//! struct User;
//!
//! impl ModelSchema for User {
//!     fn structure() -> Structure {
//!         Structure::new()
//!             .field("id", types::number().primary())
//!             .field("name", types::string().flag("trim").required())
//!     }
//! }
//!
//! let user = Model::new::<User>(json!({"id": 1, "name": "  Bob "})).unwrap();
//! assert_eq!(user.get("name").as_str(), Some("Bob"));
//! assert!(user.set(json!({"id": 2})).is_err());
//! assert_eq!(user.to_json().unwrap(), json!({"id": 1, "name": "Bob"}));
//! ```

pub mod collection;
pub mod error;
pub mod guard;
pub mod model;
pub mod schema;
pub mod type_def;
pub mod types;
pub mod value;
pub mod walker;

pub use collection::{Collection, CollectionEvent, CollectionEventKind};
pub use error::EntityError;
pub use guard::{CycleGuard, JsonStack};
pub use model::{Model, ModelEvent, SetOptions};
pub use schema::{
    CollectionHooks, CollectionKind, CollectionRef, CollectionSchema, ModelHooks, ModelKind,
    ModelRef, ModelSchema,
};
pub use type_def::{
    create_type, register_type, register_type_with, Structure, Type, TypeDecl, TypeParams,
    TypeVariant,
};
pub use value::{CustomValue, Fields, Row, Value};
pub use walker::Walker;

pub use modelkit_util::{EventTrigger, ListenerId};
