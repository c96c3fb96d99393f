//! modelkit-util - collaborators shared by the modelkit crates.
//!
//! Provides the named-channel event emitter, process-unique id generation and
//! the string helpers used to render values in diagnostics.

pub mod events;
pub mod strings;
pub mod unique_id;

// Re-exports for convenience
pub use events::{EventTrigger, ListenerId};
pub use strings::{as_string, truncate};
pub use unique_id::unique_id;
