//! String helpers for diagnostic renderings.

mod as_string;
mod truncate;

pub use as_string::as_string;
pub use truncate::truncate;
