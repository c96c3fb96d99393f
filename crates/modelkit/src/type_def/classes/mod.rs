//! Built-in type variants.

pub mod any;
pub mod array;
pub mod boolean;
pub mod collection;
pub mod custom_class;
pub mod date;
pub mod model;
pub mod number;
pub mod object;
pub mod or;
pub mod string;
