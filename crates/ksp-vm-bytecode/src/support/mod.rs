//! Small services the declaration model and diagnostics lean on

pub mod quote;
pub mod scoped_map;

pub use quote::{quote_char, quote_str};
pub use scoped_map::ScopedMap;
