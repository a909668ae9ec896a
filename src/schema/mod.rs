//! Schemas describing how object trees are merged and tracked.
//!
//! A type says whether a map is a struct or a free-form map, whether a list
//! is atomic or associative (and by which key fields), and which fields have
//! defaults.

mod elements;

pub use elements::*;
