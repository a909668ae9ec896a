//! Object documents as the field manager sees them.
//!
//! Maps keep their keys sorted so that encoded objects are stable.

mod value;

pub use value::*;
