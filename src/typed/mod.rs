//! Operations on values interpreted through a schema type: field sets,
//! comparison, merging, pruning and defaulting.

mod comparison;
mod typed_value;
mod validation;

pub use comparison::*;
pub use typed_value::*;
pub use validation::*;
