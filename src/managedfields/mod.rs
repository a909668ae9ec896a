//! Ownership records: the persisted `metadata.managedFields` entries, their
//! decoded form, and the history cap applied before they are written back.

mod bookkeeper;
mod entry;
mod managed;

#[cfg(test)]
mod bookkeeper_test;

pub use bookkeeper::*;
pub use entry::*;
pub use managed::*;
