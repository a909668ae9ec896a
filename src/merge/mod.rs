//! Ownership-aware apply and update across multiple managers.

mod conflict;
mod updater;

pub use conflict::*;
pub use updater::*;
