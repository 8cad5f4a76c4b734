//! Sync state location handling for backfills.

mod location;
mod reset;

pub use location::{clean_path, StateLocation};
pub use reset::{FsStateRemover, ResetOutcome, StateRemover, StateResetter};

#[cfg(test)]
pub use reset::MockStateRemover;
