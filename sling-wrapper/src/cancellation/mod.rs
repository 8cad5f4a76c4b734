//! Cooperative cancellation for wrapper runs.
//!
//! The binary cancels the shared token on shutdown signals; the retry loop
//! and the subprocess runner wait on it alongside their own work.

mod token;

pub use token::CancellationToken;
