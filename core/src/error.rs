//! Error types for scheduler construction.
//!
//! Operating on an unknown key is never an error; those operations report
//! existence through their boolean result instead.

use thiserror::Error;

/// Errors surfaced by the fallible scheduler constructors.
#[derive(Debug, Error)]
pub enum TimerError {
    /// A scheduler arms its wake-ups on a tokio runtime, so one must be
    /// running when the instance is created.
    #[error("no tokio runtime available to arm timer wake-ups")]
    NoRuntime,
}
