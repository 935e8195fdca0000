//! Error types for registry operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// The operation addressed a stream name that was never created, or
    /// was already removed.
    #[error("unknown stream: {name}")]
    UnknownStream { name: String },
}
