//! Error type and result alias.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SendaError>;

/// Errors surfaced to callers.
///
/// Only environment failures travel through this enum: I/O problems, invalid
/// or mismatching on-disk data, and lock contention. Contract violations by
/// the caller (out-of-range ids, double create/close, self-loop edges,
/// shortcut ordering) panic instead, because they are defects rather than
/// conditions a caller could meaningfully handle.
#[derive(Debug, Error)]
pub enum SendaError {
    /// Underlying I/O failure while reading, writing, or mapping a store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The on-disk data does not match the expected format or configuration.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// A caller-supplied value is outside the accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A named store or file does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// The directory write lock is held by another process.
    #[error("could not acquire lock: {0}")]
    Lock(String),
}
