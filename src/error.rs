// src/error.rs

//! Crate-wide error and result types

use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the package state machine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("header error: {0}")]
    HeaderError(String),

    #[error("scriptlet error: {0}")]
    ScriptletError(String),

    #[error("trigger error: {0}")]
    TriggerError(String),

    /// Archive unpack/stream failure. `file` names the member the file
    /// state machine stopped on, when it is known.
    #[error("archive operation failed: {reason}")]
    UnpackError {
        file: Option<String>,
        reason: String,
    },

    #[error("source package expected, binary found")]
    NotSourcePackage,

    #[error("source package contains no .spec file")]
    NoSpecFile,

    /// Declared payload size does not match the package file. Callers
    /// treat this as a warning, not a failure.
    #[error("package payload size does not match header")]
    BadSize,

    #[error("unknown payload compressor '{0}'")]
    UnknownCompressor(String),

    #[error("cannot create {0}")]
    CreateError(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Build an unpack error without a failed-file attribution
    pub fn unpack(reason: impl Into<String>) -> Self {
        Error::UnpackError {
            file: None,
            reason: reason.into(),
        }
    }
}
