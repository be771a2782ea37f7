//! Error types for the COS core.

use thiserror::Error;

/// The error type of the crate.
///
/// Parse-level misses are reported as `None` by the individual parsers and
/// degrade locally; the variants here surface on the fallible entry points
/// (construction and serialization).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("parse failure: {0}")]
    ParseFailure(&'static str),

    #[error("missing reference: object {0}")]
    MissingReference(u32),

    #[error("serialization failure: {0}")]
    SerializationFailure(&'static str),
}

/// Convenience alias for results of this crate.
pub type Result<T> = std::result::Result<T, Error>;
