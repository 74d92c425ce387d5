//! Core Error Types

use derive_more::{Display, Error};

/// A domain error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What was wrong with the data handed to the domain layer.
#[derive(Debug, Display, Error, Eq, PartialEq)]
pub enum ErrorKind {
    #[display("invalid fingerprint hash: {_0:?}")]
    InvalidHash(#[error(not(source))] String),
    #[display("invalid build range: {_0:?}")]
    InvalidRange(#[error(not(source))] String),
    #[display("invalid facet entry for {_0:?}")]
    InvalidFacet(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Malformed data stays malformed, no matter how often it is read.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
