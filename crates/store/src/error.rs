//! Store Error Types
//!
//! Every failure surfaces as one [`Error`] whose kind says what the caller
//! can do about it. A fingerprint that simply does not exist is not an
//! error: [`load`](crate::FingerprintStore::load) returns `Ok(None)`.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Eq, PartialEq)]
pub enum ErrorKind {
    /// The database could not be reached or refused the login.
    #[display("could not connect to the fingerprint database")]
    Connection,
    /// Stored rows (or a fingerprint about to be stored) cannot be mapped.
    #[display("malformed fingerprint data: {_0}")]
    DataFormat(#[error(not(source))] &'static str),
    /// The schema could not be created or upgraded; the backend is not ready.
    #[display("fingerprint schema migration failed")]
    Schema,
    /// A statement failed; its transaction was rolled back.
    #[display("fingerprint query failed")]
    Sql,
}

impl ErrorKind {
    /// Returns `true` if retrying the whole operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Sql)
    }
}
