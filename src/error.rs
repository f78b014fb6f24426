//! Error type for this crate's fallible boundary.
//!
//! Most of what `spec.md` classifies as "parse failure" (an unparsable date,
//! a malformed `directive=seconds` token) is represented as `None`, not an
//! `Err` — see [`crate::header_utils`]. `CacheError` only covers conversions
//! that fail at the edge between this crate's pure model and the caller's
//! `http` types.

use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced while bridging this crate's model to `http` types.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A header value was not valid UTF-8 and could not be read back out.
    #[error(transparent)]
    HeaderToStr(#[from] http::header::ToStrError),
    /// A header name built from a cached entry's snapshot was invalid.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// A header value built from a cached entry's snapshot was invalid.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// The configured storage backend failed on a read; treated by callers
    /// as a cache miss per `spec.md §7`, but surfaced here for callers that
    /// want to log it.
    #[error("storage get failed: {0}")]
    StorageGet(String),
    /// The configured storage backend failed on a write; logged and
    /// otherwise ignored per `spec.md §7` (the response has already been
    /// streamed to the client by the time this can happen).
    #[error("storage set failed: {0}")]
    StorageSet(String),
}
