//! Configuration surface, grounded on `http-cache`'s `HttpCacheOptions`
//! (`http-cache/src/lib.rs`) — a plain data bag with a `Default` impl, not
//! a loader. Populating it from a config file/env is the caller's job
//! (`spec.md §1`).

use std::time::Duration;

/// The three recognized options from `spec.md §6`, plus the default
/// validity fallback from `spec.md §4.5` step 3.
#[derive(Debug, Clone)]
pub struct ResponseCacheOptions {
    /// Per-response buffering cap, in bytes.
    pub maximum_body_size: usize,
    /// Aggregate storage cap advisory to the storage backend. This core
    /// never enforces it directly — it is handed through for a `Storage`
    /// implementation to act on.
    pub size_limit: Option<u64>,
    /// If `true`, the path participates in key derivation verbatim;
    /// otherwise it is folded to ASCII upper case.
    pub use_case_sensitive_paths: bool,
    /// Used when a cacheable response declares no `s-maxage`, `max-age`,
    /// or `Expires` (`spec.md §4.5` step 3).
    pub default_validity: Duration,
}

impl Default for ResponseCacheOptions {
    fn default() -> Self {
        Self {
            maximum_body_size: 2 * 1024 * 1024,
            size_limit: None,
            use_case_sensitive_paths: false,
            default_validity: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validity_is_ten_seconds() {
        assert_eq!(
            ResponseCacheOptions::default().default_validity,
            Duration::from_secs(10)
        );
    }
}
