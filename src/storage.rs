//! The storage collaborator `spec.md §6` asks this crate to depend on
//! through a trait seam, plus an in-memory test double.
//!
//! Grounded on `http-cache`'s `CacheManager` trait
//! (`http-cache/src/lib.rs`: `async fn get`/`put`/`delete` keyed by
//! `String`) — same shape, generalized to store [`CachedEntry`] instead of
//! a manager-specific serialized blob, and widened from `CacheManager`'s
//! two-arg `put(key, response, policy)` to the plain `put(key, entry)`
//! this crate's entry type doesn't need split in two for.

use std::time::Duration;

use async_trait::async_trait;

use crate::entry::CachedEntry;
use crate::error::Result;

/// Backing store collaborator. Implementations own serialization,
/// eviction, and any locking; this crate treats entries as opaque once
/// handed to [`Storage::put`]. `ttl` is advisory to the backend — this
/// crate never re-derives it from a stored entry.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>>;
    async fn put(&self, key: String, entry: CachedEntry, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::test_support::MapStorage;
    use super::*;
    use crate::entry::{CachedHeaders, CachedResponse, SegmentedBody};
    use time::OffsetDateTime;

    #[tokio::test]
    async fn round_trips_an_entry() {
        let storage = MapStorage::new();
        let entry = CachedEntry::Response(CachedResponse::new(
            OffsetDateTime::UNIX_EPOCH,
            200,
            CachedHeaders::new(),
            SegmentedBody::empty(),
        ));
        storage.put("k".to_string(), entry, Duration::from_secs(10)).await.unwrap();
        assert!(storage.get("k").await.unwrap().is_some());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let storage = MapStorage::new();
        assert!(storage.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let storage = MapStorage::new();
        let entry = CachedEntry::Response(CachedResponse::new(
            OffsetDateTime::UNIX_EPOCH,
            200,
            CachedHeaders::new(),
            SegmentedBody::empty(),
        ));
        storage.put("k".to_string(), entry, Duration::from_secs(10)).await.unwrap();
        storage.delete("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
    }
}
