//! The data model stored under a cache key, and the per-request scratch
//! state the middleware threads through a single request — `spec.md §3`.

use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::capture::{CaptureHandle, CaptureStream};

/// Tagged variant stored under one key space: either a snapshot of a
/// response, or an indirection record pointing at variant keys derived
/// from the same base key (`spec.md §3`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CachedEntry {
    Response(CachedResponse),
    VaryByRules(CachedVaryByRules),
}

impl CachedEntry {
    pub fn as_response(&self) -> Option<&CachedResponse> {
        match self {
            CachedEntry::Response(r) => Some(r),
            CachedEntry::VaryByRules(_) => None,
        }
    }

    pub fn as_vary_by_rules(&self) -> Option<&CachedVaryByRules> {
        match self {
            CachedEntry::VaryByRules(r) => Some(r),
            CachedEntry::Response(_) => None,
        }
    }
}

/// A captured, storable response, detached from any live header container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Unix timestamp (seconds) at which this entry was captured.
    pub created: i64,
    pub status_code: u16,
    pub headers: CachedHeaders,
    pub body: SegmentedBody,
}

impl CachedResponse {
    pub fn new(
        created: OffsetDateTime,
        status_code: u16,
        headers: CachedHeaders,
        body: SegmentedBody,
    ) -> Self {
        Self { created: created.unix_timestamp(), status_code, headers, body }
    }

    pub fn created(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.created)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// `floor(now - created)`, never negative — `spec.md §9` open question
    /// resolved to the conservative (floor) choice.
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        let delta = now - self.created();
        Duration::from_secs(delta.whole_seconds().max(0) as u64)
    }
}

/// Ordered header-name -> values mapping with case-insensitive lookup and
/// case preserved as handed to it (subject to whatever casing the
/// surrounding `http::HeaderMap` already normalized away — this crate
/// cannot recover casing the pipeline's own types discarded).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl CachedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: String) {
        if let Some((_, values)) =
            self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            values.push(value);
        } else {
            self.entries.push((name.to_string(), vec![value]));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn get_joined(&self, name: &str) -> Option<String> {
        self.get(name).map(|values| values.join(", "))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots a live `http::HeaderMap`, detaching it from the request or
    /// response it came from (`spec.md §3`'s ownership rule).
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut out = Self::new();
        for (name, value) in map.iter() {
            if let Ok(value_str) = value.to_str() {
                out.insert(name.as_str(), value_str.to_string());
            }
        }
        out
    }

    /// Rebuilds an `http::HeaderMap` from a snapshot, for serving a cached
    /// response or a 304 response subset back out the pipeline.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, values) in &self.entries {
            let Ok(header_name) = http::HeaderName::from_bytes(name.as_bytes())
            else {
                continue;
            };
            for value in values {
                if let Ok(header_value) = http::HeaderValue::from_str(value) {
                    map.append(header_name.clone(), header_value);
                }
            }
        }
        map
    }
}

/// Indirection record telling the middleware which headers and query keys
/// select a variant under this base key (`spec.md §3`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVaryByRules {
    pub vary_by_key_prefix: String,
    /// Already order/casing-normalized (`spec.md §4.6`).
    pub headers: Vec<String>,
    /// Already order/casing-normalized (`spec.md §4.6`).
    pub query_keys: Vec<String>,
}

/// An ordered list of byte segments plus a total length, replayable without
/// consuming the underlying data (`spec.md §3`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentedBody {
    segments: Vec<Bytes>,
    len: usize,
}

impl SegmentedBody {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Bytes>) -> Self {
        let len = segments.iter().map(Bytes::len).sum();
        Self { segments, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// A fresh, independent, non-destructive cursor over the segments.
    pub fn reader(&self) -> SegmentedBodyReader<'_> {
        SegmentedBodyReader { segments: &self.segments, index: 0 }
    }

    pub fn to_bytes(&self) -> Bytes {
        if self.segments.len() == 1 {
            return self.segments[0].clone();
        }
        let mut out = Vec::with_capacity(self.len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        Bytes::from(out)
    }
}

/// Non-destructive, restartable replay cursor — independent readers may
/// exist concurrently over the same [`SegmentedBody`] (`spec.md §3`).
pub struct SegmentedBodyReader<'a> {
    segments: &'a [Bytes],
    index: usize,
}

impl Iterator for SegmentedBodyReader<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let segment = self.segments.get(self.index)?.clone();
        self.index += 1;
        Some(segment)
    }
}

/// Per-request mutable state carried through the pipeline (`spec.md §3`).
/// Constructed at request entry, mutated only by the owning request's flow,
/// discarded at response completion — never shared across requests.
#[derive(Debug)]
pub struct RequestContext {
    pub base_key: String,
    pub cached_entry: Option<CachedEntry>,
    pub cached_response: Option<CachedResponse>,
    pub cached_response_headers: Option<CachedHeaders>,
    pub cached_entry_age: Option<Duration>,
    pub cached_vary_by_rules: Option<CachedVaryByRules>,
    pub cached_response_valid_for: Option<Duration>,
    pub response_time: OffsetDateTime,
    pub response_date: Option<OffsetDateTime>,
    pub response_expires: Option<OffsetDateTime>,
    pub response_max_age: Option<u64>,
    pub response_shared_max_age: Option<u64>,
    pub should_cache_response: bool,
    pub response_started: bool,
    pub capture_stream: Option<CaptureHandle>,
}

impl RequestContext {
    pub fn new(base_key: String, response_time: OffsetDateTime) -> Self {
        Self {
            base_key,
            cached_entry: None,
            cached_response: None,
            cached_response_headers: None,
            cached_entry_age: None,
            cached_vary_by_rules: None,
            cached_response_valid_for: None,
            response_time,
            response_date: None,
            response_expires: None,
            response_max_age: None,
            response_shared_max_age: None,
            should_cache_response: false,
            response_started: false,
            capture_stream: None,
        }
    }

    /// Installs the capture stream for this request.
    ///
    /// # Panics
    ///
    /// Installing a second capture stream within the same request is a
    /// programming error (`spec.md §4.5`, §7) and panics rather than
    /// silently overwriting or returning a `Result` — there is no
    /// recoverable caller action here.
    pub fn install_capture_stream(
        &mut self,
        maximum_body_size: usize,
    ) -> CaptureHandle {
        assert!(
            self.capture_stream.is_none(),
            "capture stream already installed for this request"
        );
        let handle = CaptureStream::new(maximum_body_size).into_handle();
        self.capture_stream = Some(handle.clone());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_case_insensitive_lookup() {
        let mut h = CachedHeaders::new();
        h.insert("ETag", "\"abc\"".to_string());
        assert_eq!(h.get("etag"), Some(&["\"abc\"".to_string()][..]));
    }

    #[test]
    fn headers_multi_value_append() {
        let mut h = CachedHeaders::new();
        h.insert("Set-Cookie", "a=1".to_string());
        h.insert("set-cookie", "b=2".to_string());
        assert_eq!(h.get("Set-Cookie").unwrap().len(), 2);
    }

    #[test]
    fn segmented_body_roundtrip() {
        let body = SegmentedBody::from_segments(vec![
            Bytes::from_static(b"hello "),
            Bytes::from_static(b"world"),
        ]);
        assert_eq!(body.len(), 11);
        assert_eq!(body.to_bytes(), Bytes::from_static(b"hello world"));
        let replayed: Vec<Bytes> = body.reader().collect();
        assert_eq!(replayed.len(), 2);
        // reading again yields the same bytes — non-destructive.
        let replayed_again: Vec<Bytes> = body.reader().collect();
        assert_eq!(replayed, replayed_again);
    }

    #[test]
    fn cached_response_age_is_floored() {
        let created = OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        let response = CachedResponse::new(
            created,
            200,
            CachedHeaders::new(),
            SegmentedBody::empty(),
        );
        let now = OffsetDateTime::from_unix_timestamp(1_009).unwrap()
            + time::Duration::milliseconds(900);
        assert_eq!(response.age(now), Duration::from_secs(9));
    }

    #[test]
    #[should_panic(expected = "already installed")]
    fn double_capture_install_panics() {
        let mut ctx =
            RequestContext::new("k".to_string(), OffsetDateTime::UNIX_EPOCH);
        ctx.install_capture_stream(1024);
        ctx.install_capture_stream(1024);
    }
}
