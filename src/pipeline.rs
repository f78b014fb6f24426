//! The trait seam the surrounding request/response pipeline satisfies.
//!
//! `spec.md §1` places the pipeline itself out of scope — this module only
//! names the shape a concrete adapter (a Tower `Layer`, an Axum extractor
//! stack, …) would implement to drive [`crate::middleware::CacheMiddleware`].
//! Grounded on the `RequestLike`/`ResponseLike` trait seam in
//! `CosmicHorrorDev-http-cache-policy`/`kornelski-rusty-http-cache-semantics`'s
//! `src/lib.rs`.

use http::{HeaderMap, Method, StatusCode, Uri};

/// Read-only view of an inbound request's cache-relevant parts.
pub trait RequestLike {
    fn method(&self) -> &Method;
    fn uri(&self) -> &Uri;
    fn headers(&self) -> &HeaderMap;
}

impl RequestLike for http::request::Parts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Read-only view of a response's cache-relevant parts.
pub trait ResponseLike {
    fn status(&self) -> StatusCode;
    fn headers(&self) -> &HeaderMap;
}

impl ResponseLike for http::response::Parts {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Feature-bus input read during `FinalizeHeaders` (`spec.md §6`): the
/// query-string keys, if any, that a handler wants the response varied by.
/// A concrete pipeline adapter attaches this to `http::Request::extensions`.
#[derive(Debug, Clone, Default)]
pub struct VaryByQueryKeys(pub Vec<String>);

/// Parses a request URI's query string into ordered `(key, value)` pairs,
/// verbatim — no percent-decoding, since `spec.md §4.2` preserves query
/// values as-is.
pub fn query_pairs(uri: &Uri) -> Vec<(&str, &str)> {
    let Some(query) = uri.query() else {
        return Vec::new();
    };
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (k, v),
            None => (segment, ""),
        })
        .collect()
}
