//! An RFC 7234 response-caching core: cacheability policy, key/Vary
//! indirection, and response capture for an HTTP server-side middleware.
//!
//! This crate owns the *decision* of whether a request can be served from
//! cache, whether a response is worth storing, and how long it stays fresh
//! — it does not own an HTTP client, a server loop, or a storage backend.
//! A concrete pipeline adapter drives [`CacheMiddleware::run`] with its own
//! request/response types (satisfying [`RequestLike`]/[`ResponseLike`]
//! where it needs to) and a [`Storage`] implementation of its choosing.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use response_cache_core::{CacheMiddleware, ResponseCacheOptions};
//!
//! let middleware = CacheMiddleware::new(Arc::new(my_storage), ResponseCacheOptions::default());
//! let response = middleware.run(request, |req| my_handler.call(req)).await;
//! ```

#![forbid(unsafe_code)]
#![deny(future_incompatible, nonstandard_style, unused_extern_crates)]

pub mod capture;
pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod header_utils;
pub mod key;
pub mod middleware;
pub mod normalize;
pub mod options;
pub mod pipeline;
pub mod policy;
pub mod storage;

pub use capture::{CaptureBody, CaptureHandle, CaptureStream};
pub use diagnostics::Diagnostic;
pub use entry::{
    CachedEntry, CachedHeaders, CachedResponse, CachedVaryByRules, RequestContext, SegmentedBody,
};
pub use error::{CacheError, Result};
pub use middleware::{CacheMiddleware, ResponseBody};
pub use options::ResponseCacheOptions;
pub use pipeline::{query_pairs, RequestLike, ResponseLike, VaryByQueryKeys};
pub use storage::Storage;
