//! The orchestrator: request-eligibility, key lookup, Vary resolution,
//! freshness, conditional-request short-circuit, serve-from-cache or
//! forward-and-capture, header finalization, body finalization and store
//! (`spec.md §4.5`).
//!
//! Grounded on `http-cache-tower/src/lib.rs`'s `HttpCacheService::call`
//! (same shape: analyze request, look up a cached entry, check freshness,
//! serve/forward, process the response, store it), narrowed to this
//! spec's decision tree — no client-side revalidation requests, since the
//! core never issues outbound HTTP (`spec.md §1`). Unlike the teacher,
//! `http::Response<B>` already separates a response's headers from its
//! body, so header finalization here runs as a plain step right after
//! `next` returns rather than needing to intercept the first body write
//! the way `spec.md §9`'s cyclic-dependency note describes — the type
//! system already gives us that ordering for free.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::capture::{CaptureBody, CaptureHandle};
use crate::diagnostics::{self, Diagnostic};
use crate::entry::{
    CachedEntry, CachedHeaders, CachedResponse, CachedVaryByRules, RequestContext,
};
use crate::header_utils::{self, header_values};
use crate::key;
use crate::options::ResponseCacheOptions;
use crate::pipeline::{query_pairs, VaryByQueryKeys};
use crate::policy;
use crate::storage::Storage;

/// Per-request orchestrator. One instance is typically shared (behind an
/// `Arc`) across every request a pipeline adapter drives through `run`.
pub struct CacheMiddleware<S> {
    storage: Arc<S>,
    options: ResponseCacheOptions,
}

impl<S> CacheMiddleware<S>
where
    S: Storage + 'static,
{
    pub fn new(storage: Arc<S>, options: ResponseCacheOptions) -> Self {
        Self { storage, options }
    }

    /// Drives one request through the S0–S9 decision tree. `next` is the
    /// "call the rest of the pipeline" hook (`spec.md §6`'s `invokeNext`),
    /// grounded on the teacher's `self.inner.clone().oneshot(req)` call.
    pub async fn run<ReqBody, ResBody, F, Fut>(
        &self,
        request: Request<ReqBody>,
        next: F,
    ) -> Response<ResponseBody<ResBody, S>>
    where
        ReqBody: Send,
        ResBody: Body<Data = Bytes> + Send + 'static,
        F: FnOnce(Request<ReqBody>) -> Fut + Send,
        Fut: Future<Output = Response<ResBody>> + Send,
    {
        let now = OffsetDateTime::now_utc();
        let method = request.method().clone();
        let uri = request.uri().clone();
        let path = uri.path().to_string();
        let request_headers = request.headers().clone();
        let query_pairs_owned: Vec<(String, String)> = query_pairs(&uri)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let vary_feature_keys: Vec<String> = request
            .extensions()
            .get::<VaryByQueryKeys>()
            .map(|feature| feature.0.clone())
            .unwrap_or_default();

        let base_key =
            key::create_base_key(&method, &path, self.options.use_case_sensitive_paths);

        // S1
        if let Err(reason) = policy::is_request_cacheable(&method, &request_headers) {
            diagnostics::emit(reason, &base_key);
            let response = next(request).await;
            diagnostics::emit(Diagnostic::NoResponseServed, &base_key);
            return response.map(ResponseBody::passthrough);
        }

        let only_if_cached =
            header_utils::contains(header_values(&request_headers, "cache-control"), "only-if-cached");

        // S2 / S2'
        let (cached_response, cached_vary_by_rules, storage_key) =
            self.lookup(&base_key, &request_headers, &query_pairs_owned).await;

        // S3
        let Some(cached_response) = cached_response else {
            if only_if_cached {
                diagnostics::emit(Diagnostic::GatewayTimeoutServed, &base_key);
                return gateway_timeout_response();
            }
            return self
                .forward_and_capture(
                    request,
                    next,
                    base_key,
                    storage_key,
                    cached_vary_by_rules,
                    request_headers,
                    query_pairs_owned,
                    vary_feature_keys,
                    now,
                )
                .await;
        };

        let age = cached_response.age(now);
        if policy::is_cached_entry_fresh(&cached_response.headers, age, &request_headers, now)
            .is_err()
        {
            if only_if_cached {
                diagnostics::emit(Diagnostic::GatewayTimeoutServed, &base_key);
                return gateway_timeout_response();
            }
            return self
                .forward_and_capture(
                    request,
                    next,
                    base_key,
                    storage_key,
                    cached_vary_by_rules,
                    request_headers,
                    query_pairs_owned,
                    vary_feature_keys,
                    now,
                )
                .await;
        }

        // S4
        if let Some(reason) = content_is_not_modified(&request_headers, &cached_response.headers) {
            diagnostics::emit(reason, &storage_key);
            diagnostics::emit(Diagnostic::NotModifiedServed, &storage_key);
            return not_modified_response(&cached_response);
        }

        // S5
        diagnostics::emit(Diagnostic::CachedResponseServed, &storage_key);
        served_from_cache_response(&cached_response, age)
    }

    async fn lookup(
        &self,
        base_key: &str,
        request_headers: &HeaderMap,
        query_pairs_owned: &[(String, String)],
    ) -> (Option<CachedResponse>, Option<CachedVaryByRules>, String) {
        match self.storage.get(base_key).await {
            Ok(Some(CachedEntry::Response(resp))) => {
                (Some(resp), None, base_key.to_string())
            }
            Ok(Some(CachedEntry::VaryByRules(rules))) => {
                let query_pairs_ref: Vec<(&str, &str)> = query_pairs_owned
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                let variant_key = key::create_storage_vary_by_key(
                    base_key,
                    &rules,
                    request_headers,
                    &query_pairs_ref,
                );
                let variant_response = match self.storage.get(&variant_key).await {
                    Ok(Some(CachedEntry::Response(resp))) => Some(resp),
                    _ => None,
                };
                // A concurrent write can replace the base key's Vary rules
                // between the read above and now (`spec.md §5` — no
                // single-flight, last write wins). Re-read the base key once
                // more and confirm it still derives the same variant key
                // before trusting the response just fetched.
                let confirmed_response = if variant_response.is_some() {
                    match self.storage.get(base_key).await {
                        Ok(Some(CachedEntry::VaryByRules(latest))) => {
                            let latest_key = key::create_storage_vary_by_key(
                                base_key,
                                &latest,
                                request_headers,
                                &query_pairs_ref,
                            );
                            if latest_key == variant_key { variant_response } else { None }
                        }
                        _ => None,
                    }
                } else {
                    None
                };
                (confirmed_response, Some(rules), variant_key)
            }
            _ => (None, None, base_key.to_string()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn forward_and_capture<ReqBody, ResBody, F, Fut>(
        &self,
        request: Request<ReqBody>,
        next: F,
        base_key: String,
        storage_key: String,
        cached_vary_by_rules: Option<CachedVaryByRules>,
        request_headers: HeaderMap,
        query_pairs_owned: Vec<(String, String)>,
        vary_feature_keys: Vec<String>,
        response_time: OffsetDateTime,
    ) -> Response<ResponseBody<ResBody, S>>
    where
        ResBody: Body<Data = Bytes> + Send + 'static,
        F: FnOnce(Request<ReqBody>) -> Fut + Send,
        Fut: Future<Output = Response<ResBody>> + Send,
    {
        let response = next(request).await;
        diagnostics::emit(Diagnostic::NoResponseServed, &base_key);
        let (mut parts, body) = response.into_parts();

        // FinalizeHeaders step 2 runs against the headers as the upstream
        // handler actually sent them — most responses have no `Date` at
        // all, and stamping one first would hand the freshness check a
        // synthetic `age == 0` instead of the real (often absent) upstream
        // value. Evaluate cacheability before step 1 touches anything.
        let should_cache = policy::is_response_cacheable(
            response_time,
            &request_headers,
            &parts.headers,
            parts.status,
        )
        .is_ok();

        // FinalizeHeaders step 1: stamp Date.
        if !parts.headers.contains_key(header::DATE) {
            if let Ok(value) =
                HeaderValue::from_str(&header_utils::format_http_date(response_time))
            {
                parts.headers.insert(header::DATE, value);
            }
        }

        if !should_cache {
            diagnostics::emit(Diagnostic::ResponseNotCached, &base_key);
            return Response::from_parts(parts, ResponseBody::passthrough(body));
        }

        // FinalizeHeaders step 3.
        let response_cc = header_values(&parts.headers, "cache-control");
        let valid_for = header_utils::try_parse_time_span(response_cc.iter().copied(), "s-maxage")
            .or_else(|| {
                header_utils::try_parse_time_span(response_cc.iter().copied(), "max-age")
            })
            .map(Duration::from_secs)
            .or_else(|| {
                parts
                    .headers
                    .get(header::EXPIRES)
                    .and_then(|v| v.to_str().ok())
                    .and_then(header_utils::try_parse_date)
                    .map(|expires| {
                        let delta = (expires - response_time).whole_seconds().max(0);
                        Duration::from_secs(delta as u64)
                    })
            })
            .unwrap_or(self.options.default_validity);

        // FinalizeHeaders step 4: Vary rules.
        let response_vary_raw: Vec<String> = parts
            .headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(',').map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        let normalized_headers = key::normalize_vary_names(&response_vary_raw);
        let normalized_query_keys = key::normalize_vary_names(&vary_feature_keys);

        let mut effective_storage_key = storage_key;
        if !(normalized_headers.is_empty() && normalized_query_keys.is_empty()) {
            let prefix = match &cached_vary_by_rules {
                Some(existing)
                    if existing.headers == normalized_headers
                        && existing.query_keys == normalized_query_keys =>
                {
                    existing.vary_by_key_prefix.clone()
                }
                _ => Uuid::new_v4().to_string(),
            };
            let rules = CachedVaryByRules {
                vary_by_key_prefix: prefix,
                headers: normalized_headers,
                query_keys: normalized_query_keys,
            };
            let query_pairs_ref: Vec<(&str, &str)> = query_pairs_owned
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            effective_storage_key = key::create_storage_vary_by_key(
                &base_key,
                &rules,
                &request_headers,
                &query_pairs_ref,
            );
            if self
                .storage
                .put(base_key.clone(), CachedEntry::VaryByRules(rules), valid_for)
                .await
                .is_ok()
            {
                diagnostics::emit(Diagnostic::VaryByRulesUpdated, &base_key);
            }
        }

        // FinalizeHeaders step 5: snapshot headers/status; body is filled
        // in once the capture stream reaches end-of-stream.
        let headers_snapshot = CachedHeaders::from_header_map(&parts.headers);
        let status_code = parts.status.as_u16();
        let declared_content_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut ctx = RequestContext::new(base_key.clone(), response_time);
        let handle = ctx.install_capture_stream(self.options.maximum_body_size);
        let job = FinalizeJob {
            storage: Arc::clone(&self.storage),
            storage_key: effective_storage_key,
            declared_content_length,
            cached_response_valid_for: valid_for,
            response_created: response_time,
            status_code,
            headers: headers_snapshot,
            handle: handle.clone(),
            log_key: base_key,
        };

        let body = ResponseBody::Captured {
            inner: CaptureBody::new(body, handle),
            job: Some(job),
        };
        Response::from_parts(parts, body)
    }
}

/// `spec.md §4.5`'s `ContentIsNotModified` rule.
fn content_is_not_modified(
    request_headers: &HeaderMap,
    cached_headers: &CachedHeaders,
) -> Option<Diagnostic> {
    if let Some(if_none_match) = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        let if_none_match = if_none_match.trim();
        if if_none_match == "*" {
            return Some(Diagnostic::NotModifiedIfNoneMatchStar);
        }
        if let Some(cached_etag) = cached_headers.get_joined("etag") {
            let cached_tag = strip_weak_prefix(cached_etag.trim());
            for candidate in if_none_match.split(',') {
                if strip_weak_prefix(candidate.trim()) == cached_tag {
                    return Some(Diagnostic::NotModifiedIfNoneMatchMatched);
                }
            }
        }
        return None;
    }

    if let Some(threshold) = request_headers
        .get(header::IF_UNMODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(header_utils::try_parse_date)
    {
        let resource_time = cached_headers
            .get_joined("last-modified")
            .and_then(|v| header_utils::try_parse_date(&v))
            .or_else(|| {
                cached_headers.get_joined("date").and_then(|v| header_utils::try_parse_date(&v))
            });
        if let Some(resource_time) = resource_time {
            if resource_time <= threshold {
                return Some(Diagnostic::NotModifiedIfUnmodifiedSinceSatisfied);
            }
        }
        return None;
    }

    None
}

fn strip_weak_prefix(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn gateway_timeout_response<B, S>() -> Response<ResponseBody<B, S>>
where
    S: Storage + 'static,
{
    Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .body(ResponseBody::empty())
        .expect("a fixed status with no headers always builds")
}

fn not_modified_response<B, S>(cached: &CachedResponse) -> Response<ResponseBody<B, S>>
where
    S: Storage + 'static,
{
    let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    for (name, values) in cached.headers.iter() {
        for value in values {
            builder = builder.header(name, value.as_str());
        }
    }
    builder.body(ResponseBody::empty()).expect("cached header snapshot was already valid")
}

fn served_from_cache_response<B, S>(
    cached: &CachedResponse,
    age: Duration,
) -> Response<ResponseBody<B, S>>
where
    S: Storage + 'static,
{
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(cached.status_code).unwrap_or(StatusCode::OK));
    for (name, values) in cached.headers.iter() {
        for value in values {
            builder = builder.header(name, value.as_str());
        }
    }
    builder = builder.header(header::AGE, age.as_secs().to_string());
    builder
        .body(ResponseBody::cached(cached.body.to_bytes()))
        .expect("cached header snapshot was already valid")
}

/// Owned data needed to run `FinalizeBody` once a captured response body
/// reaches end-of-stream, detached from the `Request`/`Response` types the
/// orchestration step that created it was holding (`spec.md §4.5`).
struct FinalizeJob<S> {
    storage: Arc<S>,
    storage_key: String,
    declared_content_length: Option<u64>,
    cached_response_valid_for: Duration,
    response_created: OffsetDateTime,
    status_code: u16,
    headers: CachedHeaders,
    handle: CaptureHandle,
    log_key: String,
}

impl<S> FinalizeJob<S>
where
    S: Storage + 'static,
{
    /// Runs `FinalizeBody` in the background — storage writes are
    /// fire-and-forget per `spec.md §6`, and the response body has
    /// already fully reached the caller by the time this runs.
    fn spawn(self) {
        tokio::spawn(finalize_body(self));
    }
}

async fn finalize_body<S>(job: FinalizeJob<S>)
where
    S: Storage + 'static,
{
    let captured = job.handle.lock().expect("lock poisoned").take_segmented_body();
    let Some(body) = captured else {
        diagnostics::emit(Diagnostic::ResponseNotCached, &job.log_key);
        return;
    };

    if let Some(declared) = job.declared_content_length {
        if declared != body.len() as u64 {
            diagnostics::emit(
                Diagnostic::ResponseContentLengthMismatchNotCached,
                &job.log_key,
            );
            return;
        }
    }

    let response =
        CachedResponse::new(job.response_created, job.status_code, job.headers, body);
    match job
        .storage
        .put(
            job.storage_key.clone(),
            CachedEntry::Response(response),
            job.cached_response_valid_for,
        )
        .await
    {
        Ok(()) => diagnostics::emit(Diagnostic::ResponseCached, &job.storage_key),
        Err(err) => {
            tracing::warn!(error = %err, key = %job.storage_key, "storage set failed")
        }
    }
}

pin_project! {
    /// The outgoing body of a `CacheMiddleware::run` response: either a
    /// fixed in-memory payload (a cached hit, a 304, a 504), a completely
    /// untouched passthrough of the upstream body, or an upstream body
    /// being teed into the cache as it streams out (`spec.md §4.4`).
    /// Grounded on `http-cache/src/body.rs`'s `StreamingBody<B>` enum.
    #[project = ResponseBodyProj]
    pub enum ResponseBody<B, S>
    where
        S: Storage + 'static,
    {
        Cached { data: Option<Bytes> },
        Empty,
        Passthrough { #[pin] inner: B },
        Captured {
            #[pin] inner: CaptureBody<B>,
            job: Option<FinalizeJob<S>>,
        },
    }
}

impl<B, S> ResponseBody<B, S>
where
    S: Storage + 'static,
{
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    pub fn cached(data: Bytes) -> Self {
        Self::Cached { data: Some(data) }
    }

    pub fn empty() -> Self {
        Self::Empty
    }
}

impl<B, S> Body for ResponseBody<B, S>
where
    B: Body<Data = Bytes>,
    S: Storage + 'static,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            ResponseBodyProj::Cached { data } => match data.take() {
                Some(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                _ => Poll::Ready(None),
            },
            ResponseBodyProj::Empty => Poll::Ready(None),
            ResponseBodyProj::Passthrough { inner } => inner.poll_frame(cx),
            ResponseBodyProj::Captured { inner, job } => {
                let poll = inner.poll_frame(cx);
                match &poll {
                    Poll::Ready(None) => {
                        if let Some(finalize) = job.take() {
                            finalize.spawn();
                        }
                    }
                    Poll::Ready(Some(Err(_))) => {
                        job.take();
                    }
                    _ => {}
                }
                poll
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ResponseBody::Cached { data } => data.is_none(),
            ResponseBody::Empty => true,
            ResponseBody::Passthrough { inner } => inner.is_end_stream(),
            ResponseBody::Captured { inner, .. } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            ResponseBody::Cached { data } => match data {
                Some(bytes) => SizeHint::with_exact(bytes.len() as u64),
                None => SizeHint::with_exact(0),
            },
            ResponseBody::Empty => SizeHint::with_exact(0),
            ResponseBody::Passthrough { inner } => inner.size_hint(),
            ResponseBody::Captured { inner, .. } => inner.size_hint(),
        }
    }
}
