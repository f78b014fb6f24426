//! The three cacheability/freshness predicates of `spec.md §4.3`.
//!
//! No teacher analog — `http-cache`'s own cache-ability gate lives inline
//! in `http-cache/src/lib.rs::run` as a handful of scattered `if`s. This
//! module pulls the same kind of decision out into named, independently
//! testable functions, grounded on the header-reading style of
//! `CosmicHorrorDev-http-cache-policy`'s `src/lib.rs` (reading
//! `Cache-Control` as a set of comma-joined directive strings rather than
//! a typed struct).

use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use time::OffsetDateTime;

use crate::diagnostics::Diagnostic;
use crate::entry::CachedHeaders;
use crate::header_utils::{contains, header_values, try_parse_date, try_parse_time_span};

/// `spec.md §4.3`: is this request, in principle, servable from cache?
pub fn is_request_cacheable(
    method: &Method,
    headers: &HeaderMap,
) -> Result<(), Diagnostic> {
    if *method != Method::GET && *method != Method::HEAD {
        return Err(Diagnostic::RequestMethodNotCacheable);
    }
    if headers
        .get(http::header::AUTHORIZATION)
        .is_some_and(|v| !v.is_empty())
    {
        return Err(Diagnostic::RequestHasAuthorization);
    }

    let cache_control = header_values(headers, "cache-control");
    if !cache_control.is_empty() {
        if contains(cache_control.iter().copied(), "no-cache") {
            return Err(Diagnostic::RequestNoCache);
        }
    } else {
        let pragma = header_values(headers, "pragma");
        if contains(pragma.iter().copied(), "no-cache") {
            return Err(Diagnostic::RequestNoCache);
        }
    }

    Ok(())
}

/// `spec.md §4.3`: is this response, in principle, storable — including
/// the freshness lower bound a response must clear at capture time to be
/// worth storing at all.
pub fn is_response_cacheable(
    response_time: OffsetDateTime,
    request_headers: &HeaderMap,
    response_headers: &HeaderMap,
    status: StatusCode,
) -> Result<(), Diagnostic> {
    let response_cc = header_values(response_headers, "cache-control");

    if !contains(response_cc.iter().copied(), "public") {
        return Err(Diagnostic::ResponseMissingPublic);
    }

    let request_cc = header_values(request_headers, "cache-control");
    if contains(response_cc.iter().copied(), "no-store")
        || contains(request_cc.iter().copied(), "no-store")
    {
        return Err(Diagnostic::ResponseNoStore);
    }
    if contains(response_cc.iter().copied(), "no-cache") {
        return Err(Diagnostic::ResponseNoCache);
    }
    if response_headers.contains_key(http::header::SET_COOKIE) {
        return Err(Diagnostic::ResponseHasSetCookie);
    }
    if response_headers
        .get(http::header::VARY)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "*")
    {
        return Err(Diagnostic::ResponseVaryStar);
    }
    if contains(response_cc.iter().copied(), "private") {
        return Err(Diagnostic::ResponsePrivate);
    }
    if status != StatusCode::OK {
        return Err(Diagnostic::ResponseStatusNotOk);
    }

    let date = header_values(response_headers, "date")
        .first()
        .and_then(|v| try_parse_date(v));
    let s_maxage = try_parse_time_span(response_cc.iter().copied(), "s-maxage");
    let max_age = try_parse_time_span(response_cc.iter().copied(), "max-age");
    let expires = header_values(response_headers, "expires")
        .first()
        .and_then(|v| try_parse_date(v));

    // Reject only when an `Expires` is present and already passed with no
    // `s-maxage`/`max-age` to override it. Absent `Expires` never rejects —
    // a bare `Cache-Control: public` with no freshness directive at all
    // falls back to the configured default validity (`spec.md §4.5` step 3),
    // it is not thrown away here.
    let fresh_lower_bound = match date {
        None => {
            if s_maxage.is_none() && max_age.is_none() {
                match expires {
                    Some(expires) => response_time < expires,
                    None => true,
                }
            } else {
                true
            }
        }
        Some(date) => {
            let age = (response_time - date).whole_seconds().max(0) as u64;
            if let Some(s) = s_maxage {
                age < s
            } else if let Some(m) = max_age {
                age < m
            } else {
                match expires {
                    Some(expires) => response_time < expires,
                    None => true,
                }
            }
        }
    };
    if !fresh_lower_bound {
        return Err(Diagnostic::ResponseNotFresh);
    }

    Ok(())
}

/// `spec.md §4.3`: given its measured age, is a cached entry still fresh
/// enough to serve without revalidation?
pub fn is_cached_entry_fresh(
    cached_headers: &CachedHeaders,
    mut age: Duration,
    request_headers: &HeaderMap,
    now: OffsetDateTime,
) -> Result<(), Diagnostic> {
    let cached_cc_owned: Vec<String> =
        cached_headers.get("cache-control").map(|v| v.to_vec()).unwrap_or_default();
    let cached_cc: Vec<&str> = cached_cc_owned.iter().map(String::as_str).collect();
    let request_cc = header_values(request_headers, "cache-control");

    if let Some(min_fresh) = try_parse_time_span(request_cc.iter().copied(), "min-fresh") {
        age += Duration::from_secs(min_fresh);
    }
    let age_secs = age.as_secs();

    let cached_shared_max_age = try_parse_time_span(cached_cc.iter().copied(), "s-maxage");
    if let Some(shared) = cached_shared_max_age {
        if age_secs >= shared {
            return Err(Diagnostic::CachedEntryStaleSharedMaxAge);
        }
    }

    let cached_max_age = try_parse_time_span(cached_cc.iter().copied(), "max-age");
    let request_max_age = try_parse_time_span(request_cc.iter().copied(), "max-age");
    let lowest_max_age = match (cached_max_age, request_max_age) {
        (Some(c), Some(r)) => Some(c.min(r)),
        (Some(c), None) => Some(c),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };

    if let Some(lowest) = lowest_max_age {
        if age_secs >= lowest {
            if contains(cached_cc.iter().copied(), "must-revalidate") {
                return Err(Diagnostic::CachedEntryStaleMustRevalidate);
            }
            if let Some(max_stale) =
                try_parse_time_span(request_cc.iter().copied(), "max-stale")
            {
                if age_secs - lowest < max_stale {
                    return Ok(());
                }
            }
            return Err(Diagnostic::CachedEntryStaleMaxAgeExceeded);
        }
        return Ok(());
    }

    if cached_shared_max_age.is_none() {
        let expires = cached_headers
            .get("expires")
            .and_then(|v| v.first())
            .and_then(|v| try_parse_date(v));
        if let Some(expires) = expires {
            return if now >= expires {
                Err(Diagnostic::CachedEntryStaleExpires)
            } else {
                Ok(())
            };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn post_request_not_cacheable() {
        let req = HeaderMap::new();
        assert_eq!(
            is_request_cacheable(&Method::POST, &req),
            Err(Diagnostic::RequestMethodNotCacheable)
        );
    }

    #[test]
    fn request_with_authorization_not_cacheable() {
        let req = headers(&[("authorization", "Bearer x")]);
        assert_eq!(
            is_request_cacheable(&Method::GET, &req),
            Err(Diagnostic::RequestHasAuthorization)
        );
    }

    #[test]
    fn request_no_cache_pragma_fallback() {
        let req = headers(&[("pragma", "no-cache")]);
        assert_eq!(
            is_request_cacheable(&Method::GET, &req),
            Err(Diagnostic::RequestNoCache)
        );
    }

    #[test]
    fn plain_get_is_cacheable() {
        let req = HeaderMap::new();
        assert_eq!(is_request_cacheable(&Method::GET, &req), Ok(()));
    }

    #[test]
    fn response_without_public_rejected() {
        let req = HeaderMap::new();
        let resp = headers(&[("cache-control", "max-age=60")]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::UNIX_EPOCH,
                &req,
                &resp,
                StatusCode::OK
            ),
            Err(Diagnostic::ResponseMissingPublic)
        );
    }

    #[test]
    fn response_with_set_cookie_rejected() {
        let req = HeaderMap::new();
        let resp = headers(&[
            ("cache-control", "public, max-age=60"),
            ("set-cookie", "a=1"),
        ]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::UNIX_EPOCH,
                &req,
                &resp,
                StatusCode::OK
            ),
            Err(Diagnostic::ResponseHasSetCookie)
        );
    }

    #[test]
    fn response_non_200_rejected() {
        let req = HeaderMap::new();
        let resp = headers(&[("cache-control", "public, max-age=60")]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::UNIX_EPOCH,
                &req,
                &resp,
                StatusCode::CREATED
            ),
            Err(Diagnostic::ResponseStatusNotOk)
        );
    }

    #[test]
    fn response_fresh_with_max_age_accepted() {
        let req = HeaderMap::new();
        let resp = headers(&[("cache-control", "public, max-age=60")]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::UNIX_EPOCH,
                &req,
                &resp,
                StatusCode::OK
            ),
            Ok(())
        );
    }

    #[test]
    fn response_without_any_freshness_signal_falls_back_to_default_validity() {
        let req = HeaderMap::new();
        let resp = headers(&[("cache-control", "public")]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::UNIX_EPOCH,
                &req,
                &resp,
                StatusCode::OK
            ),
            Ok(())
        );
    }

    #[test]
    fn response_with_expires_already_passed_rejected() {
        let req = HeaderMap::new();
        let resp = headers(&[
            ("cache-control", "public"),
            ("expires", "Thu, 01 Jan 1970 00:00:00 GMT"),
        ]);
        assert_eq!(
            is_response_cacheable(
                OffsetDateTime::from_unix_timestamp(60).unwrap(),
                &req,
                &resp,
                StatusCode::OK
            ),
            Err(Diagnostic::ResponseNotFresh)
        );
    }

    #[test]
    fn cached_entry_fresh_under_max_age() {
        let mut cached = CachedHeaders::new();
        cached.insert("cache-control", "max-age=100".to_string());
        let req = HeaderMap::new();
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(50),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Ok(())
        );
    }

    #[test]
    fn cached_entry_stale_past_max_age() {
        let mut cached = CachedHeaders::new();
        cached.insert("cache-control", "max-age=100".to_string());
        let req = HeaderMap::new();
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(150),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Err(Diagnostic::CachedEntryStaleMaxAgeExceeded)
        );
    }

    #[test]
    fn cached_entry_stale_but_within_max_stale_allowance() {
        let mut cached = CachedHeaders::new();
        cached.insert("cache-control", "max-age=100".to_string());
        let req = headers(&[("cache-control", "max-stale=60")]);
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(120),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Ok(())
        );
    }

    #[test]
    fn cached_entry_must_revalidate_ignores_max_stale() {
        let mut cached = CachedHeaders::new();
        cached.insert(
            "cache-control",
            "max-age=100, must-revalidate".to_string(),
        );
        let req = headers(&[("cache-control", "max-stale=60")]);
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(120),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Err(Diagnostic::CachedEntryStaleMustRevalidate)
        );
    }

    #[test]
    fn cached_entry_shared_max_age_overrides_on_exceed() {
        let mut cached = CachedHeaders::new();
        cached.insert(
            "cache-control",
            "max-age=1000, s-maxage=50".to_string(),
        );
        let req = HeaderMap::new();
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(60),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Err(Diagnostic::CachedEntryStaleSharedMaxAge)
        );
    }

    #[test]
    fn cached_entry_min_fresh_pulls_age_forward() {
        let mut cached = CachedHeaders::new();
        cached.insert("cache-control", "max-age=100".to_string());
        let req = headers(&[("cache-control", "min-fresh=20")]);
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(90),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Err(Diagnostic::CachedEntryStaleMaxAgeExceeded)
        );
    }

    #[test]
    fn cached_entry_falls_back_to_expires() {
        let mut cached = CachedHeaders::new();
        cached.insert(
            "expires",
            "Thu, 01 Jan 1970 00:02:00 GMT".to_string(),
        );
        let req = HeaderMap::new();
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(30),
                &req,
                OffsetDateTime::from_unix_timestamp(90).unwrap()
            ),
            Ok(())
        );
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(30),
                &req,
                OffsetDateTime::from_unix_timestamp(180).unwrap()
            ),
            Err(Diagnostic::CachedEntryStaleExpires)
        );
    }

    #[test]
    fn cached_entry_with_no_signal_at_all_is_fresh() {
        let cached = CachedHeaders::new();
        let req = HeaderMap::new();
        assert_eq!(
            is_cached_entry_fresh(
                &cached,
                Duration::from_secs(999_999),
                &req,
                OffsetDateTime::UNIX_EPOCH
            ),
            Ok(())
        );
    }
}
