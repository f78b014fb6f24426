//! Structured diagnostic tags, emitted as `tracing` events.
//!
//! No teacher analog in `http-cache` (that crate logs nothing); grounded on
//! `RomanEmreis-volga`'s `tracing::info!`/`warn!`/`trace!` call sites
//! (`src/app.rs`) for the convention of instrumenting pipeline decisions
//! with plain `tracing` macros rather than a bespoke logging abstraction.
//! This is an ambient-stack addition (`SPEC_FULL.md §2` item 7), not a
//! feature the distilled spec asked for and a teacher showed — `spec.md §6`
//! only names the tag set, not how to emit it.

use std::fmt;

/// The fixed, observable set of diagnostic tags from `spec.md §6` and the
/// per-predicate rejection/staleness reasons from `spec.md §4.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    GatewayTimeoutServed,
    NoResponseServed,
    CachedResponseServed,
    NotModifiedServed,
    NotModifiedIfNoneMatchStar,
    NotModifiedIfNoneMatchMatched,
    NotModifiedIfUnmodifiedSinceSatisfied,
    VaryByRulesUpdated,
    ResponseCached,
    ResponseNotCached,
    ResponseContentLengthMismatchNotCached,

    RequestMethodNotCacheable,
    RequestHasAuthorization,
    RequestNoCache,

    ResponseMissingPublic,
    ResponseNoStore,
    ResponseNoCache,
    ResponseHasSetCookie,
    ResponseVaryStar,
    ResponsePrivate,
    ResponseStatusNotOk,
    ResponseNotFresh,

    CachedEntryStaleSharedMaxAge,
    CachedEntryStaleMustRevalidate,
    CachedEntryStaleMaxAgeExceeded,
    CachedEntryStaleExpires,
}

impl Diagnostic {
    pub fn as_str(self) -> &'static str {
        match self {
            Diagnostic::GatewayTimeoutServed => "GatewayTimeoutServed",
            Diagnostic::NoResponseServed => "NoResponseServed",
            Diagnostic::CachedResponseServed => "CachedResponseServed",
            Diagnostic::NotModifiedServed => "NotModifiedServed",
            Diagnostic::NotModifiedIfNoneMatchStar => {
                "NotModifiedIfNoneMatchStar"
            }
            Diagnostic::NotModifiedIfNoneMatchMatched => {
                "NotModifiedIfNoneMatchMatched"
            }
            Diagnostic::NotModifiedIfUnmodifiedSinceSatisfied => {
                "NotModifiedIfUnmodifiedSinceSatisfied"
            }
            Diagnostic::VaryByRulesUpdated => "VaryByRulesUpdated",
            Diagnostic::ResponseCached => "ResponseCached",
            Diagnostic::ResponseNotCached => "ResponseNotCached",
            Diagnostic::ResponseContentLengthMismatchNotCached => {
                "ResponseContentLengthMismatchNotCached"
            }
            Diagnostic::RequestMethodNotCacheable => {
                "RequestMethodNotCacheable"
            }
            Diagnostic::RequestHasAuthorization => "RequestHasAuthorization",
            Diagnostic::RequestNoCache => "RequestNoCache",
            Diagnostic::ResponseMissingPublic => "ResponseMissingPublic",
            Diagnostic::ResponseNoStore => "ResponseNoStore",
            Diagnostic::ResponseNoCache => "ResponseNoCache",
            Diagnostic::ResponseHasSetCookie => "ResponseHasSetCookie",
            Diagnostic::ResponseVaryStar => "ResponseVaryStar",
            Diagnostic::ResponsePrivate => "ResponsePrivate",
            Diagnostic::ResponseStatusNotOk => "ResponseStatusNotOk",
            Diagnostic::ResponseNotFresh => "ResponseNotFresh",
            Diagnostic::CachedEntryStaleSharedMaxAge => {
                "CachedEntryStaleSharedMaxAge"
            }
            Diagnostic::CachedEntryStaleMustRevalidate => {
                "CachedEntryStaleMustRevalidate"
            }
            Diagnostic::CachedEntryStaleMaxAgeExceeded => {
                "CachedEntryStaleMaxAgeExceeded"
            }
            Diagnostic::CachedEntryStaleExpires => "CachedEntryStaleExpires",
        }
    }

    /// Anomalies worth a `warn`; everything else is routine `debug` traffic.
    fn is_warning(self) -> bool {
        matches!(
            self,
            Diagnostic::ResponseContentLengthMismatchNotCached
                | Diagnostic::GatewayTimeoutServed
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emits `tag` as a `tracing` event, tagged with `key` for correlation.
pub fn emit(tag: Diagnostic, key: &str) {
    if tag.is_warning() {
        tracing::warn!(tag = tag.as_str(), key, "response cache diagnostic");
    } else {
        tracing::debug!(tag = tag.as_str(), key, "response cache diagnostic");
    }
}
