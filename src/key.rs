//! Derives the base key from a request, and the variant key from a request
//! plus a stored Vary rule (`spec.md §4.2`).
//!
//! No direct teacher analog exists — `http-cache`'s own cache key
//! (`HttpCacheOptions::create_cache_key` in `http-cache/src/lib.rs`) is a
//! flat `"{method}:{uri}"` string with no Vary indirection. This module
//! generalizes that idea to the spec's two-tier base-key/variant-key
//! scheme.

use http::{HeaderMap, Method};

use crate::entry::CachedVaryByRules;
use crate::normalize::get_order_casing_normalized_string_values;

/// Record separator — joins the base key to the vary-rule prefix.
const C1: char = '\u{1e}';
/// Unit separator — joins the vary-rule prefix to the `H`/`Q` sections.
const C2: char = '\u{1f}';

/// `"{METHOD}\n{path-uppercased}"`, unless `use_case_sensitive_paths` keeps
/// the path verbatim.
pub fn create_base_key(
    method: &Method,
    path: &str,
    use_case_sensitive_paths: bool,
) -> String {
    let path = if use_case_sensitive_paths {
        path.to_string()
    } else {
        path.to_ascii_uppercase()
    };
    format!("{}\n{path}", method.as_str())
}

/// Concatenates the base key with the normalized header/query fingerprint
/// described by `vary_rules`, resolving a `"*"` query key to every query
/// key currently on the request (`spec.md §4.2`).
pub fn create_storage_vary_by_key(
    base_key: &str,
    vary_rules: &CachedVaryByRules,
    request_headers: &HeaderMap,
    query_pairs: &[(&str, &str)],
) -> String {
    let mut out = String::new();
    out.push_str(base_key);
    out.push(C1);
    out.push_str(&vary_rules.vary_by_key_prefix);
    out.push(C2);
    out.push('H');
    out.push(C1);
    for name in &vary_rules.headers {
        let joined = request_headers
            .get_all(name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(name);
        out.push('=');
        out.push_str(&joined);
        out.push(C1);
    }
    out.push(C2);
    out.push('Q');
    out.push(C1);

    let effective_query_keys: Vec<String> =
        if vary_rules.query_keys == ["*"] {
            let mut keys: Vec<String> = query_pairs
                .iter()
                .map(|(k, _)| k.to_ascii_uppercase())
                .collect();
            keys.sort();
            keys.dedup();
            keys
        } else {
            vary_rules.query_keys.clone()
        };

    for key in &effective_query_keys {
        let joined = query_pairs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(key);
        out.push('=');
        out.push_str(&joined);
        out.push(C1);
    }

    out
}

/// Normalizes a raw `Vary` header or `VaryByQueryKeys` feature value into
/// the sorted, upper-cased, deduped form the key derivation and rule-reuse
/// comparison require (`spec.md §4.5` step 4).
pub fn normalize_vary_names(values: &[String]) -> Vec<String> {
    let mut normalized = get_order_casing_normalized_string_values(values);
    normalized.dedup();
    normalized
}
