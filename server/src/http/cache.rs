use axum::{
    http::{
        header::{CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, VARY},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::Serialize;

use super::AppError;

/// directives for one response's `Cache-Control` header; mirrors the
/// options bag `setCacheHeaders` takes
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    pub max_age_secs: u64,
    pub is_public: bool,
    pub must_revalidate: bool,
    pub immutable: bool,
    pub no_cache: bool,
    pub no_store: bool,
}

impl CachePolicy {
    pub const fn public(max_age_secs: u64) -> Self {
        CachePolicy {
            max_age_secs,
            is_public: true,
            must_revalidate: false,
            immutable: false,
            no_cache: false,
            no_store: false,
        }
    }

    pub const fn no_cache() -> Self {
        CachePolicy {
            max_age_secs: 0,
            is_public: false,
            must_revalidate: true,
            immutable: false,
            no_cache: true,
            no_store: false,
        }
    }
}

/// per-endpoint TTL policy, spec.md §4.7
pub mod ttl {
    use super::CachePolicy;

    pub const RESOURCES_FILTERED: CachePolicy = CachePolicy::public(60);
    pub const RESOURCES_UNFILTERED: CachePolicy = CachePolicy::public(300);
    pub const AUTHORS: CachePolicy = CachePolicy::public(600);
    pub const TAGS: CachePolicy = CachePolicy::public(600);
    pub const CONFIG_GET: CachePolicy = CachePolicy::public(3600);
    pub const CACHE_STATS: CachePolicy = CachePolicy::public(30);

    // named for completeness with spec.md's TTL table; "static file serving"
    // itself is out of scope (spec.md §1), so no route ever applies these
    pub const STATIC_HTML: CachePolicy = CachePolicy::no_cache();
    pub const STATIC_ASSET_IMMUTABLE_SECS: u64 = 31_536_000;
    pub const STATIC_IMAGE_SECS: u64 = 2_592_000;
    pub const STATIC_VIDEO_SECS: u64 = 86_400;
}

fn quoted_md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// `generateETag(data)` -- md5 of the response's own JSON serialization,
/// which is deterministic for a fixed struct shape and field order
pub fn generate_etag<T: Serialize>(data: &T) -> anyhow::Result<String> {
    let body = serde_json::to_vec(data)?;
    Ok(quoted_md5_hex(&body))
}

fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn if_modified_since_hits(headers: &HeaderMap, last_modified: DateTime<Utc>) -> bool {
    let Some(value) = headers.get(IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    match DateTime::parse_from_rfc2822(value) {
        Ok(since) => since.with_timezone(&Utc) >= last_modified,
        Err(_) => false,
    }
}

/// emits `Cache-Control`/`ETag`/`Last-Modified`/`Vary: Accept-Encoding`
pub fn set_cache_headers(
    headers: &mut HeaderMap,
    policy: &CachePolicy,
    etag: &str,
    last_modified: DateTime<Utc>,
) {
    let mut directives = Vec::new();
    if policy.no_store {
        directives.push("no-store".to_owned());
    } else if policy.no_cache {
        directives.push("no-cache".to_owned());
        directives.push("must-revalidate".to_owned());
    } else {
        directives.push(if policy.is_public { "public" } else { "private" }.to_owned());
        directives.push(format!("max-age={}", policy.max_age_secs));
        if policy.must_revalidate {
            directives.push("must-revalidate".to_owned());
        }
        if policy.immutable {
            directives.push("immutable".to_owned());
        }
    }

    if let Ok(v) = HeaderValue::from_str(&directives.join(", ")) {
        headers.insert(CACHE_CONTROL, v);
    }
    if let Ok(v) = HeaderValue::from_str(etag) {
        headers.insert(ETAG, v);
    }
    if let Ok(v) = HeaderValue::from_str(&last_modified.to_rfc2822()) {
        headers.insert(LAST_MODIFIED, v);
    }
    headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
}

/// wraps a JSON body with conditional-request handling and the endpoint's
/// cache policy; callers pass the originating request's headers
pub fn json_with_cache<T: Serialize>(
    req_headers: &HeaderMap,
    policy: CachePolicy,
    data: &T,
) -> Result<Response, AppError> {
    let etag = generate_etag(data)?;
    // content isn't independently timestamped since it's regenerated fresh
    // on every call; `Last-Modified` is set to "now" and the ETag
    // comparison above is the invalidation path that actually matters
    let last_modified = Utc::now();

    let mut resp_headers = HeaderMap::new();
    set_cache_headers(&mut resp_headers, &policy, &etag, last_modified);

    if if_none_match_hits(req_headers, &etag) || if_modified_since_hits(req_headers, last_modified) {
        return Ok((StatusCode::NOT_MODIFIED, resp_headers).into_response());
    }

    Ok((resp_headers, Json(serde_json::to_value(data)?)).into_response())
}
