//! Request-side helpers.
//!
//! # Responsibilities
//! - Name the headers the guard reads (request id, owner, upload filename)
//! - Extract the caller identity set by the upstream session layer
//!
//! # Design Decisions
//! - Request ID is assigned by tower-http as early as possible for tracing
//! - A malformed owner header is treated as absent, never as an error

use axum::http::HeaderMap;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticated owner id, injected by the session layer in front of the guard.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Client-supplied filename for raw-body uploads.
pub const FILE_NAME_HEADER: &str = "x-file-name";

pub const MAX_OWNER_ID_CHARS: usize = 128;

/// The caller's owner id, if present and well formed.
pub fn owner_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(OWNER_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.chars().count() > MAX_OWNER_ID_CHARS {
        return None;
    }
    Some(value.to_string())
}

/// The request id assigned by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Header value as text, or empty when missing or not visible ASCII.
pub fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
