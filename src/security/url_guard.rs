//! Outbound URL validation (SSRF defense).
//!
//! # Check Order
//! ```text
//! raw string
//!     → non-empty, length <= MAX_URL_CHARS
//!     → dangerous scheme prefix (raw text, before parsing)
//!     → url::Url::parse (fail closed)
//!     → scheme allow-list (http, https)
//!     → host present
//!     → host blocklist (loopback, private, link-local, unspecified)
//!     → CanonicalUrl
//! ```
//!
//! # Known Limitation
//! The blocklist is applied to the host as written. DNS names are not resolved,
//! so a public name that resolves to a private address passes. Callers that
//! fetch the URL should resolve and re-check the address before connecting.
//! IPv4 literals in decimal, octal or hex form are normalised by the URL parser
//! and are caught.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Serialize, Serializer};
use url::{Host, Url};

use crate::security::outcome::{ErrorKind, Rejection, ValidationOutcome};

pub const MAX_URL_CHARS: usize = 2048;

const DANGEROUS_SCHEME_PREFIXES: &[&str] = &["javascript:", "data:", "file:", "vbscript:"];
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];
const BLOCKED_HOSTNAMES: &[&str] = &["localhost", "localhost.localdomain", "ip6-localhost", "ip6-loopback"];

/// A URL that passed every check, in the parser's canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    pub fn into_inner(self) -> Url {
        self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

/// Validate an untrusted URL and return its canonical form.
pub fn validate_url(raw: &str) -> ValidationOutcome<CanonicalUrl> {
    if raw.trim().is_empty() {
        return Err(Rejection::new(ErrorKind::Empty, "URL is required"));
    }
    if raw.chars().count() > MAX_URL_CHARS {
        return Err(Rejection::new(
            ErrorKind::TooLong,
            format!("URL must be at most {} characters", MAX_URL_CHARS),
        ));
    }

    // The URL parser skips leading C0 controls and spaces, so do the same here.
    let lowered = raw
        .trim_start_matches(|c: char| c <= ' ')
        .to_ascii_lowercase();
    if DANGEROUS_SCHEME_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return Err(Rejection::new(ErrorKind::DangerousScheme, "URL scheme is not allowed"));
    }

    let url = Url::parse(raw.trim())
        .map_err(|e| Rejection::new(ErrorKind::InvalidFormat, format!("URL is not valid: {}", e)))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(Rejection::new(
            ErrorKind::DisallowedScheme,
            "Only http and https URLs are allowed",
        ));
    }

    let host = match url.host() {
        Some(host) => host,
        None => return Err(Rejection::new(ErrorKind::MissingHost, "URL must include a host")),
    };
    if is_blocked_host(&host) {
        return Err(Rejection::new(
            ErrorKind::PrivateAddress,
            "URLs pointing to private or local addresses are not allowed",
        ));
    }

    Ok(CanonicalUrl(url))
}

/// Convenience predicate for callers that only need a yes/no answer.
pub fn is_safe_url(raw: &str) -> bool {
    validate_url(raw).is_ok()
}

fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => is_blocked_domain(domain),
        Host::Ipv4(addr) => is_blocked_ipv4(addr),
        Host::Ipv6(addr) => is_blocked_ipv6(addr),
    }
}

fn is_blocked_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_HOSTNAMES.contains(&domain.as_str()) || domain.ends_with(".localhost")
}

fn is_blocked_ipv4(addr: &Ipv4Addr) -> bool {
    addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast()
}

fn is_blocked_ipv6(addr: &Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    let first = addr.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
        return true;
    }
    match addr.to_ipv4_mapped() {
        Some(v4) => is_blocked_ipv4(&v4),
        None => false,
    }
}
