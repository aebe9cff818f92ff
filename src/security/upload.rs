//! Upload integrity validation.
//!
//! # Check Order
//! ```text
//! UploadCandidate
//!     → size bounds (declared size, received length)
//!     → filename sanitization
//!     → extension blocklist
//!     → declared MIME allow-list
//!     → magic-number signature
//!     → SHA-256 content hash
//!     → FileRecord
//! ```
//!
//! # Design Decisions
//! - Cheapest checks first: nothing scans or hashes the buffer until size,
//!   name and type are accepted
//! - Short-circuit on the first failure; every rejection is final
//! - Pure and synchronous; async callers move it off the executor because the
//!   hash is CPU-bound

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::UploadConfig;
use crate::security::outcome::{ErrorKind, Rejection, ValidationOutcome};
use crate::security::signatures::{matches_signature, normalize_mime, ContentKind};

pub const UNNAMED_FILE: &str = "unnamed";

const MAX_KEPT_EXTENSION_CHARS: usize = 16;

const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "com", "bat", "cmd", "msi", "msp", "scr", "pif", "cpl", "msc", "hta", "jar",
    "js", "jse", "vbs", "vbe", "wsf", "wsh", "ps1", "psm1", "sh", "bash", "zsh", "csh", "ksh",
    "php", "php3", "php4", "php5", "phtml", "phar", "py", "pyc", "pl", "rb", "cgi", "asp", "aspx",
    "jsp", "jspx", "app", "apk", "deb", "rpm", "dmg", "pkg", "lnk", "reg", "so", "dylib",
];

static REPEATED_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{2,}").expect("static regex"));

/// An uploaded file as received, before any check has run.
#[derive(Debug, Clone, Copy)]
pub struct UploadCandidate<'a> {
    pub name: &'a str,
    pub declared_mime: &'a str,
    pub size_bytes: u64,
    pub bytes: &'a [u8],
}

/// A file that passed every check. Immutable; the hash is its storage identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub sanitized_filename: String,
    pub declared_mime: String,
    pub content_kind: ContentKind,
    pub size_bytes: u64,
    pub sha256_hash: [u8; 32],
}

impl FileRecord {
    /// Content hash as 64 lowercase hex characters.
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256_hash)
    }
}

/// Validates uploads against a configured policy.
#[derive(Debug, Clone)]
pub struct FileIntegrityValidator {
    policy: UploadConfig,
}

impl FileIntegrityValidator {
    pub fn new(policy: UploadConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UploadConfig {
        &self.policy
    }

    pub fn validate(&self, upload: &UploadCandidate<'_>) -> ValidationOutcome<FileRecord> {
        let max = self.policy.max_size_bytes;
        if upload.size_bytes == 0 {
            return Err(Rejection::new(ErrorKind::Empty, "File is empty"));
        }
        if upload.size_bytes > max {
            return Err(Rejection::new(
                ErrorKind::SizeExceeded,
                format!("File exceeds the maximum size of {} bytes", max),
            ));
        }
        if upload.size_bytes != upload.bytes.len() as u64 {
            return Err(Rejection::new(
                ErrorKind::SizeMismatch,
                "Declared size does not match the received content",
            ));
        }

        let sanitized_filename = sanitize_filename(upload.name, self.policy.max_filename_chars);

        if let Some(ext) = blocked_extension(&sanitized_filename) {
            return Err(Rejection::new(
                ErrorKind::DangerousExtension,
                format!("Files with the .{} extension are not allowed", ext),
            ));
        }

        let declared_mime = normalize_mime(upload.declared_mime);
        let allowed = self
            .policy
            .allowed_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&declared_mime));
        let content_kind = match ContentKind::from_mime(&declared_mime) {
            Some(kind) if allowed => kind,
            _ => {
                return Err(Rejection::new(
                    ErrorKind::UnsupportedType,
                    format!("File type {} is not supported", declared_mime),
                ));
            }
        };

        if !matches_signature(content_kind, upload.bytes) {
            return Err(Rejection::new(
                ErrorKind::SignatureMismatch,
                "File content does not match its declared type",
            ));
        }

        let record = FileRecord {
            sanitized_filename,
            declared_mime,
            content_kind,
            size_bytes: upload.size_bytes,
            sha256_hash: sha256_digest(upload.bytes),
        };
        tracing::debug!(
            filename = %record.sanitized_filename,
            mime = %record.declared_mime,
            size = record.size_bytes,
            "Upload passed integrity checks"
        );
        Ok(record)
    }
}

/// Make an untrusted filename safe to store and display.
///
/// Path separators and anything outside `[A-Za-z0-9._-]` become `_`, runs of
/// dots collapse to one, leading dots are dropped, and the result is cut to
/// `max_chars` keeping a short extension. Never returns an empty string.
pub fn sanitize_filename(name: &str, max_chars: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let collapsed = REPEATED_DOTS.replace_all(&replaced, ".");
    let trimmed = collapsed.trim_start_matches('.');
    let truncated = truncate_keeping_extension(trimmed, max_chars);
    if truncated.is_empty() {
        UNNAMED_FILE.to_string()
    } else {
        truncated
    }
}

fn truncate_keeping_extension(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    if let Some((stem, ext)) = name.rsplit_once('.') {
        let ext_chars = ext.chars().count();
        if !stem.is_empty() && ext_chars <= MAX_KEPT_EXTENSION_CHARS && ext_chars + 1 < max_chars {
            let stem: String = stem.chars().take(max_chars - ext_chars - 1).collect();
            return format!("{}.{}", stem, ext);
        }
    }
    name.chars().take(max_chars).collect()
}

/// First blocked extension among the name's dot-separated segments, if any.
fn blocked_extension(filename: &str) -> Option<String> {
    filename
        .split('.')
        .skip(1)
        .map(|segment| segment.to_ascii_lowercase())
        .find(|segment| BLOCKED_EXTENSIONS.contains(&segment.as_str()))
}

fn sha256_digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 of `bytes` as 64 lowercase hex characters.
pub fn calculate_file_hash(bytes: &[u8]) -> String {
    hex::encode(sha256_digest(bytes))
}
