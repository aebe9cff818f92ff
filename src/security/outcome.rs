//! Validation outcomes shared by every validator in the security subsystem.
//!
//! # Design Decisions
//! - Expected adversarial input is a value, not a panic: validators return
//!   `ValidationOutcome<T>` and never fail any other way
//! - Each rejection carries a stable machine code and a human message
//! - Security-category rejections are logged at warn level as an audit trail

use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;

/// Result of validating untrusted input.
pub type ValidationOutcome<T> = Result<T, Rejection>;

/// Broad class of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed, oversized or structurally invalid input.
    Validation,
    /// Input that looks like an attack (SSRF target, forged signature, blocked type).
    Security,
}

/// Specific reason a value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Empty,
    TooLong,
    InvalidFormat,
    DangerousScheme,
    DisallowedScheme,
    MissingHost,
    PrivateAddress,
    SizeExceeded,
    SizeMismatch,
    DangerousExtension,
    UnsupportedType,
    SignatureMismatch,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Empty => "empty",
            ErrorKind::TooLong => "too_long",
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::DangerousScheme => "dangerous_scheme",
            ErrorKind::DisallowedScheme => "disallowed_scheme",
            ErrorKind::MissingHost => "missing_host",
            ErrorKind::PrivateAddress => "private_address",
            ErrorKind::SizeExceeded => "size_exceeded",
            ErrorKind::SizeMismatch => "size_mismatch",
            ErrorKind::DangerousExtension => "dangerous_extension",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::SignatureMismatch => "signature_mismatch",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Empty
            | ErrorKind::TooLong
            | ErrorKind::InvalidFormat
            | ErrorKind::MissingHost
            | ErrorKind::SizeExceeded
            | ErrorKind::SizeMismatch
            | ErrorKind::UnsupportedType => ErrorCategory::Validation,
            ErrorKind::DangerousScheme
            | ErrorKind::DisallowedScheme
            | ErrorKind::PrivateAddress
            | ErrorKind::DangerousExtension
            | ErrorKind::SignatureMismatch => ErrorCategory::Security,
        }
    }

    pub fn is_security(&self) -> bool {
        self.category() == ErrorCategory::Security
    }
}

/// A rejected input: what kind of problem, and a message for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Rejection {
    pub kind: ErrorKind,
    pub message: String,
}

impl Rejection {
    /// Build a rejection and record it.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        if kind.is_security() {
            tracing::warn!(kind = kind.code(), reason = %message, "Security rejection");
        } else {
            tracing::debug!(kind = kind.code(), reason = %message, "Validation rejection");
        }
        metrics::record_rejection(kind.code());
        Self { kind, message }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}
