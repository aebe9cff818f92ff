//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and windows > 0, addresses parse)
//! - Check that every allowed upload type has a signature table entry
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GuardConfig, RatePolicy, ScopedPolicy};
use crate::security::signatures::{normalize_mime, ContentKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address like 0.0.0.0:8080",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
    let policies = &config.rate_limit.policies;
    for (name, scoped) in [
        ("auth", &policies.auth),
        ("ai_invocation", &policies.ai_invocation),
        ("mutation", &policies.mutation),
        ("bookmark_create", &policies.bookmark_create),
        ("file_upload", &policies.file_upload),
    ] {
        check_scoped(&mut errors, name, scoped);
    }

    if config.uploads.max_size_bytes == 0 {
        errors.push(ValidationError::new("uploads.max_size_bytes", "must be greater than 0"));
    }
    if config.uploads.max_filename_chars == 0 {
        errors.push(ValidationError::new(
            "uploads.max_filename_chars",
            "must be greater than 0",
        ));
    }
    for mime in &config.uploads.allowed_mime_types {
        if ContentKind::from_mime(&normalize_mime(mime)).is_none() {
            errors.push(ValidationError::new(
                "uploads.allowed_mime_types",
                format!("{} has no signature table entry", mime),
            ));
        }
    }

    if config.prompts.max_chars == 0 {
        errors.push(ValidationError::new("prompts.max_chars", "must be greater than 0"));
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"pretty\" or \"json\"",
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_scoped(errors: &mut Vec<ValidationError>, name: &str, scoped: &ScopedPolicy) {
    check_policy(errors, &format!("rate_limit.policies.{}.ip", name), &scoped.ip);
    if let Some(user) = &scoped.user {
        check_policy(errors, &format!("rate_limit.policies.{}.user", name), user);
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, field: &str, policy: &RatePolicy) {
    if policy.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("{}.max_requests", field),
            "must be greater than 0",
        ));
    }
    if policy.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.window_ms", field),
            "must be greater than 0",
        ));
    }
}
