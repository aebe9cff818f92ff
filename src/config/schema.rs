//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the guard service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Upload validation policy.
    pub uploads: UploadConfig,

    /// Language-model prompt sanitization settings.
    pub prompts: PromptConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Security response settings.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// A fixed-window limit: at most `max_requests` per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window_ms: u32,
}

impl RatePolicy {
    pub const fn new(max_requests: u32, window_ms: u32) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

/// Limits for one action category, per client IP and per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScopedPolicy {
    pub ip: RatePolicy,
    /// Falls back to the IP policy when absent.
    #[serde(default)]
    pub user: Option<RatePolicy>,
}

/// Named policies, one per action category.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RatePolicies {
    pub auth: ScopedPolicy,
    pub ai_invocation: ScopedPolicy,
    pub mutation: ScopedPolicy,
    pub bookmark_create: ScopedPolicy,
    pub file_upload: ScopedPolicy,
}

const MINUTE_MS: u32 = 60_000;

impl Default for RatePolicies {
    fn default() -> Self {
        Self {
            auth: ScopedPolicy {
                ip: RatePolicy::new(10, 15 * MINUTE_MS),
                user: Some(RatePolicy::new(5, 15 * MINUTE_MS)),
            },
            ai_invocation: ScopedPolicy {
                ip: RatePolicy::new(20, MINUTE_MS),
                user: Some(RatePolicy::new(10, MINUTE_MS)),
            },
            mutation: ScopedPolicy {
                ip: RatePolicy::new(120, MINUTE_MS),
                user: Some(RatePolicy::new(60, MINUTE_MS)),
            },
            bookmark_create: ScopedPolicy {
                ip: RatePolicy::new(60, MINUTE_MS),
                user: Some(RatePolicy::new(30, MINUTE_MS)),
            },
            file_upload: ScopedPolicy {
                ip: RatePolicy::new(20, 60 * MINUTE_MS),
                user: Some(RatePolicy::new(10, 60 * MINUTE_MS)),
            },
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Interval between sweeps of expired counters, in seconds.
    pub sweep_interval_secs: u64,

    /// Per-action policies.
    pub policies: RatePolicies,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            policies: RatePolicies::default(),
        }
    }
}

/// Upload validation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file in bytes.
    pub max_size_bytes: u64,

    /// Longest stored filename in characters.
    pub max_filename_chars: usize,

    /// Declared MIME types that may be uploaded.
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024, // 10MB
            max_filename_chars: 255,
            allowed_mime_types: [
                "application/pdf",
                "image/png",
                "image/jpeg",
                "image/gif",
                "image/webp",
                "text/plain",
                "text/markdown",
                "text/csv",
                "application/json",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

/// Prompt sanitization settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum characters of user text embedded in a prompt.
    pub max_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_chars: crate::security::sanitize::DEFAULT_PROMPT_MAX_CHARS,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security response configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Return the specific reason for security rejections to clients.
    /// Off by default: probing clients only learn that a request was refused.
    pub expose_rejection_details: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            expose_rejection_details: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.uploads.max_filename_chars, 255);
        assert!(!config.security.expose_rejection_details);
    }

    #[test]
    fn test_partial_policy_override() {
        let config: GuardConfig = toml::from_str(
            r#"
            [rate_limit.policies.auth]
            ip = { max_requests = 3, window_ms = 1000 }
            "#,
        )
        .unwrap();
        let auth = config.rate_limit.policies.auth;
        assert_eq!(auth.ip, RatePolicy::new(3, 1000));
        assert_eq!(auth.user, None);
        // Untouched categories keep their defaults.
        assert_eq!(
            config.rate_limit.policies.mutation,
            RatePolicies::default().mutation
        );
    }

    #[test]
    fn test_default_policies_are_distinct() {
        let p = RatePolicies::default();
        let ips = [p.auth.ip, p.ai_invocation.ip, p.mutation.ip, p.bookmark_create.ip, p.file_upload.ip];
        for (i, a) in ips.iter().enumerate() {
            for b in ips.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
