//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming mutating request:
//!     → rate_limit.rs (IP scope, then user scope, per action category)
//!     → url_guard.rs (URLs that will be fetched or stored)
//!     → sanitize.rs (text for storage/display, text for prompts)
//!     → upload.rs + signatures.rs (file size, name, type, magic number, hash)
//!     → Pass to handler (ordering, storage)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Adversarial input yields a typed `Rejection`, never a panic

pub mod outcome;
pub mod rate_limit;
pub mod sanitize;
pub mod signatures;
pub mod upload;
pub mod url_guard;

pub use outcome::{ErrorCategory, ErrorKind, Rejection, ValidationOutcome};
pub use rate_limit::{ActionCategory, CombinedDecision, LimitScope, RateLimitDecision, RateLimiter};
pub use sanitize::{decode_entities, sanitize_for_prompt, strip_markup, validate_text};
pub use signatures::ContentKind;
pub use upload::{calculate_file_hash, sanitize_filename, FileIntegrityValidator, FileRecord, UploadCandidate};
pub use url_guard::{validate_url, CanonicalUrl};
