//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → reloadable parts swapped into the server's settings
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<GuardSettings>
//!     → middleware and handlers observe new policies
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener and metrics addresses are read once at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    GuardConfig, ListenerConfig, ObservabilityConfig, PromptConfig, RateLimitConfig, RatePolicies,
    RatePolicy, ScopedPolicy, SecurityConfig, TimeoutConfig, UploadConfig,
};
