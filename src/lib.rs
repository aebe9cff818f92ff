//! Guardrail: input validation, rate limiting and optimistic-concurrency
//! ordering for a multi-tenant content service.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod ordering;
pub mod security;

pub use config::schema::GuardConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
