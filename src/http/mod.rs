//! HTTP surface of the guard.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, trace, timeout, metrics)
//!     → rate_limit_middleware (IP then user budget for the route's action)
//!     → handlers.rs (validators, ordering coordinator)
//!     → response.rs (verdict bodies, status mapping)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{OWNER_HEADER, REQUEST_ID_HEADER};
pub use server::{AppState, GuardSettings, HttpServer};
