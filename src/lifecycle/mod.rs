//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → broadcast → server stops accepting, sweeper and reload loop exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup in main: config, logging, metrics, then listener
//! - One broadcast channel reaches every background task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
