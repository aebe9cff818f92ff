//! Ordering subsystem.
//!
//! # Data Flow
//! ```text
//! POST /v1/items/reorder
//!     → coordinator.rs (batch validation, owner snapshot, conditional writes)
//!     → store.rs (OrderStore: list_current, conditional_update_order)
//!     → backing store (in-memory here, SQL in production)
//! ```
//!
//! # Design Decisions
//! - Optimistic concurrency: a version counter per row, checked at write time
//! - The store trait is the only persistence seam; writes are parameterized
//!   compare-and-swap calls, never assembled query text

pub mod coordinator;
pub mod store;

pub use coordinator::{
    Accepted, AppliedOrder, OrderingCoordinator, ReorderError, ReorderItem, MAX_REORDER_BATCH,
};
pub use store::{InMemoryOrderStore, OrderStore, OrderableEntity, StoreError};
