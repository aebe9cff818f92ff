//! Persistence boundary for orderable rows.
//!
//! The coordinator only needs two calls: an owner-scoped listing and a
//! conditional update that is a single compare-and-swap on
//! `(id, owner_id, version)`. A SQL-backed store implements the latter as
//!
//! ```text
//! UPDATE items SET display_order = ?, version = version + 1
//!  WHERE id = ? AND owner_id = ? AND version = ?
//! ```
//!
//! and returns the affected-row count.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A row whose display position can be changed by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderableEntity {
    pub id: u64,
    pub owner_id: String,
    pub display_order: i32,
    pub version: u32,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store could not be reached or failed the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The row's version counter cannot be incremented further.
    #[error("Version counter exhausted for row {0}")]
    VersionExhausted(u64),
}

/// Owner-scoped persistence operations for ordering.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Every row owned by `owner_id`.
    async fn list_current(&self, owner_id: &str) -> Result<Vec<OrderableEntity>, StoreError>;

    /// Set `display_order` and bump `version` by one, only if the row matches
    /// `id`, `owner_id` and `expected_version`. Returns rows affected (0 or 1).
    async fn conditional_update_order(
        &self,
        id: u64,
        owner_id: &str,
        new_order: i32,
        expected_version: u32,
    ) -> Result<u64, StoreError>;
}

/// In-process store. Each conditional update holds the row's shard lock for
/// the compare and the write, so there is no read/write window.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    rows: DashMap<u64, OrderableEntity>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: OrderableEntity) {
        self.rows.insert(entity.id, entity);
    }

    pub fn get(&self, id: u64) -> Option<OrderableEntity> {
        self.rows.get(&id).map(|r| r.value().clone())
    }
}

impl FromIterator<OrderableEntity> for InMemoryOrderStore {
    fn from_iter<I: IntoIterator<Item = OrderableEntity>>(iter: I) -> Self {
        let store = Self::new();
        for entity in iter {
            store.insert(entity);
        }
        store
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn list_current(&self, owner_id: &str) -> Result<Vec<OrderableEntity>, StoreError> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|r| r.value().owner_id == owner_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| (r.display_order, r.id));
        Ok(rows)
    }

    async fn conditional_update_order(
        &self,
        id: u64,
        owner_id: &str,
        new_order: i32,
        expected_version: u32,
    ) -> Result<u64, StoreError> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(0);
        };
        if row.owner_id != owner_id || row.version != expected_version {
            return Ok(0);
        }
        let next = row
            .version
            .checked_add(1)
            .ok_or(StoreError::VersionExhausted(id))?;
        row.display_order = new_order;
        row.version = next;
        Ok(1)
    }
}
