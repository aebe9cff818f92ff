//! Batched display-order changes under optimistic concurrency.
//!
//! # Flow
//! ```text
//! reorder(owner, items)
//!     → schema checks on the whole batch (size, ids, orders, duplicates)
//!     → owner-scoped snapshot via list_current
//!     → every id present in the snapshot, every expected version current
//!     → one conditional write per item (id + owner + version predicate)
//!     → Accepted, or Conflict telling the caller to refetch
//! ```
//!
//! # Design Decisions
//! - Ownership is part of every read and write predicate, never a separate pass
//! - Each write is a single compare-and-swap in the store
//! - The batch is not a transaction: a write conflict mid-batch leaves earlier
//!   items applied, and the conflict reports how many were
//! - Pre-write snapshot checks catch foreign ids and stale versions before the
//!   first write, so the partial case needs a concurrent writer

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;
use crate::ordering::store::{OrderStore, StoreError};

pub const MAX_REORDER_BATCH: usize = 1000;

/// One requested position change, as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: i64,
    #[serde(alias = "order")]
    pub desired_order: i64,
    /// Version the client last saw. Defaults to the coordinator's snapshot.
    #[serde(default)]
    pub expected_version: Option<u32>,
}

/// A row whose new position was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedOrder {
    pub id: u64,
    pub display_order: i32,
    pub version: u32,
}

/// Every item in the batch was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub updated: Vec<AppliedOrder>,
}

#[derive(Debug, Error)]
pub enum ReorderError {
    /// The batch is structurally invalid; nothing was written.
    #[error("Invalid reorder batch: {0}")]
    Validation(String),

    /// A row was missing, foreign or stale. The caller should refetch and retry.
    #[error("Reorder conflict on item {id}; {applied} earlier item(s) were applied")]
    Conflict { id: u64, applied: usize },

    /// The store failed; the item in flight was not written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct ValidItem {
    id: u64,
    order: i32,
    expected_version: Option<u32>,
}

pub struct OrderingCoordinator {
    store: Arc<dyn OrderStore>,
}

impl OrderingCoordinator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn reorder(
        &self,
        owner_id: &str,
        items: &[ReorderItem],
    ) -> Result<Accepted, ReorderError> {
        let items = validate_batch(items)?;

        let snapshot: HashMap<u64, u32> = self
            .store
            .list_current(owner_id)
            .await?
            .into_iter()
            .map(|row| (row.id, row.version))
            .collect();

        let mut planned = Vec::with_capacity(items.len());
        for item in &items {
            let Some(&current) = snapshot.get(&item.id) else {
                return Err(self.conflict(owner_id, item.id, 0));
            };
            let expected = item.expected_version.unwrap_or(current);
            if expected != current {
                return Err(self.conflict(owner_id, item.id, 0));
            }
            planned.push((item, expected));
        }

        let mut updated = Vec::with_capacity(planned.len());
        for (item, expected) in planned {
            let affected = self
                .store
                .conditional_update_order(item.id, owner_id, item.order, expected)
                .await?;
            if affected == 0 {
                return Err(self.conflict(owner_id, item.id, updated.len()));
            }
            updated.push(AppliedOrder {
                id: item.id,
                display_order: item.order,
                version: expected + 1,
            });
        }

        tracing::info!(owner = %owner_id, items = updated.len(), "Reorder applied");
        Ok(Accepted { updated })
    }

    fn conflict(&self, owner_id: &str, id: u64, applied: usize) -> ReorderError {
        tracing::warn!(owner = %owner_id, id, applied, "Reorder conflict");
        metrics::record_reorder_conflict();
        ReorderError::Conflict { id, applied }
    }
}

fn validate_batch(items: &[ReorderItem]) -> Result<Vec<ValidItem>, ReorderError> {
    if items.len() > MAX_REORDER_BATCH {
        return Err(ReorderError::Validation(format!(
            "at most {} items per batch",
            MAX_REORDER_BATCH
        )));
    }

    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let id = u64::try_from(item.id)
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| {
                    ReorderError::Validation(format!("item {}: id must be a positive integer", index))
                })?;
            let order = i32::try_from(item.desired_order)
                .ok()
                .filter(|order| *order >= 0)
                .ok_or_else(|| {
                    ReorderError::Validation(format!(
                        "item {}: order must be a non-negative integer",
                        index
                    ))
                })?;
            if !seen.insert(id) {
                return Err(ReorderError::Validation(format!(
                    "item {}: id {} appears more than once",
                    index, id
                )));
            }
            Ok(ValidItem {
                id,
                order,
                expected_version: item.expected_version,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::store::{InMemoryOrderStore, OrderableEntity};

    fn row(id: u64, owner: &str, order: i32, version: u32) -> OrderableEntity {
        OrderableEntity {
            id,
            owner_id: owner.to_string(),
            display_order: order,
            version,
        }
    }

    fn item(id: i64, order: i64, expected_version: Option<u32>) -> ReorderItem {
        ReorderItem {
            id,
            desired_order: order,
            expected_version,
        }
    }

    fn setup() -> (Arc<InMemoryOrderStore>, OrderingCoordinator) {
        let store: Arc<InMemoryOrderStore> = Arc::new(
            [row(1, "alice", 0, 0), row(2, "alice", 1, 3), row(5, "bob", 0, 0)]
                .into_iter()
                .collect(),
        );
        let coordinator = OrderingCoordinator::new(store.clone());
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_matching_version_is_applied() {
        let (store, coordinator) = setup();
        let accepted = coordinator
            .reorder("alice", &[item(2, 0, Some(3)), item(1, 1, None)])
            .await
            .unwrap();

        assert_eq!(
            accepted.updated,
            vec![
                AppliedOrder { id: 2, display_order: 0, version: 4 },
                AppliedOrder { id: 1, display_order: 1, version: 1 },
            ]
        );
        assert_eq!(store.get(2).unwrap(), row(2, "alice", 0, 4));
        assert_eq!(store.get(1).unwrap(), row(1, "alice", 1, 1));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (store, coordinator) = setup();
        let err = coordinator
            .reorder("alice", &[item(2, 9, Some(2))])
            .await
            .unwrap_err();
        assert!(matches!(err, ReorderError::Conflict { id: 2, applied: 0 }));
        assert_eq!(store.get(2).unwrap(), row(2, "alice", 1, 3));
    }

    #[tokio::test]
    async fn test_foreign_row_rejects_whole_batch() {
        let (store, coordinator) = setup();
        let err = coordinator
            .reorder("alice", &[item(1, 4, None), item(5, 0, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReorderError::Conflict { id: 5, applied: 0 }));
        assert_eq!(store.get(5).unwrap(), row(5, "bob", 0, 0));
        assert_eq!(store.get(1).unwrap(), row(1, "alice", 0, 0));
    }

    #[tokio::test]
    async fn test_schema_violations_write_nothing() {
        let (store, coordinator) = setup();
        for batch in [
            vec![item(1, 1, None), item(0, 1, None)],
            vec![item(1, 1, None), item(-3, 1, None)],
            vec![item(1, -1, None)],
            vec![item(1, i64::from(i32::MAX) + 1, None)],
            vec![item(1, 1, None), item(1, 2, None)],
        ] {
            let err = coordinator.reorder("alice", &batch).await.unwrap_err();
            assert!(matches!(err, ReorderError::Validation(_)), "{:?}", batch);
        }
        assert_eq!(store.get(1).unwrap(), row(1, "alice", 0, 0));
    }

    #[tokio::test]
    async fn test_batch_size_limit() {
        let (_, coordinator) = setup();
        let batch: Vec<_> = (1..=1001).map(|i| item(i, 0, None)).collect();
        let err = coordinator.reorder("alice", &batch).await.unwrap_err();
        assert!(matches!(err, ReorderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_accepted() {
        let (_, coordinator) = setup();
        let accepted = coordinator.reorder("alice", &[]).await.unwrap();
        assert!(accepted.updated.is_empty());
    }

    /// Store that lets a competing writer bump a row between snapshot and write.
    struct RacingStore {
        inner: InMemoryOrderStore,
        victim: u64,
    }

    #[async_trait::async_trait]
    impl OrderStore for RacingStore {
        async fn list_current(&self, owner_id: &str) -> Result<Vec<OrderableEntity>, StoreError> {
            let rows = self.inner.list_current(owner_id).await?;
            if let Some(victim) = self.inner.get(self.victim) {
                self.inner
                    .conditional_update_order(victim.id, &victim.owner_id, 99, victim.version)
                    .await?;
            }
            Ok(rows)
        }

        async fn conditional_update_order(
            &self,
            id: u64,
            owner_id: &str,
            new_order: i32,
            expected_version: u32,
        ) -> Result<u64, StoreError> {
            self.inner
                .conditional_update_order(id, owner_id, new_order, expected_version)
                .await
        }
    }

    #[tokio::test]
    async fn test_mid_batch_conflict_reports_applied_items() {
        let store = Arc::new(RacingStore {
            inner: [row(1, "alice", 0, 0), row(2, "alice", 1, 0)].into_iter().collect(),
            victim: 2,
        });
        let coordinator = OrderingCoordinator::new(store.clone());

        let err = coordinator
            .reorder("alice", &[item(1, 1, None), item(2, 0, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReorderError::Conflict { id: 2, applied: 1 }));
        assert_eq!(store.inner.get(1).unwrap(), row(1, "alice", 1, 1));
        assert_eq!(store.inner.get(2).unwrap(), row(2, "alice", 99, 1));
    }
}
