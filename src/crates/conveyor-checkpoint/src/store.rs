//! Extensible checkpoint storage trait
//!
//! [`CheckpointStore`] is the persistence boundary between the engine and
//! whatever actually holds checkpoints (a relational table in production,
//! [`InMemoryCheckpointStore`](crate::memory::InMemoryCheckpointStore) in
//! tests and single-process hosts). The store's only domain knowledge is
//! the four-part key - tenant, work item, graph, checkpoint id - plus the
//! status column; the blackboard payload is an opaque string.
//!
//! # Write discipline
//!
//! `save` must be write-new-then-mark: append the new `Active` checkpoint
//! first and only then demote the previous active one to `Resumed`. A
//! failure while appending therefore never corrupts the prior resume point.
//! Implementations never overwrite a stored blackboard in place.
//!
//! # Consistency
//!
//! Implementations must be `Send + Sync` and provide at least
//! read-your-writes consistency per (work item, graph) key. No cross-key
//! transactions are required.

use crate::{
    checkpoint::{Checkpoint, CheckpointStatus},
    error::Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage backend for execution checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a new active checkpoint and demote the previous active one.
    ///
    /// Returns the stored checkpoint with its generated id and sequence
    /// number. The previous active checkpoint for the same
    /// (work item, graph) key, if any, is marked [`CheckpointStatus::Resumed`]
    /// after the new row is durable.
    async fn save(
        &self,
        tenant_id: &str,
        work_item_id: &str,
        graph_id: &str,
        agent_name: Option<&str>,
        blackboard: String,
    ) -> Result<Checkpoint>;

    /// Latest checkpoint for the key regardless of status, or `None`.
    async fn load_latest(&self, work_item_id: &str, graph_id: &str) -> Result<Option<Checkpoint>>;

    /// The single active checkpoint for the key, or `None`.
    async fn load_active(&self, work_item_id: &str, graph_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .load_latest(work_item_id, graph_id)
            .await?
            .filter(|cp| cp.is_active()))
    }

    /// Full history for the key in ascending sequence order.
    async fn load_history(&self, work_item_id: &str, graph_id: &str) -> Result<Vec<Checkpoint>>;

    /// Change the status of a stored checkpoint.
    ///
    /// Fails with [`CheckpointError::NotFound`](crate::CheckpointError::NotFound)
    /// if the id is unknown.
    async fn mark_status(&self, checkpoint_id: &str, status: CheckpointStatus) -> Result<()>;

    /// Retention sweep: mark non-active checkpoints created before the
    /// cutoff as [`CheckpointStatus::Expired`]. Returns how many were
    /// expired.
    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Delete all checkpoints for a work item (explicit deletion, rare).
    async fn delete_work_item(&self, work_item_id: &str) -> Result<()>;
}
