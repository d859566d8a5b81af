//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointStore`] is the reference implementation of
//! [`CheckpointStore`]: a thread-safe map from (work item, graph) key to the
//! ordered list of checkpoints for that run. All data is lost on restart,
//! which makes it suitable for tests, development, and hosts that keep a
//! separate durable store.
//!
//! Per-key entries are append-only; "latest" is the last element and the
//! sequence number is the element index at append time. The write lock is
//! held across the append-then-demote pair in `save`, so the single-active
//! invariant holds even under concurrent saves to the same key.

use crate::{
    checkpoint::{Checkpoint, CheckpointKey, CheckpointStatus},
    error::{CheckpointError, Result},
    store::CheckpointStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Storage = Arc<RwLock<HashMap<CheckpointKey, Vec<Checkpoint>>>>;

/// Thread-safe in-memory checkpoint store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Storage,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (work item, graph) keys being tracked
    pub async fn key_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all keys
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Drop everything (useful between tests)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        tenant_id: &str,
        work_item_id: &str,
        graph_id: &str,
        agent_name: Option<&str>,
        blackboard: String,
    ) -> Result<Checkpoint> {
        if tenant_id.is_empty() || work_item_id.is_empty() || graph_id.is_empty() {
            return Err(CheckpointError::Invalid(
                "tenant_id, work_item_id and graph_id are required".to_string(),
            ));
        }

        let key = CheckpointKey::new(work_item_id, graph_id);
        let mut storage = self.storage.write().await;
        let entries = storage.entry(key).or_default();

        let sequence = entries.len() as u64;
        let mut checkpoint = Checkpoint::new(tenant_id, work_item_id, graph_id, blackboard, sequence);
        if let Some(name) = agent_name {
            checkpoint = checkpoint.with_agent_name(name);
        }

        // Append first, then demote the previous active entry. The new row
        // is in place before any existing row changes.
        entries.push(checkpoint.clone());
        let last = entries.len() - 1;
        for entry in entries[..last].iter_mut() {
            if entry.is_active() {
                entry.mark(CheckpointStatus::Resumed);
            }
        }

        Ok(checkpoint)
    }

    async fn load_latest(&self, work_item_id: &str, graph_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        let key = CheckpointKey::new(work_item_id, graph_id);
        Ok(storage.get(&key).and_then(|entries| entries.last().cloned()))
    }

    async fn load_history(&self, work_item_id: &str, graph_id: &str) -> Result<Vec<Checkpoint>> {
        let storage = self.storage.read().await;
        let key = CheckpointKey::new(work_item_id, graph_id);
        Ok(storage.get(&key).cloned().unwrap_or_default())
    }

    async fn mark_status(&self, checkpoint_id: &str, status: CheckpointStatus) -> Result<()> {
        let mut storage = self.storage.write().await;
        for entries in storage.values_mut() {
            if let Some(entry) = entries
                .iter_mut()
                .find(|e| e.checkpoint_id == checkpoint_id)
            {
                entry.mark(status);
                return Ok(());
            }
        }
        Err(CheckpointError::NotFound(checkpoint_id.to_string()))
    }

    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut storage = self.storage.write().await;
        let mut expired = 0;
        for entries in storage.values_mut() {
            for entry in entries.iter_mut() {
                if !entry.is_active()
                    && entry.status != CheckpointStatus::Expired
                    && entry.created_at < cutoff
                {
                    entry.mark(CheckpointStatus::Expired);
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    async fn delete_work_item(&self, work_item_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.retain(|key, _| key.work_item_id != work_item_id);
        Ok(())
    }
}
