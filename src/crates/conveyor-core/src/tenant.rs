//! Tenant resolution
//!
//! Every execution runs under exactly one tenant. The tenant gate (the
//! outermost middleware stage) verifies that the tenant on the incoming
//! event matches the tenant owning the work item, resolved through a
//! [`TenantResolver`]. A mismatch is a hard fault, never a retryable one.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maps work items to the tenant that owns them
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Tenant owning the given work item
    async fn owner_of(&self, work_item_id: &str) -> Result<String>;
}

/// Resolver backed by an in-memory ownership map
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    owners: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticTenantResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a work item under a tenant
    pub async fn assign(&self, work_item_id: impl Into<String>, tenant_id: impl Into<String>) {
        self.owners
            .write()
            .await
            .insert(work_item_id.into(), tenant_id.into());
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn owner_of(&self, work_item_id: &str) -> Result<String> {
        self.owners
            .read()
            .await
            .get(work_item_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkItemNotFound(work_item_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_registered_owner() {
        let resolver = StaticTenantResolver::new();
        resolver.assign("wi-1", "tenant-a").await;
        assert_eq!(resolver.owner_of("wi-1").await.unwrap(), "tenant-a");
    }

    #[tokio::test]
    async fn unknown_work_item_is_an_error() {
        let resolver = StaticTenantResolver::new();
        let err = resolver.owner_of("wi-missing").await.unwrap_err();
        assert!(matches!(err, EngineError::WorkItemNotFound(_)));
    }
}
