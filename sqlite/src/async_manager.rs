//! Async facade over [`DataVersionManager`].
//!
//! Every operation runs the same synchronous logic on tokio's blocking
//! thread pool, so the caller's task suspends only while the database is
//! being touched. Operations on one manager are serialized by its mutex.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use schema_tick_core::{SchemaCatalog, Version, VersioningMode};
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::manager::DataVersionManager;
use crate::plan::{EntityChangePlan, VersionChangePlan};
use crate::strategy::{PendingPlans, UpgradeReport};

/// Cloneable async handle to a [`DataVersionManager`].
#[derive(Debug, Clone)]
pub struct AsyncDataVersionManager {
    inner: Arc<Mutex<DataVersionManager>>,
}

impl AsyncDataVersionManager {
    pub fn new(manager: DataVersionManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Opens a database file off the async runtime.
    pub async fn open(path: impl Into<PathBuf>, catalog: SchemaCatalog) -> Result<Self> {
        let path = path.into();
        let manager = tokio::task::spawn_blocking(move || DataVersionManager::open(path, catalog))
            .await
            .map_err(|e| SqliteError::TaskFailed(e.to_string()))??;
        Ok(Self::new(manager))
    }

    /// Runs `op` against the manager on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DataVersionManager) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut manager = inner.lock();
            op(&mut manager)
        })
        .await
        .map_err(|e| SqliteError::TaskFailed(e.to_string()))?
    }

    pub async fn set_mode(&self, mode: VersioningMode) -> Result<()> {
        self.run(move |m| m.set_mode(mode)).await
    }

    pub async fn register_entity_plan(&self, plan: EntityChangePlan) -> Result<()> {
        self.run(move |m| m.register_entity_plan(plan)).await
    }

    pub async fn register_version_plan(&self, plan: VersionChangePlan) -> Result<()> {
        self.run(move |m| m.register_version_plan(plan)).await
    }

    pub async fn pending_plans(&self) -> Result<PendingPlans> {
        self.run(|m| m.pending_plans()).await
    }

    pub async fn upgrade_to_target_version(&self) -> Result<UpgradeReport> {
        debug!("scheduling upgrade on blocking pool");
        self.run(|m| m.upgrade_to_target_version()).await
    }

    pub async fn downgrade(&self, version: Version) -> Result<usize> {
        self.run(move |m| m.downgrade(&version)).await
    }

    pub async fn tables(&self) -> Result<Vec<String>> {
        self.run(|m| m.tables()).await
    }

    /// Unwraps the manager if this is the last handle.
    pub fn try_into_inner(self) -> std::result::Result<DataVersionManager, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Database;
    use schema_tick_core::{ColumnDescriptor, EntityBuilder, VersionChain};

    fn catalog() -> SchemaCatalog {
        let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
        let mut catalog = SchemaCatalog::new(chain);
        catalog
            .register(
                EntityBuilder::new("Origin")
                    .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
                    .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
            )
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_async_upgrade_matches_sync_behavior() {
        let catalog = catalog();
        let root = catalog.chain().root().clone();
        let v1 = catalog.version("Version_1").unwrap().clone();
        let manager = AsyncDataVersionManager::new(DataVersionManager::new(
            Database::open_in_memory().unwrap(),
            catalog,
        ));
        manager
            .register_entity_plan(EntityChangePlan::builder("Origin", root.clone()).create_on_upgrade().build())
            .await
            .unwrap();
        manager
            .register_entity_plan(EntityChangePlan::builder("Origin", v1).migrate_from(root).build())
            .await
            .unwrap();

        assert_eq!(manager.pending_plans().await.unwrap().pending.len(), 2);
        let report = manager.upgrade_to_target_version().await.unwrap();
        assert_eq!(report.executed.len(), 2);
        assert!(manager.pending_plans().await.unwrap().is_empty());
        assert_eq!(manager.tables().await.unwrap(), vec!["Origin", "Origin_1"]);

        let manager = manager.try_into_inner().unwrap();
        assert!(manager.modified_count() > 0);
    }

    #[tokio::test]
    async fn test_errors_propagate_through_the_facade() {
        let manager = AsyncDataVersionManager::new(DataVersionManager::new(
            Database::open_in_memory().unwrap(),
            catalog(),
        ));
        let err = manager
            .downgrade(Version::root("VersionOrigin"))
            .await
            .unwrap_err();
        assert!(matches!(err, SqliteError::PlanNotFound(_)));
    }
}
