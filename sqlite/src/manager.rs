//! The data version manager.
//!
//! [`DataVersionManager`] is the facade applications talk to. It owns the
//! connection, the schema catalog, the versioning mode and the active
//! strategy, and forwards registration, lookup and execution to the
//! strategy.
//!
//! Changing the mode re-derives the strategy and discards every plan
//! registered so far. Choose the mode before registering.
//!
//! The "which version does entity X use when nothing else is said" answer
//! lives in a caller-owned [`VersionContext`] instead of process-wide
//! state; [`DataVersionManager::set_default`] publishes into one.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::Connection;
use schema_tick_core::{
    CatalogError, PlanStep, SchemaCatalog, SchemaConfig, TableNaming, Version, VersioningKind,
    VersioningMode,
};
use tracing::{debug, info, warn};

use crate::context::PlanEnv;
use crate::error::{Result, SqliteError};
use crate::events::{EventBus, VersionEvent};
use crate::layout::ColumnOverrides;
use crate::plan::{EntityChangePlan, EntityKey, VerifyPolicy, VersionChangePlan};
use crate::retry::RetryPolicy;
use crate::sql;
use crate::strategy::{PendingPlans, UpgradeReport, VersioningStrategy};
use crate::tracker::{Database, TrackedConnection};

/// Default versions per entity, passed explicitly to whatever needs them.
///
/// Also carries the column-order overrides recorded while creating
/// tables, so readers and writers built from the context honor them.
#[derive(Debug, Clone, Default)]
pub struct VersionContext {
    defaults: HashMap<String, Version>,
    overrides: ColumnOverrides,
}

impl VersionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default version for `entity`.
    pub fn set(&mut self, entity: impl Into<String>, version: Version) {
        self.defaults.insert(entity.into(), version);
    }

    pub fn get(&self, entity: &str) -> Option<&Version> {
        self.defaults.get(entity)
    }

    /// The version `entity` resolves to: this context's default, else the
    /// catalog's declared default, else the chain's latest version.
    pub fn resolve(&self, catalog: &SchemaCatalog, entity: &str) -> Result<Version> {
        match self.defaults.get(entity) {
            Some(version) => Ok(version.clone()),
            None => Ok(catalog.default_version(entity)?),
        }
    }

    pub fn overrides(&self) -> &ColumnOverrides {
        &self.overrides
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    pub fn clear(&mut self) {
        self.defaults.clear();
    }
}

/// Registers change plans and brings a database up to date.
///
/// # Examples
///
/// ```
/// use schema_tick_core::*;
/// use schema_tick_sqlite::{DataVersionManager, Database, EntityChangePlan};
///
/// let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
/// let mut catalog = SchemaCatalog::new(chain);
/// catalog
///     .register(
///         EntityBuilder::new("Origin")
///             .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
///             .column(ColumnDescriptor::new("Item1", "TEXT"))
///             .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
///     )
///     .unwrap();
/// let root = catalog.chain().root().clone();
/// let v1 = catalog.version("Version_1").unwrap().clone();
///
/// let mut manager = DataVersionManager::new(Database::open_in_memory().unwrap(), catalog);
/// manager
///     .register_entity_plan(EntityChangePlan::builder("Origin", root.clone()).create_on_upgrade().build())
///     .unwrap();
/// manager
///     .register_entity_plan(EntityChangePlan::builder("Origin", v1).migrate_from(root).build())
///     .unwrap();
///
/// let report = manager.upgrade_to_target_version().unwrap();
/// assert_eq!(report.executed, vec!["VersionOrigin", "Version_1"]);
/// assert_eq!(manager.tables().unwrap(), vec!["Origin", "Origin_1"]);
///
/// // Nothing left to do the second time.
/// assert_eq!(manager.upgrade_to_target_version().unwrap().modified, 0);
/// ```
#[derive(Debug)]
pub struct DataVersionManager {
    conn: TrackedConnection,
    catalog: SchemaCatalog,
    mode: VersioningMode,
    naming: TableNaming,
    strategy: VersioningStrategy,
    retry: RetryPolicy,
    overrides: ColumnOverrides,
    events: EventBus,
}

impl DataVersionManager {
    /// Creates a manager in by-tick mode.
    pub fn new(conn: TrackedConnection, catalog: SchemaCatalog) -> Self {
        Self {
            conn,
            catalog,
            mode: VersioningMode::BY_TICK,
            naming: TableNaming::Ticked,
            strategy: VersioningStrategy::for_kind(VersioningKind::ByTick),
            retry: RetryPolicy::default(),
            overrides: ColumnOverrides::new(),
            events: EventBus::new(),
        }
    }

    /// Opens a database file and creates a manager over it.
    pub fn open(path: impl AsRef<Path>, catalog: SchemaCatalog) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, catalog))
    }

    /// Builds a manager from a schema file: catalog, mode, retry timeout and
    /// plans.
    pub fn from_config(conn: TrackedConnection, config: &SchemaConfig) -> Result<Self> {
        let catalog = config.build_catalog()?;
        let mut manager = Self::new(conn, catalog).with_retry(RetryPolicy::new(config.retry_timeout()));
        manager.set_mode(config.mode)?;
        manager.register_from_config(config)?;
        Ok(manager)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn mode(&self) -> VersioningMode {
        self.mode
    }

    /// Table naming derived from the mode's kind.
    pub fn naming(&self) -> TableNaming {
        self.naming
    }

    pub fn strategy(&self) -> &VersioningStrategy {
        &self.strategy
    }

    pub fn overrides(&self) -> &ColumnOverrides {
        &self.overrides
    }

    /// Switches the versioning mode.
    ///
    /// Always installs a fresh strategy for the mode's kind, so plans
    /// registered before the call are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidMode`] (wrapped) if the mode sets more
    /// than one kind bit. The current mode is kept in that case.
    pub fn set_mode(&mut self, mode: VersioningMode) -> Result<()> {
        let kind = mode.kind()?;
        let discarded = self.strategy.plan_count();
        if discarded > 0 {
            warn!(discarded, ?mode, "mode switch discards registered plans");
        }
        self.strategy = VersioningStrategy::for_kind(kind);
        self.naming = kind.naming();
        self.mode = mode;
        debug!(?mode, strategy = self.strategy.name(), "versioning mode set");
        Ok(())
    }

    /// Registers an entity-scoped plan.
    ///
    /// Version-keyed strategies file it under the composite plan for its
    /// version, creating that composite on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DuplicatePlan`] if the (entity, version) key
    /// is already registered.
    pub fn register_entity_plan(&mut self, plan: EntityChangePlan) -> Result<()> {
        self.catalog.entity(plan.entity())?;
        debug!(plan = %plan.key(), "registering entity plan");
        self.strategy.register_entity_plan(plan)
    }

    /// Registers a version-scoped plan.
    pub fn register_version_plan(&mut self, plan: VersionChangePlan) -> Result<()> {
        for member in plan.plans() {
            self.catalog.entity(member.entity())?;
        }
        debug!(version = %plan.version(), members = plan.len(), "registering version plan");
        self.strategy.register_version_plan(plan)
    }

    /// Adds an entity plan to the already registered composite for
    /// `version`.
    pub fn add_version_change_plan(&mut self, version: &Version, plan: EntityChangePlan) -> Result<()> {
        self.catalog.entity(plan.entity())?;
        match &mut self.strategy {
            VersioningStrategy::ByTick(s) | VersioningStrategy::ByAlterTable(s) => {
                s.get_plan_mut(version)?.add_entity_plan(plan)
            }
            other => Err(other.unsupported("add_version_change_plan")),
        }
    }

    /// Removes `entity`'s plan from the composite registered for `version`.
    pub fn remove_version_change_plan(&mut self, version: &Version, entity: &str) -> Result<EntityChangePlan> {
        match &mut self.strategy {
            VersioningStrategy::ByTick(s) | VersioningStrategy::ByAlterTable(s) => s
                .get_plan_mut(version)?
                .remove_entity_plan(entity)
                .ok_or_else(|| SqliteError::PlanNotFound(EntityKey::new(entity, version.clone()).to_string())),
            other => Err(other.unsupported("remove_version_change_plan")),
        }
    }

    /// Removes the composite plan registered for `version`.
    pub fn unregister_version_plan(&mut self, version: &Version) -> Result<VersionChangePlan> {
        match &mut self.strategy {
            VersioningStrategy::ByTick(s) | VersioningStrategy::ByAlterTable(s) => s
                .unregister(version)
                .ok_or_else(|| SqliteError::PlanNotFound(version.to_string())),
            other => Err(other.unsupported("unregister_version_plan")),
        }
    }

    /// Removes an entity plan registered under the by-table strategy.
    pub fn unregister_entity_plan(&mut self, key: &EntityKey) -> Result<EntityChangePlan> {
        match &mut self.strategy {
            VersioningStrategy::ByTable(s) => s
                .unregister(key)
                .ok_or_else(|| SqliteError::PlanNotFound(key.to_string())),
            other => Err(other.unsupported("unregister_entity_plan")),
        }
    }

    /// Looks up the composite plan for `version`.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::PlanNotFound`] if nothing is registered for it.
    /// - [`SqliteError::Unsupported`] under the by-table strategy.
    pub fn get_version_plan(&self, version: &Version) -> Result<&VersionChangePlan> {
        match &self.strategy {
            VersioningStrategy::ByTick(s) | VersioningStrategy::ByAlterTable(s) => s.get_plan(version),
            other => Err(other.unsupported("get_version_plan")),
        }
    }

    /// Looks up an entity plan under the by-table strategy.
    pub fn get_entity_plan(&self, key: &EntityKey) -> Result<&EntityChangePlan> {
        match &self.strategy {
            VersioningStrategy::ByTable(s) => s.get_plan(key),
            other => Err(other.unsupported("get_entity_plan")),
        }
    }

    /// Adds an event listener.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&VersionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener);
    }

    fn env<'a>(&'a self, conn: &'a Connection) -> PlanEnv<'a> {
        PlanEnv::new(conn, &self.catalog)
            .with_naming(self.naming)
            .with_mode(self.mode)
            .with_retry(self.retry)
            .with_overrides(self.overrides.clone())
    }

    /// Resolves the plans that would run, without running them.
    pub fn pending_plans(&self) -> Result<PendingPlans> {
        self.strategy.pending(&self.env(&self.conn))
    }

    /// Runs every forward-pending plan against the managed connection.
    ///
    /// Idempotent: once a version's table exists its plan never runs
    /// again, so a second call with no new registrations does nothing.
    pub fn upgrade_to_target_version(&mut self) -> Result<UpgradeReport> {
        let mut strategy = std::mem::replace(&mut self.strategy, VersioningStrategy::NotSupported);
        let result = strategy.upgrade(&self.env(&self.conn), &self.events);
        self.strategy = strategy;
        result
    }

    /// Runs every forward-pending plan against a caller-supplied
    /// connection, such as an open transaction.
    pub fn upgrade_with(&mut self, conn: &Connection) -> Result<UpgradeReport> {
        let mut strategy = std::mem::replace(&mut self.strategy, VersioningStrategy::NotSupported);
        let result = strategy.upgrade(&self.env(conn), &self.events);
        self.strategy = strategy;
        result
    }

    /// Runs the downgrade hooks of every plan registered at `version`.
    pub fn downgrade(&mut self, version: &Version) -> Result<usize> {
        let mut strategy = std::mem::replace(&mut self.strategy, VersioningStrategy::NotSupported);
        let result = strategy.downgrade(version, &self.env(&self.conn), &self.events);
        self.strategy = strategy;
        let modified = result?;
        info!(%version, modified, "downgrade finished");
        Ok(modified)
    }

    /// Publishes, per entity, the latest version this manager has a plan
    /// for, together with the recorded column-order overrides.
    pub fn set_default(&self, ctx: &mut VersionContext) {
        let mut latest: HashMap<String, Version> = HashMap::new();
        for key in self.strategy.entity_keys() {
            let newer = latest
                .get(&key.entity)
                .is_none_or(|current| key.version > *current);
            if newer {
                latest.insert(key.entity, key.version);
            }
        }
        for (entity, version) in latest {
            ctx.set(entity, version);
        }
        ctx.overrides = self.overrides.clone();
    }

    /// Registers the plans a schema file describes. Returns how many were
    /// registered.
    ///
    /// `migrate` steps become in-place rebuilds when the mode keeps one
    /// table name for every version. Steps other than `adjust` also drop
    /// their table on downgrade.
    pub fn register_from_config(&mut self, config: &SchemaConfig) -> Result<usize> {
        for step in &config.plans {
            let version = self.catalog.version(&step.version)?.clone();
            let from = match &step.from {
                Some(name) => Some(self.catalog.version(name)?.clone()),
                None => self.predecessor(&version),
            };
            let source = || {
                from.clone().ok_or_else(|| {
                    SqliteError::from(CatalogError::UnknownVersion(format!(
                        "predecessor of {version}"
                    )))
                })
            };

            let mut builder = EntityChangePlan::builder(&step.entity, version.clone());
            builder = match (step.step, self.naming) {
                (PlanStep::Create, _) => builder.create_on_upgrade().drop_on_downgrade(),
                (PlanStep::Migrate, TableNaming::Ticked) => {
                    builder.migrate_from(source()?).drop_on_downgrade()
                }
                (PlanStep::Migrate, TableNaming::Plain) | (PlanStep::Adjust, _) => {
                    builder.adjust_from(source()?)
                }
            };
            if step.verify {
                builder = builder.verify(VerifyPolicy::TableExists);
            }
            if let Some(mode) = step.mode {
                builder = builder.mode(mode);
            }
            self.register_entity_plan(builder.build())?;
        }
        info!(plans = config.plans.len(), "registered plans from configuration");
        Ok(config.plans.len())
    }

    fn predecessor(&self, version: &Version) -> Option<Version> {
        let tick = version.tick().checked_sub(1)?;
        self.catalog.chain().iter().find(|v| v.tick() == tick).cloned()
    }

    /// Names of the user tables currently in the database.
    pub fn tables(&self) -> Result<Vec<String>> {
        sql::list_tables(&self.conn)
    }

    /// Entity plans registered with the active strategy.
    pub fn plan_count(&self) -> usize {
        self.strategy.plan_count()
    }

    /// Modifications made by upgrades and downgrades since the last reset.
    pub fn modified_count(&self) -> usize {
        self.strategy.modified_count()
    }

    /// Clears every registered plan and the modification counter.
    pub fn reset(&mut self) {
        self.strategy.reset();
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn tracked_connection(&self) -> &TrackedConnection {
        &self.conn
    }

    /// Consumes the manager, returning the connection.
    pub fn into_connection(self) -> TrackedConnection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_tick_core::{ColumnDescriptor, EntityBuilder, VersionChain};

    fn catalog() -> SchemaCatalog {
        let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
        let mut catalog = SchemaCatalog::new(chain);
        catalog
            .register(
                EntityBuilder::new("Origin")
                    .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
                    .column(ColumnDescriptor::new("Item1", "TEXT"))
                    .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
            )
            .unwrap();
        catalog
    }

    fn manager() -> DataVersionManager {
        DataVersionManager::new(Database::open_in_memory().unwrap(), catalog())
    }

    #[test]
    fn test_mode_switch_discards_plans() {
        let mut manager = manager();
        let root = manager.catalog().chain().root().clone();
        manager
            .register_entity_plan(EntityChangePlan::builder("Origin", root).create_on_upgrade().build())
            .unwrap();
        assert_eq!(manager.plan_count(), 1);
        manager
            .set_mode(VersioningMode::BY_TICK | VersioningMode::DROP_TABLE_CASTED_OFF)
            .unwrap();
        assert_eq!(manager.plan_count(), 0);
    }

    #[test]
    fn test_invalid_mode_keeps_current_strategy() {
        let mut manager = manager();
        let err = manager
            .set_mode(VersioningMode::BY_TICK | VersioningMode::BY_TABLE)
            .unwrap_err();
        assert!(matches!(err, SqliteError::CatalogError(CatalogError::InvalidMode(_))));
        assert_eq!(manager.strategy().name(), "by-tick");
    }

    #[test]
    fn test_zero_kind_bits_select_not_supported() {
        let mut manager = manager();
        manager.set_mode(VersioningMode::DROP_TABLE_CASTED_OFF).unwrap();
        assert_eq!(manager.strategy().name(), "not-supported");
        assert!(matches!(
            manager.upgrade_to_target_version(),
            Err(SqliteError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_unknown_entity_rejected_at_registration() {
        let mut manager = manager();
        let root = manager.catalog().chain().root().clone();
        let err = manager
            .register_entity_plan(EntityChangePlan::builder("Missing", root).build())
            .unwrap_err();
        assert!(matches!(err, SqliteError::CatalogError(CatalogError::UnknownEntity(_))));
    }

    #[test]
    fn test_entity_lookup_unsupported_under_by_tick() {
        let manager = manager();
        let root = manager.catalog().chain().root().clone();
        assert!(matches!(
            manager.get_entity_plan(&EntityKey::new("Origin", root)),
            Err(SqliteError::Unsupported { strategy: "by-tick", .. })
        ));
    }

    #[test]
    fn test_set_default_publishes_latest_version() {
        let mut manager = manager();
        let root = manager.catalog().chain().root().clone();
        let v1 = manager.catalog().version("Version_1").unwrap().clone();
        manager
            .register_entity_plan(EntityChangePlan::builder("Origin", v1.clone()).migrate_from(root.clone()).build())
            .unwrap();
        manager
            .register_entity_plan(EntityChangePlan::builder("Origin", root).create_on_upgrade().build())
            .unwrap();

        let mut ctx = VersionContext::new();
        manager.set_default(&mut ctx);
        assert_eq!(ctx.get("Origin"), Some(&v1));
        assert_eq!(ctx.resolve(manager.catalog(), "Origin").unwrap(), v1);
    }

    #[test]
    fn test_context_falls_back_to_catalog_default() {
        let catalog = catalog();
        let ctx = VersionContext::new();
        assert_eq!(ctx.resolve(&catalog, "Origin").unwrap().name(), "Version_1");
        assert!(ctx.resolve(&catalog, "Missing").is_err());
    }

    #[test]
    fn test_remove_version_change_plan() {
        let mut manager = manager();
        let root = manager.catalog().chain().root().clone();
        manager
            .register_version_plan(VersionChangePlan::new(root.clone()))
            .unwrap();
        manager
            .add_version_change_plan(&root, EntityChangePlan::builder("Origin", root.clone()).create_on_upgrade().build())
            .unwrap();
        assert_eq!(manager.get_version_plan(&root).unwrap().len(), 1);
        manager.remove_version_change_plan(&root, "Origin").unwrap();
        assert!(matches!(
            manager.remove_version_change_plan(&root, "Origin"),
            Err(SqliteError::PlanNotFound(_))
        ));
        assert!(manager.unregister_version_plan(&root).is_ok());
        assert!(manager.get_version_plan(&root).is_err());
    }
}
