//! Versioning strategies and forward-plan resolution.
//!
//! A strategy owns a registry of change plans and decides which of them
//! still have to run. The database keeps no version metadata: the current
//! state is inferred from which physical tables exist.
//!
//! Resolution is the same for every strategy, differing only in the key
//! shape and how a key is matched against a live table:
//!
//! 1. Read the database's table names, their columns and their indexes.
//! 2. A registered key *matches* when one of its plan tables exists. Under
//!    by-alter-table every version shares the table name, so every plan
//!    table must exist with exactly the version's column set and carry
//!    the version's declared indexes.
//! 3. Per chain, the highest matched version is the *baseline*. A chain
//!    with no match has no baseline.
//! 4. Every registered plan strictly after its chain's baseline is pending,
//!    in registration order.
//!
//! By-tick and by-alter-table key plans by version (one chain for the whole
//! database); by-table keys them by entity and version (one chain per
//! entity).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use rusqlite::Connection;
use schema_tick_core::{SchemaCatalog, TableDescriptor, TableNaming, Version, VersioningKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::PlanEnv;
use crate::error::{Result, SqliteError};
use crate::events::EventBus;
use crate::plan::{EntityChangePlan, EntityKey, VersionChangePlan};
use crate::sql;

/// The shape of a registry key.
pub trait PlanKey: Clone + Eq + Hash + fmt::Debug + fmt::Display {
    /// The chain this key advances; `None` for the database-wide chain.
    fn chain(&self) -> Option<&str>;
    fn version(&self) -> &Version;
}

impl PlanKey for Version {
    fn chain(&self) -> Option<&str> {
        None
    }

    fn version(&self) -> &Version {
        self
    }
}

impl PlanKey for EntityKey {
    fn chain(&self) -> Option<&str> {
        Some(&self.entity)
    }

    fn version(&self) -> &Version {
        &self.version
    }
}

/// A plan that can live in a [`PlanRegistry`].
pub trait RegisteredPlan {
    type Key: PlanKey;

    fn registry_key(&self) -> Self::Key;

    /// Tables this plan produces, used to recognize it in a live database.
    fn target_tables(&self, catalog: &SchemaCatalog, naming: TableNaming) -> Result<Vec<TableDescriptor>>;

    /// Number of entity plans this entry stands for.
    fn entity_plan_count(&self) -> usize;
}

impl RegisteredPlan for VersionChangePlan {
    type Key = Version;

    fn registry_key(&self) -> Version {
        self.version().clone()
    }

    fn target_tables(&self, catalog: &SchemaCatalog, naming: TableNaming) -> Result<Vec<TableDescriptor>> {
        self.plans()
            .iter()
            .map(|p| p.target_table(catalog, naming))
            .collect()
    }

    fn entity_plan_count(&self) -> usize {
        self.len()
    }
}

impl RegisteredPlan for EntityChangePlan {
    type Key = EntityKey;

    fn registry_key(&self) -> EntityKey {
        self.key().clone()
    }

    fn target_tables(&self, catalog: &SchemaCatalog, naming: TableNaming) -> Result<Vec<TableDescriptor>> {
        Ok(vec![self.target_table(catalog, naming)?])
    }

    fn entity_plan_count(&self) -> usize {
        1
    }
}

/// How a registered table is recognized in the live database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMatch {
    /// The table name exists.
    Name,
    /// The table name exists, holds exactly the expected columns and has
    /// every declared index. A plan matches only when all of its tables do.
    NameAndColumns,
}

/// Table names with their columns and indexes, as currently stored.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSnapshot {
    tables: HashMap<String, Vec<String>>,
    indexes: HashMap<String, Vec<String>>,
}

impl DatabaseSnapshot {
    /// Reads every user table and its columns.
    pub fn capture(conn: &Connection) -> Result<Self> {
        let mut tables = HashMap::new();
        for name in sql::list_tables(conn)? {
            let columns = sql::table_columns(conn, &name)?;
            tables.insert(name, columns);
        }
        let mut indexes: HashMap<String, Vec<String>> = HashMap::new();
        for (table, index) in sql::list_indexes(conn)? {
            indexes.entry(table).or_default().push(index);
        }
        Ok(Self { tables, indexes })
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn columns(&self, name: &str) -> Option<&[String]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    /// Names of the explicitly created indexes on `table`.
    pub fn indexes(&self, table: &str) -> &[String] {
        self.indexes.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn matches(&self, table: &TableDescriptor, matching: TableMatch) -> bool {
        let Some(live) = self.tables.get(&table.name) else {
            return false;
        };
        match matching {
            TableMatch::Name => true,
            TableMatch::NameAndColumns => {
                let indexes = self.indexes(&table.name);
                live.len() == table.columns.len()
                    && table.columns.iter().all(|c| live.contains(&c.name))
                    && table
                        .indexes
                        .iter()
                        .all(|i| indexes.contains(&i.name_for(&table.name)))
            }
        }
    }

    /// Whether the tables of one registered plan show it as applied.
    fn plan_applied(&self, tables: &[TableDescriptor], matching: TableMatch) -> bool {
        match matching {
            TableMatch::Name => tables.iter().any(|t| self.matches(t, matching)),
            TableMatch::NameAndColumns => {
                !tables.is_empty() && tables.iter().all(|t| self.matches(t, matching))
            }
        }
    }
}

/// Highest observed version of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Baseline {
    /// Entity name for per-entity chains, `None` for the database-wide chain.
    pub chain: Option<String>,
    pub version: Version,
}

/// Outcome of forward resolution without execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingPlans {
    pub baselines: Vec<Baseline>,
    /// Keys of plans that would run, in execution order.
    pub pending: Vec<String>,
}

impl PendingPlans {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of one upgrade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Keys of the plans that ran, in order.
    pub executed: Vec<String>,
    /// Modifications made during this run.
    pub modified: usize,
}

/// Plans in registration order, addressable by key.
#[derive(Debug, Clone)]
pub struct PlanRegistry<P: RegisteredPlan> {
    plans: IndexMap<P::Key, P>,
}

impl<P: RegisteredPlan> Default for PlanRegistry<P> {
    fn default() -> Self {
        Self {
            plans: IndexMap::new(),
        }
    }
}

impl<P: RegisteredPlan> PlanRegistry<P> {
    /// Adds a plan.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DuplicatePlan`] if the key is taken; the
    /// registry is left unchanged.
    pub fn register(&mut self, plan: P) -> Result<()> {
        let key = plan.registry_key();
        if self.plans.contains_key(&key) {
            return Err(SqliteError::DuplicatePlan(key.to_string()));
        }
        self.plans.insert(key, plan);
        Ok(())
    }

    /// Looks up a plan.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::PlanNotFound`] if nothing is registered
    /// under `key`.
    pub fn get(&self, key: &P::Key) -> Result<&P> {
        self.plans
            .get(key)
            .ok_or_else(|| SqliteError::PlanNotFound(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &P::Key) -> Result<&mut P> {
        self.plans
            .get_mut(key)
            .ok_or_else(|| SqliteError::PlanNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &P::Key) -> bool {
        self.plans.contains_key(key)
    }

    /// Removes a plan, keeping the order of the others.
    pub fn unregister(&mut self, key: &P::Key) -> Option<P> {
        self.plans.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.plans.clear();
    }

    /// Registered entries.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Entity plans across all entries.
    pub fn plan_count(&self) -> usize {
        self.plans.values().map(|p| p.entity_plan_count()).sum()
    }

    /// Plans in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.plans.values()
    }

    /// Baseline version per chain.
    pub fn baselines(
        &self,
        snapshot: &DatabaseSnapshot,
        catalog: &SchemaCatalog,
        naming: TableNaming,
        matching: TableMatch,
    ) -> Result<BTreeMap<Option<String>, Version>> {
        let mut baselines: BTreeMap<Option<String>, Version> = BTreeMap::new();
        for (key, plan) in &self.plans {
            let tables = plan.target_tables(catalog, naming)?;
            if !snapshot.plan_applied(&tables, matching) {
                continue;
            }
            let chain = key.chain().map(str::to_string);
            let entry = baselines.entry(chain).or_insert_with(|| key.version().clone());
            if key.version() > entry {
                *entry = key.version().clone();
            }
        }
        Ok(baselines)
    }

    /// Keys of plans strictly after their chain's baseline, in
    /// registration order.
    pub fn pending_keys(
        &self,
        snapshot: &DatabaseSnapshot,
        catalog: &SchemaCatalog,
        naming: TableNaming,
        matching: TableMatch,
    ) -> Result<(BTreeMap<Option<String>, Version>, Vec<P::Key>)> {
        let baselines = self.baselines(snapshot, catalog, naming, matching)?;
        let pending = self
            .plans
            .keys()
            .filter(|key| {
                let chain = key.chain().map(str::to_string);
                match baselines.get(&chain) {
                    Some(baseline) => key.version() > baseline,
                    None => true,
                }
            })
            .cloned()
            .collect();
        Ok((baselines, pending))
    }

    fn resolve(&self, env: &PlanEnv<'_>, matching: TableMatch) -> Result<PendingPlans> {
        let snapshot = DatabaseSnapshot::capture(env.conn)?;
        let (baselines, pending) = self.pending_keys(&snapshot, env.catalog, env.naming, matching)?;
        Ok(PendingPlans {
            baselines: baselines
                .into_iter()
                .map(|(chain, version)| Baseline { chain, version })
                .collect(),
            pending: pending.iter().map(ToString::to_string).collect(),
        })
    }

    /// Runs every pending plan in registration order with `run`.
    fn run_pending<F>(&mut self, env: &PlanEnv<'_>, matching: TableMatch, mut run: F) -> Result<UpgradeReport>
    where
        F: FnMut(&mut P, &PlanEnv<'_>) -> Result<usize>,
    {
        let snapshot = DatabaseSnapshot::capture(env.conn)?;
        let (baselines, pending) = self.pending_keys(&snapshot, env.catalog, env.naming, matching)?;
        debug!(?baselines, pending = pending.len(), "forward resolution");

        let mut report = UpgradeReport::default();
        for key in pending {
            let plan = self.get_mut(&key)?;
            report.modified += run(plan, env)?;
            report.executed.push(key.to_string());
        }
        Ok(report)
    }
}

/// Strategy keyed by version: each entry is a [`VersionChangePlan`].
///
/// Used for by-tick (matching by table name) and by-alter-table (matching
/// by table name and column set).
#[derive(Debug, Clone)]
pub struct VersionKeyedStrategy {
    registry: PlanRegistry<VersionChangePlan>,
    matching: TableMatch,
    modified_count: usize,
}

impl VersionKeyedStrategy {
    fn new(matching: TableMatch) -> Self {
        Self {
            registry: PlanRegistry::default(),
            matching,
            modified_count: 0,
        }
    }

    pub fn registry(&self) -> &PlanRegistry<VersionChangePlan> {
        &self.registry
    }

    /// Registers a composite plan.
    pub fn register_version_plan(&mut self, plan: VersionChangePlan) -> Result<()> {
        self.registry.register(plan)
    }

    /// Adds an entity plan to the composite for its version, creating the
    /// composite on first use.
    pub fn register_entity_plan(&mut self, plan: EntityChangePlan) -> Result<()> {
        let version = plan.version().clone();
        if let Ok(existing) = self.registry.get_mut(&version) {
            return existing.add_entity_plan(plan);
        }
        self.registry
            .register(VersionChangePlan::new(version).with_plan(plan)?)
    }

    pub fn get_plan(&self, version: &Version) -> Result<&VersionChangePlan> {
        self.registry.get(version)
    }

    pub fn get_plan_mut(&mut self, version: &Version) -> Result<&mut VersionChangePlan> {
        self.registry.get_mut(version)
    }

    pub fn unregister(&mut self, version: &Version) -> Option<VersionChangePlan> {
        self.registry.unregister(version)
    }

    pub fn pending(&self, env: &PlanEnv<'_>) -> Result<PendingPlans> {
        self.registry.resolve(env, self.matching)
    }

    pub fn upgrade(&mut self, env: &PlanEnv<'_>, events: &EventBus) -> Result<UpgradeReport> {
        let report = self
            .registry
            .run_pending(env, self.matching, |plan, env| plan.upgrade_to_target_version(env, events))?;
        self.modified_count += report.modified;
        Ok(report)
    }

    pub fn downgrade(&mut self, version: &Version, env: &PlanEnv<'_>, events: &EventBus) -> Result<usize> {
        let modified = self
            .registry
            .get_mut(version)?
            .downgrade_to_target_version(env, events)?;
        self.modified_count += modified;
        Ok(modified)
    }

    pub fn modified_count(&self) -> usize {
        self.modified_count
    }

    pub fn reset(&mut self) {
        self.registry.clear();
        self.modified_count = 0;
    }
}

/// Strategy keyed by entity and version: every entity advances on its own.
#[derive(Debug, Clone, Default)]
pub struct EntityKeyedStrategy {
    registry: PlanRegistry<EntityChangePlan>,
    modified_count: usize,
}

impl EntityKeyedStrategy {
    pub fn registry(&self) -> &PlanRegistry<EntityChangePlan> {
        &self.registry
    }

    pub fn register_entity_plan(&mut self, plan: EntityChangePlan) -> Result<()> {
        self.registry.register(plan)
    }

    pub fn get_plan(&self, key: &EntityKey) -> Result<&EntityChangePlan> {
        self.registry.get(key)
    }

    pub fn get_plan_mut(&mut self, key: &EntityKey) -> Result<&mut EntityChangePlan> {
        self.registry.get_mut(key)
    }

    pub fn unregister(&mut self, key: &EntityKey) -> Option<EntityChangePlan> {
        self.registry.unregister(key)
    }

    pub fn pending(&self, env: &PlanEnv<'_>) -> Result<PendingPlans> {
        self.registry.resolve(env, TableMatch::Name)
    }

    pub fn upgrade(&mut self, env: &PlanEnv<'_>) -> Result<UpgradeReport> {
        let report = self
            .registry
            .run_pending(env, TableMatch::Name, |plan, env| plan.upgrade_to_target_version(env))?;
        self.modified_count += report.modified;
        Ok(report)
    }

    /// Downgrades every entity plan registered at `version`, most recently
    /// registered first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::PlanNotFound`] if no entity has a plan at
    /// `version`.
    pub fn downgrade(&mut self, version: &Version, env: &PlanEnv<'_>) -> Result<usize> {
        let keys: Vec<EntityKey> = self
            .registry
            .iter()
            .filter(|p| p.version() == version)
            .map(|p| p.key().clone())
            .collect();
        if keys.is_empty() {
            return Err(SqliteError::PlanNotFound(version.to_string()));
        }
        let mut modified = 0;
        for key in keys.iter().rev() {
            modified += self.registry.get_mut(key)?.downgrade_to_target_version(env)?;
        }
        self.modified_count += modified;
        Ok(modified)
    }

    pub fn modified_count(&self) -> usize {
        self.modified_count
    }

    pub fn reset(&mut self) {
        self.registry.clear();
        self.modified_count = 0;
    }
}

/// The closed set of versioning strategies.
#[derive(Debug, Clone)]
pub enum VersioningStrategy {
    ByTick(VersionKeyedStrategy),
    ByAlterTable(VersionKeyedStrategy),
    ByTable(EntityKeyedStrategy),
    /// Placeholder until a real strategy is chosen; rejects everything.
    NotSupported,
}

impl VersioningStrategy {
    /// A fresh, empty strategy for `kind`.
    pub fn for_kind(kind: VersioningKind) -> Self {
        match kind {
            VersioningKind::ByTick => Self::ByTick(VersionKeyedStrategy::new(TableMatch::Name)),
            VersioningKind::ByAlterTable => {
                Self::ByAlterTable(VersionKeyedStrategy::new(TableMatch::NameAndColumns))
            }
            VersioningKind::ByTable => Self::ByTable(EntityKeyedStrategy::default()),
            VersioningKind::NotSupported => Self::NotSupported,
        }
    }

    pub fn kind(&self) -> VersioningKind {
        match self {
            Self::ByTick(_) => VersioningKind::ByTick,
            Self::ByAlterTable(_) => VersioningKind::ByAlterTable,
            Self::ByTable(_) => VersioningKind::ByTable,
            Self::NotSupported => VersioningKind::NotSupported,
        }
    }

    /// Human-readable strategy name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ByTick(_) => "by-tick",
            Self::ByAlterTable(_) => "by-alter-table",
            Self::ByTable(_) => "by-table",
            Self::NotSupported => "not-supported",
        }
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> SqliteError {
        SqliteError::Unsupported {
            operation,
            strategy: self.name(),
        }
    }

    /// Entity plans registered across all entries.
    pub fn plan_count(&self) -> usize {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.registry.plan_count(),
            Self::ByTable(s) => s.registry.plan_count(),
            Self::NotSupported => 0,
        }
    }

    /// Modifications accumulated since creation or the last reset.
    pub fn modified_count(&self) -> usize {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.modified_count(),
            Self::ByTable(s) => s.modified_count(),
            Self::NotSupported => 0,
        }
    }

    /// Clears the registry and the modification counter.
    pub fn reset(&mut self) {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.reset(),
            Self::ByTable(s) => s.reset(),
            Self::NotSupported => {}
        }
    }

    /// Registers an entity-scoped plan.
    pub fn register_entity_plan(&mut self, plan: EntityChangePlan) -> Result<()> {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.register_entity_plan(plan),
            Self::ByTable(s) => s.register_entity_plan(plan),
            Self::NotSupported => Err(self.unsupported("register_entity_plan")),
        }
    }

    /// Registers a version-scoped plan.
    pub fn register_version_plan(&mut self, plan: VersionChangePlan) -> Result<()> {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.register_version_plan(plan),
            Self::ByTable(_) | Self::NotSupported => Err(self.unsupported("register_version_plan")),
        }
    }

    /// Resolves pending plans without running them.
    pub fn pending(&self, env: &PlanEnv<'_>) -> Result<PendingPlans> {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.pending(env),
            Self::ByTable(s) => s.pending(env),
            Self::NotSupported => Err(self.unsupported("pending")),
        }
    }

    /// Runs every pending plan.
    pub fn upgrade(&mut self, env: &PlanEnv<'_>, events: &EventBus) -> Result<UpgradeReport> {
        let report = match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.upgrade(env, events)?,
            Self::ByTable(s) => s.upgrade(env)?,
            Self::NotSupported => return Err(self.unsupported("upgrade_to_target_version")),
        };
        info!(strategy = self.name(), executed = report.executed.len(), modified = report.modified, "upgrade finished");
        Ok(report)
    }

    /// Runs the downgrade hooks of the plans registered at `version`.
    pub fn downgrade(&mut self, version: &Version, env: &PlanEnv<'_>, events: &EventBus) -> Result<usize> {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s.downgrade(version, env, events),
            Self::ByTable(s) => s.downgrade(version, env),
            Self::NotSupported => Err(self.unsupported("downgrade")),
        }
    }

    /// Keys of every registered entity plan, in registration order.
    pub fn entity_keys(&self) -> Vec<EntityKey> {
        match self {
            Self::ByTick(s) | Self::ByAlterTable(s) => s
                .registry
                .iter()
                .flat_map(|composite| composite.plans().iter().map(|p| p.key().clone()))
                .collect(),
            Self::ByTable(s) => s.registry.iter().map(|p| p.key().clone()).collect(),
            Self::NotSupported => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_tick_core::{ColumnDescriptor, EntityBuilder, VersionChain};

    fn catalog() -> SchemaCatalog {
        let chain = VersionChain::from_names(["V0", "V1", "V2"]).unwrap();
        let mut catalog = SchemaCatalog::new(chain);
        for name in ["A", "B"] {
            catalog
                .register(
                    EntityBuilder::new(name)
                        .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
                        .column(ColumnDescriptor::new("X", "TEXT").since("V1"))
                        .column(ColumnDescriptor::new("Y", "TEXT").since("V2")),
                )
                .unwrap();
        }
        catalog
            .register(EntityBuilder::new("C").column(ColumnDescriptor::new("Id", "INTEGER").primary_key()))
            .unwrap();
        catalog
    }

    fn version(catalog: &SchemaCatalog, name: &str) -> Version {
        catalog.version(name).unwrap().clone()
    }

    fn entity_plan(entity: &str, version: Version) -> EntityChangePlan {
        EntityChangePlan::builder(entity, version).create_on_upgrade().build()
    }

    #[test]
    fn test_baseline_is_highest_matched_version() {
        let catalog = catalog();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE A (Id INTEGER); CREATE TABLE A_1 (Id INTEGER, X TEXT); CREATE TABLE unrelated (z INTEGER);")
            .unwrap();

        let mut registry = PlanRegistry::default();
        for name in ["V0", "V1", "V2"] {
            registry
                .register(VersionChangePlan::new(version(&catalog, name)).with_plan(entity_plan("A", version(&catalog, name))).unwrap())
                .unwrap();
        }

        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        let (baselines, pending) = registry
            .pending_keys(&snapshot, &catalog, TableNaming::Ticked, TableMatch::Name)
            .unwrap();
        assert_eq!(baselines.get(&None).unwrap().name(), "V1");
        assert_eq!(pending, vec![version(&catalog, "V2")]);
    }

    #[test]
    fn test_empty_database_has_everything_pending() {
        let catalog = catalog();
        let conn = Connection::open_in_memory().unwrap();
        let mut registry = PlanRegistry::default();
        registry.register(entity_plan("A", version(&catalog, "V0"))).unwrap();
        registry.register(entity_plan("B", version(&catalog, "V0"))).unwrap();
        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        let (baselines, pending) = registry
            .pending_keys(&snapshot, &catalog, TableNaming::Ticked, TableMatch::Name)
            .unwrap();
        assert!(baselines.is_empty());
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_entity_chains_advance_independently() {
        let catalog = catalog();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE A_1 (Id INTEGER, X TEXT)").unwrap();
        let mut registry = PlanRegistry::default();
        for entity in ["A", "B"] {
            for name in ["V0", "V1"] {
                registry.register(entity_plan(entity, version(&catalog, name))).unwrap();
            }
        }
        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        let (baselines, pending) = registry
            .pending_keys(&snapshot, &catalog, TableNaming::Ticked, TableMatch::Name)
            .unwrap();
        assert_eq!(baselines.get(&Some("A".to_string())).unwrap().name(), "V1");
        let pending: Vec<String> = pending.iter().map(ToString::to_string).collect();
        assert_eq!(pending, vec!["B@V0", "B@V1"]);
    }

    #[test]
    fn test_alter_table_matching_uses_columns() {
        let catalog = catalog();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE A (Id INTEGER, X TEXT)").unwrap();
        let mut registry = PlanRegistry::default();
        for name in ["V0", "V1", "V2"] {
            registry
                .register(VersionChangePlan::new(version(&catalog, name)).with_plan(entity_plan("A", version(&catalog, name))).unwrap())
                .unwrap();
        }
        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        let (baselines, pending) = registry
            .pending_keys(&snapshot, &catalog, TableNaming::Plain, TableMatch::NameAndColumns)
            .unwrap();
        assert_eq!(baselines.get(&None).unwrap().name(), "V1");
        assert_eq!(pending, vec![version(&catalog, "V2")]);
    }

    #[test]
    fn test_alter_table_plan_needs_every_member_table() {
        let catalog = catalog();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE A (Id INTEGER); CREATE TABLE C (Id INTEGER);")
            .unwrap();
        let mut registry = PlanRegistry::default();
        for name in ["V0", "V1"] {
            let plan = VersionChangePlan::new(version(&catalog, name))
                .with_plan(entity_plan("A", version(&catalog, name)))
                .unwrap()
                .with_plan(entity_plan("C", version(&catalog, name)))
                .unwrap();
            registry.register(plan).unwrap();
        }
        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        let (baselines, pending) = registry
            .pending_keys(&snapshot, &catalog, TableNaming::Plain, TableMatch::NameAndColumns)
            .unwrap();
        assert_eq!(baselines.get(&None).unwrap().name(), "V0");
        assert_eq!(pending, vec![version(&catalog, "V1")]);
    }

    #[test]
    fn test_snapshot_lists_created_indexes_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE A (Id INTEGER PRIMARY KEY, X TEXT UNIQUE); CREATE INDEX idx_A_X ON A (X);",
        )
        .unwrap();
        let snapshot = DatabaseSnapshot::capture(&conn).unwrap();
        assert_eq!(snapshot.indexes("A"), ["idx_A_X".to_string()]);
        assert!(snapshot.indexes("B").is_empty());
    }

    #[test]
    fn test_duplicate_registration_leaves_registry_unchanged() {
        let catalog = catalog();
        let mut strategy = VersioningStrategy::for_kind(VersioningKind::ByTick);
        strategy.register_entity_plan(entity_plan("A", version(&catalog, "V0"))).unwrap();
        let err = strategy
            .register_entity_plan(entity_plan("A", version(&catalog, "V0")))
            .unwrap_err();
        assert!(matches!(err, SqliteError::DuplicatePlan(_)));
        assert_eq!(strategy.plan_count(), 1);
    }

    #[test]
    fn test_by_tick_groups_entity_plans_by_version() {
        let catalog = catalog();
        let mut strategy = VersionKeyedStrategy::new(TableMatch::Name);
        strategy.register_entity_plan(entity_plan("A", version(&catalog, "V0"))).unwrap();
        strategy.register_entity_plan(entity_plan("B", version(&catalog, "V0"))).unwrap();
        assert_eq!(strategy.registry().len(), 1);
        assert_eq!(strategy.get_plan(&version(&catalog, "V0")).unwrap().len(), 2);
    }

    #[test]
    fn test_unregistered_lookup_does_not_insert() {
        let catalog = catalog();
        let mut strategy = EntityKeyedStrategy::default();
        let key = EntityKey::new("A", version(&catalog, "V1"));
        assert!(matches!(strategy.get_plan(&key), Err(SqliteError::PlanNotFound(_))));
        assert!(strategy.get_plan_mut(&key).is_err());
        assert!(strategy.registry().is_empty());
    }

    #[test]
    fn test_not_supported_rejects_everything() {
        let catalog = catalog();
        let mut strategy = VersioningStrategy::for_kind(VersioningKind::NotSupported);
        assert!(matches!(
            strategy.register_entity_plan(entity_plan("A", version(&catalog, "V0"))),
            Err(SqliteError::Unsupported { strategy: "not-supported", .. })
        ));
        assert!(strategy
            .register_version_plan(VersionChangePlan::new(version(&catalog, "V0")))
            .is_err());
    }

    #[test]
    fn test_by_table_rejects_version_plans() {
        let catalog = catalog();
        let mut strategy = VersioningStrategy::for_kind(VersioningKind::ByTable);
        let err = strategy
            .register_version_plan(VersionChangePlan::new(version(&catalog, "V0")))
            .unwrap_err();
        assert!(matches!(err, SqliteError::Unsupported { strategy: "by-table", .. }));
    }
}
