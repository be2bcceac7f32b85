//! Change plans: executable descriptions of one schema step.
//!
//! An [`EntityChangePlan`] moves one entity's table to one version. It is a
//! data record with optional hooks: a plan without an upgrade (or
//! downgrade) hook simply does not support that direction, and asking it to
//! run that way fails with [`SqliteError::DirectionUnsupported`]. Create and
//! drop have standard implementations that a hook may replace.
//!
//! A [`VersionChangePlan`] groups the entity plans that together bring
//! every entity to one version and emits begin/finish events around them.
//!
//! Plans carry no "applied" flag. Whether a plan has run is inferred from
//! which tables exist; see [`crate::strategy`].

use std::fmt;
use std::sync::Arc;

use schema_tick_core::{SchemaCatalog, TableDescriptor, TableNaming, Version, VersioningMode};
use tracing::{debug, info};

use crate::context::{PlanContext, PlanEnv};
use crate::error::{Result, SqliteError};
use crate::events::{EventBus, VersionEvent};
use crate::sql;

/// A plan operation supplied by migration-definition code.
pub type PlanHook = Arc<dyn for<'e, 'a> Fn(&mut PlanContext<'e, 'a>) -> Result<()> + Send + Sync>;

/// Identity of an entity-scoped plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity: String,
    pub version: Version,
}

impl EntityKey {
    pub fn new(entity: impl Into<String>, version: Version) -> Self {
        Self {
            entity: entity.into(),
            version,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.version)
    }
}

/// Check run after an upgrade completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    #[default]
    None,
    /// The target table must exist once the upgrade finished.
    TableExists,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Create,
    Drop,
    Upgrade,
    Downgrade,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Drop => "drop",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }
}

/// How one entity's table is created, dropped, upgraded to, or downgraded
/// to at one version.
///
/// Two plans are equal when they target the same entity and version.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use schema_tick_core::*;
/// use schema_tick_sqlite::{EntityChangePlan, PlanEnv, VerifyPolicy};
///
/// let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
/// let mut catalog = SchemaCatalog::new(chain);
/// catalog
///     .register(
///         EntityBuilder::new("Origin")
///             .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
///             .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
///     )
///     .unwrap();
/// let root = catalog.chain().root().clone();
/// let v1 = catalog.version("Version_1").unwrap().clone();
///
/// let mut origin = EntityChangePlan::builder("Origin", root.clone()).create_on_upgrade().build();
/// let mut next = EntityChangePlan::builder("Origin", v1)
///     .migrate_from(root)
///     .verify(VerifyPolicy::TableExists)
///     .build();
///
/// let conn = Connection::open_in_memory().unwrap();
/// let env = PlanEnv::new(&conn, &catalog);
/// origin.upgrade_to_target_version(&env).unwrap();
/// next.upgrade_to_target_version(&env).unwrap();
/// assert!(next.downgrade_to_target_version(&env).is_err());
/// ```
#[derive(Clone)]
pub struct EntityChangePlan {
    key: EntityKey,
    table_name: Option<String>,
    verify: VerifyPolicy,
    mode: Option<VersioningMode>,
    create: Option<PlanHook>,
    drop: Option<PlanHook>,
    upgrade: Option<PlanHook>,
    downgrade: Option<PlanHook>,
    modified_count: usize,
}

impl EntityChangePlan {
    pub fn builder(entity: impl Into<String>, version: Version) -> EntityPlanBuilder {
        EntityPlanBuilder {
            plan: Self {
                key: EntityKey::new(entity, version),
                table_name: None,
                verify: VerifyPolicy::None,
                mode: None,
                create: None,
                drop: None,
                upgrade: None,
                downgrade: None,
                modified_count: 0,
            },
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn entity(&self) -> &str {
        &self.key.entity
    }

    pub fn version(&self) -> &Version {
        &self.key.version
    }

    /// Explicit target table name, if one overrides the resolved name.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn verify_policy(&self) -> VerifyPolicy {
        self.verify
    }

    /// The plan's own mode, if it overrides the manager's.
    pub fn mode(&self) -> Option<VersioningMode> {
        self.mode
    }

    /// Total modifications made by every run of this plan so far.
    pub fn modified_count(&self) -> usize {
        self.modified_count
    }

    pub fn supports_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }

    pub fn supports_downgrade(&self) -> bool {
        self.downgrade.is_some()
    }

    /// Resolves the plan's target table under `naming`.
    pub fn target_table(&self, catalog: &SchemaCatalog, naming: TableNaming) -> Result<TableDescriptor> {
        let mut table = catalog.resolve_table(&self.key.entity, &self.key.version, naming)?;
        if let Some(name) = &self.table_name {
            table.name = name.clone();
        }
        Ok(table)
    }

    fn run(&mut self, env: &PlanEnv<'_>, direction: Direction) -> Result<usize> {
        let hook = match direction {
            Direction::Create => self.create.clone(),
            Direction::Drop => self.drop.clone(),
            Direction::Upgrade => self.upgrade.clone(),
            Direction::Downgrade => self.downgrade.clone(),
        };
        let mode = self.mode.unwrap_or(env.mode);
        let mut ctx = PlanContext::new(
            env,
            &self.key.entity,
            &self.key.version,
            self.table_name.as_deref(),
            mode,
        );
        match (direction, hook) {
            (_, Some(hook)) => hook(&mut ctx)?,
            (Direction::Create, None) => ctx.create_table()?,
            (Direction::Drop, None) => ctx.drop_table()?,
            (Direction::Upgrade | Direction::Downgrade, None) => {
                return Err(SqliteError::DirectionUnsupported {
                    plan: self.key.to_string(),
                    direction: direction.as_str(),
                });
            }
        }
        let modified = ctx.modified();
        self.modified_count += modified;
        debug!(plan = %self.key, direction = direction.as_str(), modified, "plan step finished");
        Ok(modified)
    }

    /// Creates the plan's table. Returns the modifications made.
    pub fn create_table(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        self.run(env, Direction::Create)
    }

    /// Drops the plan's table. Returns the modifications made.
    pub fn drop_table(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        self.run(env, Direction::Drop)
    }

    /// Drops the plan's table if it exists, bypassing any drop hook.
    pub fn drop_table_if_exists(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        let mode = self.mode.unwrap_or(env.mode);
        let mut ctx = PlanContext::new(
            env,
            &self.key.entity,
            &self.key.version,
            self.table_name.as_deref(),
            mode,
        );
        ctx.drop_table_if_exists()?;
        let modified = ctx.modified();
        self.modified_count += modified;
        Ok(modified)
    }

    /// Brings the entity's table to this plan's version.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::DirectionUnsupported`] if the plan has no upgrade hook.
    /// - [`SqliteError::VerificationFailed`] if the verify policy fails.
    pub fn upgrade_to_target_version(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        info!(plan = %self.key, "upgrading");
        let modified = self.run(env, Direction::Upgrade)?;
        if self.verify == VerifyPolicy::TableExists {
            let table = self.target_table(env.catalog, env.naming)?;
            if !sql::table_exists(env.conn, &table.name)? {
                return Err(SqliteError::VerificationFailed {
                    plan: self.key.to_string(),
                    table: table.name,
                });
            }
        }
        Ok(modified)
    }

    /// Moves the entity's data back to this plan's version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DirectionUnsupported`] if the plan has no
    /// downgrade hook.
    pub fn downgrade_to_target_version(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        info!(plan = %self.key, "downgrading");
        self.run(env, Direction::Downgrade)
    }
}

impl PartialEq for EntityChangePlan {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EntityChangePlan {}

impl fmt::Debug for EntityChangePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityChangePlan")
            .field("key", &self.key)
            .field("table_name", &self.table_name)
            .field("verify", &self.verify)
            .field("mode", &self.mode)
            .field("upgrade", &self.upgrade.is_some())
            .field("downgrade", &self.downgrade.is_some())
            .field("modified_count", &self.modified_count)
            .finish()
    }
}

/// Builder for [`EntityChangePlan`].
pub struct EntityPlanBuilder {
    plan: EntityChangePlan,
}

impl EntityPlanBuilder {
    /// Overrides the resolved target table name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.plan.table_name = Some(name.into());
        self
    }

    pub fn verify(mut self, policy: VerifyPolicy) -> Self {
        self.plan.verify = policy;
        self
    }

    /// Overrides the manager's versioning mode for this plan.
    pub fn mode(mut self, mode: VersioningMode) -> Self {
        self.plan.mode = Some(mode);
        self
    }

    pub fn on_create<F>(mut self, hook: F) -> Self
    where
        F: for<'e, 'a> Fn(&mut PlanContext<'e, 'a>) -> Result<()> + Send + Sync + 'static,
    {
        self.plan.create = Some(Arc::new(hook));
        self
    }

    pub fn on_drop<F>(mut self, hook: F) -> Self
    where
        F: for<'e, 'a> Fn(&mut PlanContext<'e, 'a>) -> Result<()> + Send + Sync + 'static,
    {
        self.plan.drop = Some(Arc::new(hook));
        self
    }

    pub fn on_upgrade<F>(mut self, hook: F) -> Self
    where
        F: for<'e, 'a> Fn(&mut PlanContext<'e, 'a>) -> Result<()> + Send + Sync + 'static,
    {
        self.plan.upgrade = Some(Arc::new(hook));
        self
    }

    pub fn on_downgrade<F>(mut self, hook: F) -> Self
    where
        F: for<'e, 'a> Fn(&mut PlanContext<'e, 'a>) -> Result<()> + Send + Sync + 'static,
    {
        self.plan.downgrade = Some(Arc::new(hook));
        self
    }

    /// Upgrading creates the table; the usual plan for a root version.
    pub fn create_on_upgrade(self) -> Self {
        self.on_upgrade(|ctx| ctx.create_table())
    }

    /// Upgrading creates the new-shape table and copies rows from `from`.
    pub fn migrate_from(self, from: Version) -> Self {
        self.on_upgrade(move |ctx| {
            ctx.create_table()?;
            ctx.upgrade_table(&from)?;
            Ok(())
        })
    }

    /// Upgrading rebuilds the `from`-version table in place.
    pub fn adjust_from(self, from: Version) -> Self {
        self.on_upgrade(move |ctx| {
            ctx.adjust_columns(&from)?;
            Ok(())
        })
    }

    /// Downgrading drops this version's table if it exists.
    pub fn drop_on_downgrade(self) -> Self {
        self.on_downgrade(|ctx| ctx.drop_table_if_exists())
    }

    pub fn build(self) -> EntityChangePlan {
        self.plan
    }
}

/// The entity plans that together bring every entity to one version.
///
/// Equal when the versions match and the member plans are equal in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChangePlan {
    version: Version,
    plans: Vec<EntityChangePlan>,
}

impl VersionChangePlan {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            plans: Vec::new(),
        }
    }

    /// Adds a member plan, consuming and returning `self`.
    pub fn with_plan(mut self, plan: EntityChangePlan) -> Result<Self> {
        self.add_entity_plan(plan)?;
        Ok(self)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Member plans in execution order.
    pub fn plans(&self) -> &[EntityChangePlan] {
        &self.plans
    }

    pub(crate) fn plans_mut(&mut self) -> &mut [EntityChangePlan] {
        &mut self.plans
    }

    pub fn entity_plan(&self, entity: &str) -> Option<&EntityChangePlan> {
        self.plans.iter().find(|p| p.entity() == entity)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Appends a member plan.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::PlanVersionMismatch`] if the plan targets another version.
    /// - [`SqliteError::DuplicatePlan`] if the entity already has a member plan.
    pub fn add_entity_plan(&mut self, plan: EntityChangePlan) -> Result<()> {
        if plan.version() != &self.version {
            return Err(SqliteError::PlanVersionMismatch {
                plan: plan.key().to_string(),
                version: self.version.to_string(),
            });
        }
        if self.entity_plan(plan.entity()).is_some() {
            return Err(SqliteError::DuplicatePlan(plan.key().to_string()));
        }
        self.plans.push(plan);
        Ok(())
    }

    /// Removes and returns the member plan for `entity`.
    pub fn remove_entity_plan(&mut self, entity: &str) -> Option<EntityChangePlan> {
        let position = self.plans.iter().position(|p| p.entity() == entity)?;
        Some(self.plans.remove(position))
    }

    /// Total modifications made by every member plan so far.
    pub fn modified_count(&self) -> usize {
        self.plans.iter().map(EntityChangePlan::modified_count).sum()
    }

    /// Creates every member's table.
    pub fn create_table(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        let mut modified = 0;
        for plan in &mut self.plans {
            modified += plan.create_table(env)?;
        }
        Ok(modified)
    }

    /// Drops every member's table, last member first.
    pub fn drop_table(&mut self, env: &PlanEnv<'_>) -> Result<usize> {
        let mut modified = 0;
        for plan in self.plans.iter_mut().rev() {
            modified += plan.drop_table(env)?;
        }
        Ok(modified)
    }

    /// Upgrades every member in order, between begin/finish events.
    pub fn upgrade_to_target_version(&mut self, env: &PlanEnv<'_>, events: &EventBus) -> Result<usize> {
        events.emit(VersionEvent::UpgradeBegin(self.version.clone()));
        let mut modified = 0;
        for plan in &mut self.plans {
            modified += plan.upgrade_to_target_version(env)?;
        }
        events.emit(VersionEvent::UpgradeFinish(self.version.clone()));
        Ok(modified)
    }

    /// Downgrades every member, last member first, between begin/finish
    /// events.
    pub fn downgrade_to_target_version(&mut self, env: &PlanEnv<'_>, events: &EventBus) -> Result<usize> {
        events.emit(VersionEvent::DowngradeBegin(self.version.clone()));
        let mut modified = 0;
        for plan in self.plans.iter_mut().rev() {
            modified += plan.downgrade_to_target_version(env)?;
        }
        events.emit(VersionEvent::DowngradeFinish(self.version.clone()));
        Ok(modified)
    }
}
