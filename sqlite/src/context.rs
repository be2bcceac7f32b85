//! Execution environment and per-run context for change plans.
//!
//! [`PlanEnv`] bundles what every plan run needs: the connection, the
//! catalog, the table naming in force, the versioning mode, the retry
//! policy, and the shared column-order overrides. [`PlanContext`] is the
//! view one plan's hook receives; its helpers implement the standard
//! table operations (create, drop, row-preserving upgrade, in-place
//! adjust) and count every modification they make.

use rusqlite::Connection;
use schema_tick_core::{SchemaCatalog, TableDescriptor, TableNaming, Version, VersioningMode};
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::layout::{ColumnOverrides, TableLayout};
use crate::retry::RetryPolicy;
use crate::sql;

/// Everything a plan needs to run against a database.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use schema_tick_core::*;
/// use schema_tick_sqlite::{EntityChangePlan, PlanEnv};
///
/// let mut catalog = SchemaCatalog::new(VersionChain::new("VersionOrigin").unwrap());
/// catalog
///     .register(EntityBuilder::new("Origin").column(ColumnDescriptor::new("Id", "INTEGER").primary_key()))
///     .unwrap();
/// let root = catalog.chain().root().clone();
///
/// let conn = Connection::open_in_memory().unwrap();
/// let env = PlanEnv::new(&conn, &catalog);
/// let mut plan = EntityChangePlan::builder("Origin", root).create_on_upgrade().build();
/// assert_eq!(plan.upgrade_to_target_version(&env).unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PlanEnv<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) catalog: &'a SchemaCatalog,
    pub(crate) naming: TableNaming,
    pub(crate) mode: VersioningMode,
    pub(crate) retry: RetryPolicy,
    pub(crate) overrides: ColumnOverrides,
}

impl<'a> PlanEnv<'a> {
    /// Creates an environment with by-tick naming, the default retry
    /// policy, and a fresh override record.
    pub fn new(conn: &'a Connection, catalog: &'a SchemaCatalog) -> Self {
        Self {
            conn,
            catalog,
            naming: TableNaming::Ticked,
            mode: VersioningMode::BY_TICK,
            retry: RetryPolicy::default(),
            overrides: ColumnOverrides::new(),
        }
    }

    pub fn with_naming(mut self, naming: TableNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_mode(mut self, mode: VersioningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_overrides(mut self, overrides: ColumnOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    pub fn naming(&self) -> TableNaming {
        self.naming
    }

    pub fn overrides(&self) -> &ColumnOverrides {
        &self.overrides
    }

    /// Resolves the physical table for an entity at a version, honoring an
    /// explicit table name override.
    pub fn resolve(
        &self,
        entity: &str,
        version: &Version,
        table_name: Option<&str>,
    ) -> Result<TableDescriptor> {
        let mut table = self.catalog.resolve_table(entity, version, self.naming)?;
        if let Some(name) = table_name {
            table.name = name.to_string();
        }
        Ok(table)
    }
}

/// The context a plan hook runs in.
pub struct PlanContext<'e, 'a> {
    env: &'e PlanEnv<'a>,
    entity: &'e str,
    version: &'e Version,
    table_name: Option<&'e str>,
    mode: VersioningMode,
    modified: usize,
}

impl<'e, 'a> PlanContext<'e, 'a> {
    pub(crate) fn new(
        env: &'e PlanEnv<'a>,
        entity: &'e str,
        version: &'e Version,
        table_name: Option<&'e str>,
        mode: VersioningMode,
    ) -> Self {
        Self {
            env,
            entity,
            version,
            table_name,
            mode,
            modified: 0,
        }
    }

    pub fn connection(&self) -> &'a Connection {
        self.env.conn
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.env.catalog
    }

    pub fn entity(&self) -> &str {
        self.entity
    }

    /// The plan's target version.
    pub fn version(&self) -> &Version {
        self.version
    }

    /// Mode in force for this run: the plan's own mode, else the manager's.
    pub fn mode(&self) -> VersioningMode {
        self.mode
    }

    /// Modifications counted so far in this run.
    pub fn modified(&self) -> usize {
        self.modified
    }

    /// The plan's target table.
    pub fn target_table(&self) -> Result<TableDescriptor> {
        self.env.resolve(self.entity, self.version, self.table_name)
    }

    /// The entity's table at another version (no name override applies).
    pub fn table_at(&self, version: &Version) -> Result<TableDescriptor> {
        if version == self.version {
            return self.target_table();
        }
        self.env.resolve(self.entity, version, None)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        sql::table_exists(self.env.conn, name)
    }

    /// Executes one or more statements and counts the call as one
    /// modification. Each statement is retried on its own when the
    /// database is locked.
    pub fn execute_batch(&mut self, statement: &str) -> Result<()> {
        self.env.retry.execute_batch(self.env.conn, statement)?;
        self.modified += 1;
        Ok(())
    }

    /// Executes a data statement with lock retry and counts the affected rows.
    pub fn execute(&mut self, statement: &str) -> Result<usize> {
        let rows = self
            .env
            .retry
            .execute(self.env.conn, statement, rusqlite::params![])?;
        self.modified += rows;
        Ok(rows)
    }

    /// Creates the target table (if missing) and its indexes.
    ///
    /// Counts one modification for the table and one per index. A
    /// pre-existing table whose column order differs from the declaration
    /// gets an ordinal override; missing columns surface later, at insert
    /// or upgrade time.
    pub fn create_table(&mut self) -> Result<()> {
        let table = self.target_table()?;
        self.create_shape(&table.name, &table)
    }

    fn create_shape(&mut self, name: &str, table: &TableDescriptor) -> Result<()> {
        self.execute_batch(&sql::create_table_sql(name, table))?;
        for index in &table.indexes {
            self.execute_batch(&sql::create_index_sql(name, index))?;
        }
        self.env.overrides.check_created(self.env.conn, name, table)?;
        debug!(table = name, indexes = table.indexes.len(), "table created");
        Ok(())
    }

    /// Drops the target table.
    pub fn drop_table(&mut self) -> Result<()> {
        let name = self.target_table()?.name;
        self.drop_named(&name, false)
    }

    /// Drops the target table if it exists.
    pub fn drop_table_if_exists(&mut self) -> Result<()> {
        let name = self.target_table()?.name;
        self.drop_named(&name, true)
    }

    fn drop_named(&mut self, name: &str, if_exists: bool) -> Result<()> {
        self.execute_batch(&sql::drop_table_sql(name, if_exists))?;
        self.env.overrides.forget(name);
        Ok(())
    }

    fn check_source(&self, source: &TableDescriptor, target: &TableDescriptor) -> Result<()> {
        TableLayout::verify(self.env.conn, &source.name, source)?;
        if let Some(column) = target.columns_missing_from(source).find(|c| {
            c.default_policy == schema_tick_core::DefaultPolicy::AsColumn
        }) {
            return Err(SqliteError::SchemaMismatch {
                table: source.name.clone(),
                reason: format!(
                    "column '{}' is passed by column reference but the source table lacks it",
                    column.name
                ),
            });
        }
        Ok(())
    }

    /// Copies every row of the entity's `from`-version table into the
    /// target table, then applies the casted-off cleanup the mode asks for.
    ///
    /// The target table must already exist (see [`create_table`](Self::create_table)).
    /// Columns introduced after `from` are filled from their default
    /// policy. With `DELETE_ALL_RECORD_IN_TABLE_CASTED_OFF` the source table
    /// is emptied; with `DROP_TABLE_CASTED_OFF` it is dropped. Both may run.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaMismatch`] if the source table lacks a
    /// column its version declares, or if both versions resolve to the same
    /// physical table (use [`adjust_columns`](Self::adjust_columns) there).
    pub fn upgrade_table(&mut self, from: &Version) -> Result<usize> {
        let source = self.table_at(from)?;
        let target = self.target_table()?;
        if source.name == target.name {
            return Err(SqliteError::SchemaMismatch {
                table: target.name,
                reason: format!(
                    "versions {from} and {} share one table; rebuild it in place with adjust_columns",
                    self.version
                ),
            });
        }
        self.check_source(&source, &target)?;

        let statement = sql::insert_select_sql(&target.name, &target, &source.name, &source);
        let rows = self.execute(&statement.sql)?;
        info!(from = %source.name, to = %target.name, rows, "rows migrated");

        if self.mode.clears_casted_off() {
            self.execute_batch(&sql::delete_all_sql(&source.name))?;
            debug!(table = %source.name, "casted-off table emptied");
        }
        if self.mode.drops_casted_off() {
            self.drop_named(&source.name, false)?;
            debug!(table = %source.name, "casted-off table dropped");
        }
        Ok(rows)
    }

    /// Rebuilds the entity's `from`-version table in place with the target
    /// shape.
    ///
    /// Creates a temporary table with the target columns, copies the rows
    /// across, drops the original, and renames the temporary table to the
    /// target name, so only one permanent table ever exists for the entity.
    pub fn adjust_columns(&mut self, from: &Version) -> Result<usize> {
        let source = self.table_at(from)?;
        let target = self.target_table()?;
        self.check_source(&source, &target)?;

        let temp = format!("{}__rebuild", target.name);
        self.drop_named(&temp, true)?;
        self.execute_batch(&sql::create_table_sql(&temp, &target))?;
        let statement = sql::insert_select_sql(&temp, &target, &source.name, &source);
        let rows = self.execute(&statement.sql)?;
        self.drop_named(&source.name, false)?;
        self.execute_batch(&sql::rename_table_sql(&temp, &target.name))?;
        self.env.overrides.forget(&target.name);
        for index in &target.indexes {
            self.execute_batch(&sql::create_index_sql(&target.name, index))?;
        }
        info!(from = %source.name, to = %target.name, rows, "table rebuilt in place");
        Ok(rows)
    }
}
