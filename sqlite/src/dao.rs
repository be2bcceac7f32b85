//! Record access for one entity at one version.
//!
//! [`EntityTable`] reads and writes rows of an entity's physical table in
//! the column shape its version declares. Writes go through the lock-retry
//! policy; reads honor column-order overrides recorded at table creation.

use indexmap::IndexMap;
use rusqlite::Connection;
use rusqlite::types::Value;
use schema_tick_core::{SchemaCatalog, TableDescriptor, TableNaming, Version};
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::layout::ColumnOverrides;
use crate::manager::VersionContext;
use crate::retry::RetryPolicy;
use crate::sql::quote_ident;

/// One row: column name to value, in the entity's declared column order
/// when read back.
pub type Record = IndexMap<String, Value>;

/// Rows of an entity's table at one version.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use rusqlite::types::Value;
/// use schema_tick_core::*;
/// use schema_tick_sqlite::{EntityTable, Record, create_table_sql};
///
/// let mut catalog = SchemaCatalog::new(VersionChain::new("V0").unwrap());
/// catalog
///     .register(
///         EntityBuilder::new("Origin")
///             .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
///             .column(ColumnDescriptor::new("Item1", "TEXT")),
///     )
///     .unwrap();
/// let root = catalog.chain().root().clone();
///
/// let conn = Connection::open_in_memory().unwrap();
/// let table = EntityTable::new(&conn, &catalog, "Origin", &root, TableNaming::Ticked).unwrap();
/// conn.execute_batch(&create_table_sql("Origin", table.descriptor())).unwrap();
///
/// let mut row = Record::new();
/// row.insert("Id".into(), Value::Integer(1));
/// row.insert("Item1".into(), Value::Text("a".into()));
/// table.insert(&row).unwrap();
/// assert_eq!(table.count().unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct EntityTable<'c> {
    conn: &'c Connection,
    table: TableDescriptor,
    retry: RetryPolicy,
    overrides: ColumnOverrides,
}

impl<'c> EntityTable<'c> {
    /// Binds to `entity`'s table at `version`.
    pub fn new(
        conn: &'c Connection,
        catalog: &SchemaCatalog,
        entity: &str,
        version: &Version,
        naming: TableNaming,
    ) -> Result<Self> {
        Ok(Self {
            conn,
            table: catalog.resolve_table(entity, version, naming)?,
            retry: RetryPolicy::default(),
            overrides: ColumnOverrides::new(),
        })
    }

    /// Binds to `entity`'s table at the version `ctx` resolves for it,
    /// sharing the context's column-order overrides.
    pub fn from_context(
        conn: &'c Connection,
        catalog: &SchemaCatalog,
        ctx: &VersionContext,
        entity: &str,
        naming: TableNaming,
    ) -> Result<Self> {
        let version = ctx.resolve(catalog, entity)?;
        Ok(Self::new(conn, catalog, entity, &version, naming)?.with_overrides(ctx.overrides().clone()))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_overrides(mut self, overrides: ColumnOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// The resolved table this DAO reads and writes.
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn version(&self) -> &Version {
        &self.table.version
    }

    fn insert_sql(&self, verb: &str, record: &Record) -> Result<(String, Vec<Value>)> {
        self.overrides.layout(self.conn, &self.table.name, &self.table)?;
        if let Some(unknown) = record.keys().find(|k| !self.table.has_column(k)) {
            return Err(SqliteError::SchemaMismatch {
                table: self.table.name.clone(),
                reason: format!("entity '{}' has no column '{unknown}' at {}", self.table.entity, self.table.version),
            });
        }
        let columns: Vec<String> = record.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "{verb} INTO {} ({}) VALUES ({})",
            quote_ident(&self.table.name),
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, record.values().cloned().collect()))
    }

    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::SchemaMismatch`] if the table lacks an expected
    ///   column, or the record names a column the version does not have.
    /// - [`SqliteError::NoRowsInserted`] if the statement affected no rows.
    pub fn insert(&self, record: &Record) -> Result<()> {
        let (sql, values) = self.insert_sql("INSERT", record)?;
        let rows = self
            .retry
            .execute(self.conn, &sql, rusqlite::params_from_iter(values.iter()))?;
        if rows == 0 {
            return Err(SqliteError::NoRowsInserted(self.table.name.clone()));
        }
        debug!(table = %self.table.name, "row inserted");
        Ok(())
    }

    /// Inserts one row unless it conflicts with an existing one. Returns
    /// `true` if a row was written.
    pub fn insert_or_ignore(&self, record: &Record) -> Result<bool> {
        let (sql, values) = self.insert_sql("INSERT OR IGNORE", record)?;
        let rows = self
            .retry
            .execute(self.conn, &sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(rows > 0)
    }

    /// Every row, with values keyed by the version's column names.
    pub fn select_all(&self) -> Result<Vec<Record>> {
        let layout = self.overrides.layout(self.conn, &self.table.name, &self.table)?;
        let sql = format!("SELECT * FROM {}", quote_ident(&self.table.name));
        self.retry.run(|| {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let mut record = Record::with_capacity(self.table.columns.len());
                for (i, column) in self.table.columns.iter().enumerate() {
                    let ordinal = layout.ordinal(i).unwrap_or(i);
                    record.insert(column.name.clone(), row.get::<_, Value>(ordinal)?);
                }
                Ok(record)
            })?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table.name));
        let count: i64 = self
            .retry
            .run(|| self.conn.query_row(&sql, [], |row| row.get(0)))?;
        Ok(count as usize)
    }
}
