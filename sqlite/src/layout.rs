//! Column layout verification against live tables.
//!
//! A table created by an older code path may hold the expected columns in a
//! different physical order. Such drift is tolerated by recording an
//! ordinal override; a column that is missing outright is a
//! [`SchemaMismatch`](SqliteError::SchemaMismatch).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::Connection;
use schema_tick_core::TableDescriptor;
use tracing::{info, warn};

use crate::error::{Result, SqliteError};
use crate::sql;

/// Where each expected column physically lives in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    table: String,
    /// `ordinals[i]` is the physical position of the i-th expected column.
    ordinals: Vec<usize>,
}

impl TableLayout {
    /// Compares the live table against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaMismatch`] if the table does not exist or
    /// lacks any expected column.
    pub fn verify(conn: &Connection, table: &str, expected: &TableDescriptor) -> Result<Self> {
        let actual = sql::table_columns(conn, table)?;
        if actual.is_empty() {
            return Err(SqliteError::SchemaMismatch {
                table: table.to_string(),
                reason: "table does not exist".to_string(),
            });
        }
        let missing = missing_columns(&actual, expected);
        if !missing.is_empty() {
            return Err(SqliteError::SchemaMismatch {
                table: table.to_string(),
                reason: format!("missing columns: {}", missing.join(", ")),
            });
        }
        let ordinals = expected
            .columns
            .iter()
            .filter_map(|c| actual.iter().position(|a| *a == c.name))
            .collect();
        Ok(Self {
            table: table.to_string(),
            ordinals,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Physical ordinal of the expected column at `index`.
    pub fn ordinal(&self, index: usize) -> Option<usize> {
        self.ordinals.get(index).copied()
    }

    /// `true` when physical order equals declared order.
    pub fn is_declared_order(&self) -> bool {
        self.ordinals.iter().enumerate().all(|(i, o)| i == *o)
    }
}

fn missing_columns(actual: &[String], expected: &TableDescriptor) -> Vec<String> {
    expected
        .columns
        .iter()
        .filter(|c| !actual.contains(&c.name))
        .map(|c| c.name.clone())
        .collect()
}

/// Shared record of tables whose physical column order differs from the
/// declared order.
#[derive(Debug, Clone, Default)]
pub struct ColumnOverrides {
    inner: Arc<RwLock<HashMap<String, TableLayout>>>,
}

impl ColumnOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded layout for `table`, if its order drifted.
    pub fn get(&self, table: &str) -> Option<TableLayout> {
        self.inner.read().get(table).cloned()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.inner.read().contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Forgets `table`, e.g. after it was dropped or renamed.
    pub fn forget(&self, table: &str) {
        self.inner.write().remove(table);
    }

    fn record(&self, layout: TableLayout) {
        self.inner.write().insert(layout.table.clone(), layout);
    }

    /// Inspects a freshly created (or pre-existing) table.
    ///
    /// Order drift is recorded as an override. Missing columns are logged
    /// and left for the next insert or upgrade to report.
    pub fn check_created(&self, conn: &Connection, table: &str, expected: &TableDescriptor) -> Result<()> {
        match TableLayout::verify(conn, table, expected) {
            Ok(layout) if layout.is_declared_order() => {
                self.forget(table);
                Ok(())
            }
            Ok(layout) => {
                info!(table, ordinals = ?layout.ordinals, "column order differs from declaration, recording override");
                self.record(layout);
                Ok(())
            }
            Err(SqliteError::SchemaMismatch { reason, .. }) => {
                warn!(table, %reason, "existing table does not match expected columns");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the layout to use for reading or writing `table`: the
    /// recorded override, or a fresh verification.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaMismatch`] if expected columns are absent.
    pub fn layout(&self, conn: &Connection, table: &str, expected: &TableDescriptor) -> Result<TableLayout> {
        if let Some(layout) = self.get(table) {
            if layout.ordinals.len() == expected.columns.len() {
                return Ok(layout);
            }
        }
        let layout = TableLayout::verify(conn, table, expected)?;
        if !layout.is_declared_order() {
            self.record(layout.clone());
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_tick_core::{ColumnDescriptor, EntityBuilder, SchemaCatalog, TableNaming, VersionChain};

    fn expected() -> TableDescriptor {
        let mut catalog = SchemaCatalog::new(VersionChain::new("V0").unwrap());
        catalog
            .register(
                EntityBuilder::new("Origin")
                    .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
                    .column(ColumnDescriptor::new("Item1", "TEXT"))
                    .column(ColumnDescriptor::new("Item2", "TEXT")),
            )
            .unwrap();
        let root = catalog.chain().root().clone();
        catalog.resolve_table("Origin", &root, TableNaming::Ticked).unwrap()
    }

    #[test]
    fn test_matching_table_has_declared_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Origin (Id INTEGER, Item1 TEXT, Item2 TEXT)")
            .unwrap();
        let layout = TableLayout::verify(&conn, "Origin", &expected()).unwrap();
        assert!(layout.is_declared_order());
    }

    #[test]
    fn test_order_drift_records_override() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Origin (Item2 TEXT, Id INTEGER, Item1 TEXT)")
            .unwrap();
        let overrides = ColumnOverrides::new();
        overrides.check_created(&conn, "Origin", &expected()).unwrap();
        let layout = overrides.get("Origin").unwrap();
        assert_eq!(layout.ordinal(0), Some(1));
        assert_eq!(layout.ordinal(1), Some(2));
        assert_eq!(layout.ordinal(2), Some(0));
    }

    #[test]
    fn test_missing_column_tolerated_at_create_but_fatal_at_use() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Origin (Id INTEGER, Item1 TEXT)").unwrap();
        let overrides = ColumnOverrides::new();
        overrides.check_created(&conn, "Origin", &expected()).unwrap();
        assert!(overrides.is_empty());

        let err = overrides.layout(&conn, "Origin", &expected()).unwrap_err();
        match err {
            SqliteError::SchemaMismatch { table, reason } => {
                assert_eq!(table, "Origin");
                assert!(reason.contains("Item2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_absent_table_is_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            TableLayout::verify(&conn, "Origin", &expected()),
            Err(SqliteError::SchemaMismatch { .. })
        ));
    }
}
