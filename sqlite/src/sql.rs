//! SQL statement generation for versioned tables.
//!
//! Builds the DDL and data-movement statements the change plans execute,
//! always from a resolved [`TableDescriptor`] so column sets are never
//! hard-coded. Identifiers are double-quoted.

use rusqlite::{Connection, params};
use schema_tick_core::{ColumnDescriptor, DefaultPolicy, IndexDescriptor, TableDescriptor};

use crate::error::Result;

/// Double-quotes an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_definition(column: &ColumnDescriptor, inline_pk: bool) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.sql_type);
    if inline_pk && column.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let (DefaultPolicy::AsValue, Some(default)) = (column.default_policy, &column.default) {
        def.push_str(" DEFAULT ");
        def.push_str(&default.to_sql_literal());
    }
    def
}

/// Generates `CREATE TABLE IF NOT EXISTS` for `table` under the physical
/// name `name`.
///
/// A single primary-key column is declared inline; a composite key becomes
/// a table constraint.
///
/// # Examples
///
/// ```
/// use schema_tick_core::*;
/// use schema_tick_sqlite::create_table_sql;
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
/// let table = catalog.resolve_table("Origin", &root, TableNaming::Ticked).unwrap();
///
/// assert_eq!(
///     create_table_sql(&table.name, &table),
///     r#"CREATE TABLE IF NOT EXISTS "Origin" ("Id" INTEGER PRIMARY KEY NOT NULL, "Item1" TEXT)"#
/// );
/// ```
pub fn create_table_sql(name: &str, table: &TableDescriptor) -> String {
    let keys: Vec<&ColumnDescriptor> = table.primary_key_columns().collect();
    let inline_pk = keys.len() == 1;
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_definition(c, inline_pk))
        .collect();
    if keys.len() > 1 {
        let key_list: Vec<String> = keys.iter().map(|c| quote_ident(&c.name)).collect();
        parts.push(format!("PRIMARY KEY ({})", key_list.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(name),
        parts.join(", ")
    )
}

/// Generates `CREATE [UNIQUE] INDEX IF NOT EXISTS` for one index.
pub(crate) fn create_index_sql(table: &str, index: &IndexDescriptor) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name_for(table)),
        quote_ident(table),
        columns.join(", ")
    )
}

pub(crate) fn drop_table_sql(name: &str, if_exists: bool) -> String {
    if if_exists {
        format!("DROP TABLE IF EXISTS {}", quote_ident(name))
    } else {
        format!("DROP TABLE {}", quote_ident(name))
    }
}

pub(crate) fn delete_all_sql(name: &str) -> String {
    format!("DELETE FROM {}", quote_ident(name))
}

pub(crate) fn rename_table_sql(from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to)
    )
}

/// A column-aligned `INSERT ... SELECT` between two table shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSelect {
    /// The complete statement.
    pub sql: String,
    /// Target column names, in the target table's order.
    pub columns: Vec<String>,
    /// One expression per target column, in the same order.
    pub select: Vec<String>,
}

/// Builds the statement copying rows from `source` (stored as
/// `source_name`) into `target` (stored as `target_name`).
///
/// The Nth select expression feeds the Nth target column: columns the
/// source has are selected by name, columns it lacks are synthesized from
/// their default policy (`NULL` when no default is declared). Columns only
/// the source has are left behind.
///
/// # Examples
///
/// ```
/// use schema_tick_core::*;
/// use schema_tick_sqlite::insert_select_sql;
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
/// let old = catalog.resolve_table("Origin", &root, TableNaming::Ticked).unwrap();
/// let new = catalog.resolve_table("Origin", &v1, TableNaming::Ticked).unwrap();
///
/// let stmt = insert_select_sql(&new.name, &new, &old.name, &old);
/// assert_eq!(stmt.select, vec!["\"Id\"", "\"Item1\"", "NULL"]);
/// ```
pub fn insert_select_sql(
    target_name: &str,
    target: &TableDescriptor,
    source_name: &str,
    source: &TableDescriptor,
) -> InsertSelect {
    let columns: Vec<String> = target.columns.iter().map(|c| c.name.clone()).collect();
    let select: Vec<String> = target
        .columns
        .iter()
        .map(|c| {
            if source.has_column(&c.name) {
                quote_ident(&c.name)
            } else {
                c.migration_expr()
            }
        })
        .collect();
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        quote_ident(target_name),
        column_list.join(", "),
        select.join(", "),
        quote_ident(source_name)
    );
    InsertSelect {
        sql,
        columns,
        select,
    }
}

/// Names of all user tables in the database, sorted.
pub(crate) fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Explicitly created indexes as `(table, index)` pairs. Automatic
/// indexes backing PRIMARY KEY and UNIQUE constraints are excluded.
pub(crate) fn list_indexes(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT tbl_name, name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let indexes = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(indexes)
}

/// Column names of a table in their stored (ordinal) order.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_tick_core::{DefaultValue, EntityBuilder, SchemaCatalog, TableNaming, VersionChain};

    fn catalog() -> SchemaCatalog {
        let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
        let mut catalog = SchemaCatalog::new(chain);
        catalog
            .register(
                EntityBuilder::new("Origin")
                    .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
                    .column(ColumnDescriptor::new("Item1", "TEXT"))
                    .column(ColumnDescriptor::new("Item2", "TEXT"))
                    .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1"))
                    .column(
                        ColumnDescriptor::new("Count", "INTEGER")
                            .since("Version_1")
                            .not_null()
                            .default_value(DefaultValue::Integer(0)),
                    ),
            )
            .unwrap();
        catalog
    }

    fn tables(catalog: &SchemaCatalog) -> (TableDescriptor, TableDescriptor) {
        let root = catalog.chain().root().clone();
        let v1 = catalog.version("Version_1").unwrap().clone();
        (
            catalog.resolve_table("Origin", &root, TableNaming::Ticked).unwrap(),
            catalog.resolve_table("Origin", &v1, TableNaming::Ticked).unwrap(),
        )
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a"), "\"a\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_create_table_includes_default() {
        let catalog = catalog();
        let (_, new) = tables(&catalog);
        let sql = create_table_sql(&new.name, &new);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"Origin_1\""));
        assert!(sql.contains("\"Count\" INTEGER NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_composite_primary_key() {
        let mut catalog = SchemaCatalog::new(VersionChain::new("V0").unwrap());
        catalog
            .register(
                EntityBuilder::new("Pair")
                    .column(ColumnDescriptor::new("A", "INTEGER").primary_key())
                    .column(ColumnDescriptor::new("B", "INTEGER").primary_key()),
            )
            .unwrap();
        let root = catalog.chain().root().clone();
        let table = catalog.resolve_table("Pair", &root, TableNaming::Ticked).unwrap();
        let sql = create_table_sql(&table.name, &table);
        assert!(sql.contains("PRIMARY KEY (\"A\", \"B\")"));
        assert!(!sql.contains("INTEGER PRIMARY KEY"));
    }

    #[test]
    fn test_insert_select_aligns_new_columns() {
        let catalog = catalog();
        let (old, new) = tables(&catalog);
        let stmt = insert_select_sql(&new.name, &new, &old.name, &old);
        assert_eq!(stmt.columns, vec!["Id", "Item1", "Item2", "Item3", "Count"]);
        assert_eq!(
            stmt.select,
            vec!["\"Id\"", "\"Item1\"", "\"Item2\"", "NULL", "0"]
        );
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"Origin_1\" (\"Id\", \"Item1\", \"Item2\", \"Item3\", \"Count\") \
             SELECT \"Id\", \"Item1\", \"Item2\", NULL, 0 FROM \"Origin\""
        );
    }

    #[test]
    fn test_insert_select_executes() {
        let catalog = catalog();
        let (old, new) = tables(&catalog);
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_table_sql(&old.name, &old)).unwrap();
        conn.execute_batch(&create_table_sql(&new.name, &new)).unwrap();
        conn.execute(
            "INSERT INTO Origin (Id, Item1, Item2) VALUES (1, 'a', 'b')",
            [],
        )
        .unwrap();
        let stmt = insert_select_sql(&new.name, &new, &old.name, &old);
        assert_eq!(conn.execute(&stmt.sql, []).unwrap(), 1);
        let (item3, count): (Option<String>, i64) = conn
            .query_row("SELECT Item3, Count FROM Origin_1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert!(item3.is_none());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_catalog_queries() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE b (x INTEGER, y TEXT); CREATE TABLE a (z INTEGER);")
            .unwrap();
        assert_eq!(list_tables(&conn).unwrap(), vec!["a", "b"]);
        assert_eq!(table_columns(&conn, "b").unwrap(), vec!["x", "y"]);
        assert!(table_exists(&conn, "a").unwrap());
        assert!(!table_exists(&conn, "c").unwrap());
    }

    #[test]
    fn test_index_statement() {
        let index = IndexDescriptor::new(["Item1", "Item2"]).unique();
        assert_eq!(
            create_index_sql("Origin", &index),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_Origin_Item1_Item2\" ON \"Origin\" (\"Item1\", \"Item2\")"
        );
    }
}
