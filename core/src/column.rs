//! Column descriptors and default-value literal synthesis.
//!
//! A [`ColumnDescriptor`] records everything the migration engine needs to
//! know about one mapped column: its SQLite type, the version it first
//! appears in, its ordering position, constraints, and how its default is
//! passed when rows are copied from an older table shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a column's value is produced when rows are copied into a table
/// shape that introduces the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Emit the bare column name, so a later step can alias an expression.
    AsColumn,
    /// Emit the column's default value as a SQL literal (`NULL` when absent).
    #[default]
    AsValue,
}

/// A typed default value for a column.
///
/// # Examples
///
/// ```
/// use schema_tick_core::DefaultValue;
///
/// assert_eq!(DefaultValue::Text("it's".into()).to_sql_literal(), "'it''s'");
/// assert_eq!(DefaultValue::Integer(42).to_sql_literal(), "42");
/// assert_eq!(DefaultValue::Boolean(true).to_sql_literal(), "1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Guid(Uuid),
}

impl DefaultValue {
    /// Renders the value as a SQLite literal.
    ///
    /// Text is single-quoted with embedded quotes doubled, integers and
    /// reals are bare, booleans become `1`/`0`, and GUIDs are quoted in
    /// their canonical hyphenated form.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Text(s) => quote_text(s),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => {
                if r.is_finite() {
                    r.to_string()
                } else {
                    "NULL".to_string()
                }
            }
            Self::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Guid(g) => quote_text(&g.hyphenated().to_string()),
        }
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn default_nullable() -> bool {
    true
}

/// One mapped column of an entity.
///
/// # Examples
///
/// ```
/// use schema_tick_core::{ColumnDescriptor, DefaultValue};
///
/// let id = ColumnDescriptor::new("Id", "INTEGER").primary_key();
/// let item3 = ColumnDescriptor::new("Item3", "TEXT")
///     .since("Version_1")
///     .default_value(DefaultValue::Text("n/a".into()));
///
/// assert!(id.primary_key);
/// assert_eq!(item3.since.as_deref(), Some("Version_1"));
/// assert_eq!(item3.migration_expr(), "'n/a'");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within its entity.
    pub name: String,
    /// SQLite type name, e.g. `TEXT`, `INTEGER`, `NUMERIC`.
    pub sql_type: String,
    /// Version in which the column first appears; `None` means the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Ordering position; ties fall back to declaration order.
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    /// Create a single-column index for this column.
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub default_policy: DefaultPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

impl ColumnDescriptor {
    /// Creates a nullable column present since the root version.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            since: None,
            order: 0,
            nullable: true,
            primary_key: false,
            unique: false,
            indexed: false,
            default_policy: DefaultPolicy::AsValue,
            default: None,
        }
    }

    /// Marks the column as introduced in `version`.
    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.since = Some(version.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Marks the column as (part of) the primary key. Implies `NOT NULL`.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Passes the column by name instead of by value during migration.
    pub fn pass_as_column(mut self) -> Self {
        self.default_policy = DefaultPolicy::AsColumn;
        self
    }

    /// SQL expression that populates this column when copying rows from a
    /// table shape that lacks it.
    pub fn migration_expr(&self) -> String {
        match self.default_policy {
            DefaultPolicy::AsColumn => self.name.clone(),
            DefaultPolicy::AsValue => self
                .default
                .as_ref()
                .map(DefaultValue::to_sql_literal)
                .unwrap_or_else(|| "NULL".to_string()),
        }
    }
}

/// A single- or multi-column index declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Explicit index name; generated from the table and columns when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Version in which the index first appears; `None` means the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            since: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.since = Some(version.into());
        self
    }

    /// Index name for the given physical table.
    pub fn name_for(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("idx_{table}_{}", self.columns.join("_")),
        }
    }
}
