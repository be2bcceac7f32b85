//! Table views computed from an entity and a target version.

use serde::{Deserialize, Serialize};

use crate::column::{ColumnDescriptor, IndexDescriptor};
use crate::version::Version;

/// How a physical table name is derived from an entity's base table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableNaming {
    /// Root version keeps the base name, later versions get a `_<tick>`
    /// suffix: `Origin`, `Origin_1`, `Origin_2`.
    #[default]
    Ticked,
    /// Every version shares the base name.
    Plain,
}

impl TableNaming {
    /// Physical table name for `base` at `version`.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_tick_core::{TableNaming, Version};
    ///
    /// let origin = Version::root("VersionOrigin");
    /// let v1 = origin.successor("Version_1");
    /// assert_eq!(TableNaming::Ticked.physical_name("Origin", &origin), "Origin");
    /// assert_eq!(TableNaming::Ticked.physical_name("Origin", &v1), "Origin_1");
    /// assert_eq!(TableNaming::Plain.physical_name("Origin", &v1), "Origin");
    /// ```
    pub fn physical_name(self, base: &str, version: &Version) -> String {
        match self {
            Self::Ticked if !version.is_root() => format!("{base}_{}", version.tick()),
            _ => base.to_string(),
        }
    }
}

/// One entity's table shape as of a specific version.
///
/// Computed on demand by
/// [`SchemaCatalog::resolve_table`](crate::SchemaCatalog::resolve_table);
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// Physical table name.
    pub name: String,
    /// Entity the table belongs to.
    pub entity: String,
    /// Version the column set was resolved for.
    pub version: Version,
    /// Columns present as of `version`, in their total order.
    pub columns: Vec<ColumnDescriptor>,
    /// Indexes present as of `version`, including per-column indexes.
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary-key columns in order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Non-primary-key columns in order.
    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Columns of `self` that `older` does not have, in `self`'s order.
    pub fn columns_missing_from<'a>(
        &'a self,
        older: &'a TableDescriptor,
    ) -> impl Iterator<Item = &'a ColumnDescriptor> {
        self.columns.iter().filter(|c| !older.has_column(&c.name))
    }
}
