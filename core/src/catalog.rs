//! The schema catalog: explicit `(entity, version) -> table shape` lookup.
//!
//! Entities are registered once at startup through [`EntityBuilder`]. The
//! catalog validates every `since` reference against its [`VersionChain`]
//! and answers two questions for the migration engine:
//!
//! - [`resolve_table`](SchemaCatalog::resolve_table): which table name and
//!   ordered column set does an entity have as of a version?
//! - [`default_version`](SchemaCatalog::default_version): which version does
//!   an entity resolve to when none is given?
//!
//! # Example
//!
//! ```
//! use schema_tick_core::*;
//!
//! let chain = VersionChain::from_names(["VersionOrigin", "Version_1"]).unwrap();
//! let mut catalog = SchemaCatalog::new(chain);
//! catalog
//!     .register(
//!         EntityBuilder::new("Origin")
//!             .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
//!             .column(ColumnDescriptor::new("Item1", "TEXT"))
//!             .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
//!     )
//!     .unwrap();
//!
//! let v1 = catalog.version("Version_1").unwrap().clone();
//! let table = catalog.resolve_table("Origin", &v1, TableNaming::Ticked).unwrap();
//! assert_eq!(table.name, "Origin_1");
//! assert_eq!(table.column_names(), vec!["Id", "Item1", "Item3"]);
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::column::{ColumnDescriptor, IndexDescriptor};
use crate::error::{CatalogError, Result, validate_identifier};
use crate::table::{TableDescriptor, TableNaming};
use crate::version::{Version, VersionChain};

/// A registered entity: its base table name, every column it has ever had,
/// and its declared indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub name: String,
    /// Base table name before any version decoration.
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    /// Version used when callers do not name one.
    pub default_version: Option<String>,
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    descriptor: EntityDescriptor,
}

impl EntityBuilder {
    /// Starts an entity whose base table name equals its entity name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            descriptor: EntityDescriptor {
                table: name.clone(),
                name,
                columns: Vec::new(),
                indexes: Vec::new(),
                default_version: None,
            },
        }
    }

    /// Overrides the base table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.descriptor.table = table.into();
        self
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.descriptor.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        self.descriptor.columns.extend(columns);
        self
    }

    /// Declares a composite (or explicitly named) index.
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.descriptor.indexes.push(index);
        self
    }

    pub fn default_version(mut self, version: impl Into<String>) -> Self {
        self.descriptor.default_version = Some(version.into());
        self
    }

    pub fn build(self) -> EntityDescriptor {
        self.descriptor
    }
}

impl From<EntityBuilder> for EntityDescriptor {
    fn from(builder: EntityBuilder) -> Self {
        builder.build()
    }
}

/// Registry of entities over a single version chain.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    chain: VersionChain,
    entities: IndexMap<String, EntityDescriptor>,
}

impl SchemaCatalog {
    pub fn new(chain: VersionChain) -> Self {
        Self {
            chain,
            entities: IndexMap::new(),
        }
    }

    /// Validates and registers an entity.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::DuplicateEntity`] if the name is taken.
    /// - [`CatalogError::EmptyEntity`] if it has no columns.
    /// - [`CatalogError::DuplicateColumn`] on repeated column names.
    /// - [`CatalogError::UnknownVersion`] if a `since` or default version is
    ///   not in the chain.
    /// - [`CatalogError::UnknownIndexColumn`] if an index names a column the
    ///   entity lacks.
    /// - [`CatalogError::InvalidIdentifier`] for unusable names.
    pub fn register(&mut self, entity: impl Into<EntityDescriptor>) -> Result<()> {
        let entity = entity.into();
        self.validate(&entity)?;
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    fn validate(&self, entity: &EntityDescriptor) -> Result<()> {
        validate_identifier(&entity.name)?;
        validate_identifier(&entity.table)?;
        if self.entities.contains_key(&entity.name) {
            return Err(CatalogError::DuplicateEntity(entity.name.clone()));
        }
        if entity.columns.is_empty() {
            return Err(CatalogError::EmptyEntity(entity.name.clone()));
        }

        let mut seen = HashSet::new();
        for column in &entity.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    entity: entity.name.clone(),
                    column: column.name.clone(),
                });
            }
            if let Some(since) = &column.since {
                self.chain.require(since)?;
            }
        }

        for index in &entity.indexes {
            if let Some(name) = &index.name {
                validate_identifier(name)?;
            }
            if let Some(since) = &index.since {
                self.chain.require(since)?;
            }
            for column in &index.columns {
                if !seen.contains(column.as_str()) {
                    return Err(CatalogError::UnknownIndexColumn {
                        entity: entity.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        if let Some(default) = &entity.default_version {
            self.chain.require(default)?;
        }
        Ok(())
    }

    /// The catalog's version chain.
    pub fn chain(&self) -> &VersionChain {
        &self.chain
    }

    /// Looks up a version by name.
    pub fn version(&self, name: &str) -> Result<&Version> {
        self.chain.require(name)
    }

    /// Looks up a registered entity.
    pub fn entity(&self, name: &str) -> Result<&EntityDescriptor> {
        self.entities
            .get(name)
            .ok_or_else(|| CatalogError::UnknownEntity(name.to_string()))
    }

    /// Registered entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Tick of an optional `since` reference; `None` is the root.
    fn since_tick(&self, since: Option<&str>) -> Result<u32> {
        match since {
            Some(name) => Ok(self.chain.require(name)?.tick()),
            None => Ok(0),
        }
    }

    /// Resolves an entity's table as of `version`.
    ///
    /// The column set holds every column whose `since` version is at or
    /// before `version`, sorted by `order` and then by declaration order.
    /// Indexes follow the same rule; per-column `indexed` flags become
    /// single-column indexes after the declared ones.
    pub fn resolve_table(
        &self,
        entity: &str,
        version: &Version,
        naming: TableNaming,
    ) -> Result<TableDescriptor> {
        let descriptor = self.entity(entity)?;
        if !self.chain.contains(version) {
            return Err(CatalogError::UnknownVersion(version.name().to_string()));
        }

        let mut columns = Vec::new();
        for (position, column) in descriptor.columns.iter().enumerate() {
            if self.since_tick(column.since.as_deref())? <= version.tick() {
                columns.push((column.order, position, column.clone()));
            }
        }
        columns.sort_by_key(|(order, position, _)| (*order, *position));
        let columns: Vec<ColumnDescriptor> = columns.into_iter().map(|(_, _, c)| c).collect();

        let mut indexes = Vec::new();
        for index in &descriptor.indexes {
            if self.since_tick(index.since.as_deref())? <= version.tick() {
                indexes.push(index.clone());
            }
        }
        indexes.extend(
            columns
                .iter()
                .filter(|c| c.indexed)
                .map(|c| IndexDescriptor::new([c.name.clone()])),
        );

        Ok(TableDescriptor {
            name: naming.physical_name(&descriptor.table, version),
            entity: descriptor.name.clone(),
            version: version.clone(),
            columns,
            indexes,
        })
    }

    /// Version an entity resolves to when none is specified: its declared
    /// default, else the latest version in the chain.
    pub fn default_version(&self, entity: &str) -> Result<Version> {
        let descriptor = self.entity(entity)?;
        match &descriptor.default_version {
            Some(name) => Ok(self.chain.require(name)?.clone()),
            None => Ok(self.chain.latest().clone()),
        }
    }
}
