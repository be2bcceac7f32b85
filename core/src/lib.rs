//! Schema versioning primitives for SQLite-backed entities.
//!
//! This crate holds the pure data side of the migration engine:
//!
//! - [`Version`] and [`VersionChain`]: a linear, root-first sequence of
//!   schema versions.
//! - [`ColumnDescriptor`] and [`IndexDescriptor`]: mapped columns with the
//!   version they first appear in, constraints, and default-value policy.
//! - [`SchemaCatalog`]: the explicit `(entity, version) -> table shape`
//!   lookup consumed by the engine.
//! - [`VersioningMode`]: the bitmask selecting a strategy kind and the
//!   cleanup applied to superseded tables.
//! - [`SchemaConfig`]: the same information loaded from YAML.
//!
//! SQL execution lives in `schema-tick-sqlite`.
//!
//! # Example
//!
//! ```
//! use schema_tick_core::*;
//!
//! let chain = VersionChain::new("VersionOrigin").unwrap().then("Version_1").unwrap();
//! let mut catalog = SchemaCatalog::new(chain);
//! catalog
//!     .register(
//!         EntityBuilder::new("Origin")
//!             .column(ColumnDescriptor::new("Id", "INTEGER").primary_key())
//!             .column(ColumnDescriptor::new("Item3", "TEXT").since("Version_1")),
//!     )
//!     .unwrap();
//!
//! let root = catalog.chain().root().clone();
//! let table = catalog.resolve_table("Origin", &root, TableNaming::Ticked).unwrap();
//! assert_eq!(table.column_names(), vec!["Id"]);
//! ```

mod catalog;
mod column;
mod config;
mod error;
mod mode;
mod table;
mod version;

pub use catalog::{EntityBuilder, EntityDescriptor, SchemaCatalog};
pub use column::{ColumnDescriptor, DefaultPolicy, DefaultValue, IndexDescriptor};
pub use config::{
    DEFAULT_RETRY_TIMEOUT_SECS, EntityConfig, PlanConfig, PlanStep, SchemaConfig,
};
pub use error::{CatalogError, Result};
pub use mode::{VersioningKind, VersioningMode};
pub use table::{TableDescriptor, TableNaming};
pub use version::{Version, VersionChain};
