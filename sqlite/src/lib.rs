//! SQLite execution for versioned entity schemas.
//!
//! This crate runs the change plans that move entity tables from one schema
//! version to the next. The database stores no version metadata: which
//! plans still have to run is inferred from the tables that exist, so an
//! upgrade can be repeated safely and only ever moves forward.
//!
//! # Architecture
//!
//! - **`plan`**: entity-scoped and version-scoped change plans with
//!   optional create/drop/upgrade/downgrade hooks
//! - **`context`**: the environment a plan runs in and the standard table
//!   operations (create, drop, row-preserving upgrade, in-place adjust)
//! - **`strategy`**: plan registries and forward resolution for the
//!   by-tick, by-alter-table and by-table strategies
//! - **`manager`**: the [`DataVersionManager`] facade and the explicit
//!   [`VersionContext`]
//! - **`dao`**: record access for one entity at one version
//! - **`sql`**, **`layout`**, **`retry`**, **`tracker`**: statement
//!   generation, column layout checks, retry-on-lock, connection tracking
//!
//! # Quick start
//!
//! ```
//! use rusqlite::types::Value;
//! use schema_tick_core::*;
//! use schema_tick_sqlite::{DataVersionManager, Database, EntityChangePlan, EntityTable, Record, VersionContext};
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
//! let root = catalog.chain().root().clone();
//! let v1 = catalog.version("Version_1").unwrap().clone();
//!
//! let mut manager = DataVersionManager::new(Database::open_in_memory().unwrap(), catalog);
//! manager
//!     .register_entity_plan(EntityChangePlan::builder("Origin", root.clone()).create_on_upgrade().build())
//!     .unwrap();
//! manager
//!     .register_entity_plan(EntityChangePlan::builder("Origin", v1).migrate_from(root).build())
//!     .unwrap();
//! manager.upgrade_to_target_version().unwrap();
//!
//! let mut ctx = VersionContext::new();
//! manager.set_default(&mut ctx);
//! let origin = EntityTable::from_context(
//!     manager.connection(),
//!     manager.catalog(),
//!     &ctx,
//!     "Origin",
//!     manager.naming(),
//! )
//! .unwrap();
//! assert_eq!(origin.name(), "Origin_1");
//!
//! let mut row = Record::new();
//! row.insert("Id".into(), Value::Integer(1));
//! row.insert("Item3".into(), Value::Text("c".into()));
//! origin.insert(&row).unwrap();
//! assert_eq!(origin.count().unwrap(), 1);
//! ```
//!
//! # Features
//!
//! - `async`: [`AsyncDataVersionManager`], which runs every operation on
//!   tokio's blocking pool.

#[cfg(feature = "async")]
mod async_manager;
mod context;
mod dao;
mod error;
mod events;
mod layout;
mod manager;
mod plan;
mod retry;
mod sql;
mod strategy;
pub mod tracker;

#[cfg(feature = "async")]
pub use async_manager::AsyncDataVersionManager;
pub use context::{PlanContext, PlanEnv};
pub use dao::{EntityTable, Record};
pub use error::{Result, SqliteError};
pub use events::{EventBus, VersionEvent};
pub use layout::{ColumnOverrides, TableLayout};
pub use manager::{DataVersionManager, VersionContext};
pub use plan::{EntityChangePlan, EntityKey, EntityPlanBuilder, PlanHook, VerifyPolicy, VersionChangePlan};
pub use retry::RetryPolicy;
pub use sql::{InsertSelect, create_table_sql, insert_select_sql};
pub use strategy::{
    Baseline, DatabaseSnapshot, EntityKeyedStrategy, PendingPlans, PlanKey, PlanRegistry,
    RegisteredPlan, TableMatch, UpgradeReport, VersionKeyedStrategy, VersioningStrategy,
};
pub use tracker::{Database, TrackedConnection};
