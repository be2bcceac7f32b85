//! YAML schema configuration.
//!
//! Describes a version chain, the entities mapped over it, the versioning
//! mode, the lock-retry timeout, and the per-version change plans to
//! register.
//!
//! # Example YAML
//!
//! ```yaml
//! versions: [VersionOrigin, Version_1]
//! mode: BY_TICK | DROP_TABLE_CASTED_OFF
//! retry_timeout_secs: 300
//! entities:
//!   - name: Origin
//!     columns:
//!       - { name: Id, sql_type: INTEGER, primary_key: true, nullable: false }
//!       - { name: Item1, sql_type: TEXT }
//!       - { name: Item2, sql_type: TEXT }
//!       - { name: Item3, sql_type: TEXT, since: Version_1 }
//! plans:
//!   - { version: VersionOrigin, entity: Origin, step: create }
//!   - { version: Version_1, entity: Origin, step: migrate }
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{EntityBuilder, SchemaCatalog};
use crate::column::{ColumnDescriptor, IndexDescriptor};
use crate::error::Result;
use crate::mode::VersioningMode;
use crate::version::VersionChain;

/// Default lock-retry timeout: five minutes.
pub const DEFAULT_RETRY_TIMEOUT_SECS: u64 = 300;

fn default_retry_timeout_secs() -> u64 {
    DEFAULT_RETRY_TIMEOUT_SECS
}

/// One entity in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Base table name; defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
}

/// What a configured plan does when it runs forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    /// Create the table for the plan's version.
    Create,
    /// Create the new-shape table and copy rows from the previous version.
    Migrate,
    /// Rebuild the table in place, preserving rows.
    Adjust,
}

/// One change plan in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub version: String,
    pub entity: String,
    pub step: PlanStep,
    /// Source version for `migrate`/`adjust`; defaults to the predecessor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Assert the target table exists after the plan runs.
    #[serde(default)]
    pub verify: bool,
    /// Per-plan mode override; the manager's mode applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<VersioningMode>,
}

/// Top-level schema configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Root-first version names.
    pub versions: Vec<String>,
    #[serde(default)]
    pub mode: VersioningMode,
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
}

impl SchemaConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::CatalogError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::CatalogError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    /// Builds and validates the catalog described by this configuration.
    pub fn build_catalog(&self) -> Result<SchemaCatalog> {
        let chain = VersionChain::from_names(self.versions.iter().cloned())?;
        let mut catalog = SchemaCatalog::new(chain);
        for entity in &self.entities {
            let mut builder = EntityBuilder::new(&entity.name)
                .columns(entity.columns.iter().cloned());
            if let Some(table) = &entity.table {
                builder = builder.table(table);
            }
            if let Some(version) = &entity.default_version {
                builder = builder.default_version(version);
            }
            for index in &entity.indexes {
                builder = builder.index(index.clone());
            }
            catalog.register(builder)?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableNaming;

    fn sample_yaml() -> &'static str {
        r#"
versions: [VersionOrigin, Version_1]
mode: BY_TICK | DROP_TABLE_CASTED_OFF
entities:
  - name: Origin
    columns:
      - { name: Id, sql_type: INTEGER, primary_key: true, nullable: false }
      - { name: Item1, sql_type: TEXT }
      - { name: Item2, sql_type: TEXT }
      - { name: Item3, sql_type: TEXT, since: Version_1, default: { text: "none" } }
    indexes:
      - { columns: [Item1, Item2] }
plans:
  - { version: VersionOrigin, entity: Origin, step: create }
  - { version: Version_1, entity: Origin, step: migrate, verify: true }
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config = SchemaConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.versions, vec!["VersionOrigin", "Version_1"]);
        assert!(config.mode.drops_casted_off());
        assert_eq!(config.retry_timeout(), Duration::from_secs(300));
        assert_eq!(config.plans.len(), 2);
        assert_eq!(config.plans[1].step, PlanStep::Migrate);
        assert!(config.plans[1].verify);
        assert!(config.plans[0].from.is_none());
    }

    #[test]
    fn test_build_catalog() {
        let config = SchemaConfig::from_yaml_str(sample_yaml()).unwrap();
        let catalog = config.build_catalog().unwrap();
        let v1 = catalog.version("Version_1").unwrap().clone();
        let table = catalog.resolve_table("Origin", &v1, TableNaming::Ticked).unwrap();
        assert_eq!(table.column_names(), vec!["Id", "Item1", "Item2", "Item3"]);
        assert_eq!(table.column("Item3").unwrap().migration_expr(), "'none'");
    }

    #[test]
    fn test_build_catalog_rejects_bad_since() {
        let yaml = r#"
versions: [V0]
entities:
  - name: Thing
    columns:
      - { name: A, sql_type: TEXT, since: V7 }
"#;
        let config = SchemaConfig::from_yaml_str(yaml).unwrap();
        assert!(config.build_catalog().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yml");
        let config = SchemaConfig::from_yaml_str(sample_yaml()).unwrap();
        config.save(&path).unwrap();
        let loaded = SchemaConfig::load(&path).unwrap();
        assert_eq!(loaded.versions, config.versions);
        assert_eq!(loaded.mode, config.mode);
        assert_eq!(loaded.entities[0].columns, config.entities[0].columns);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(SchemaConfig::load("/nonexistent/schema.yml").is_err());
    }
}
