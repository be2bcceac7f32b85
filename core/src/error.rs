//! Error types for catalog construction and configuration loading.

use thiserror::Error;

/// Errors raised while building a [`SchemaCatalog`](crate::SchemaCatalog)
/// or loading a [`SchemaConfig`](crate::SchemaConfig).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A version name was referenced that is not part of the chain.
    #[error("unknown version: {0}")]
    UnknownVersion(String),

    /// A version name appears twice in the chain.
    #[error("duplicate version in chain: {0}")]
    DuplicateVersion(String),

    /// An entity name was referenced that has not been registered.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// An entity was registered twice.
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    /// Two columns of the same entity share a name.
    #[error("duplicate column '{column}' on entity '{entity}'")]
    DuplicateColumn { entity: String, column: String },

    /// An index references a column the entity does not declare.
    #[error("index on entity '{entity}' references unknown column '{column}'")]
    UnknownIndexColumn { entity: String, column: String },

    /// An entity declares no columns at all.
    #[error("entity '{0}' declares no columns")]
    EmptyEntity(String),

    /// A table, column, or version name contains characters that cannot be
    /// used as a bare SQLite identifier.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// A versioning mode carries more than one kind bit.
    #[error("invalid versioning mode {0:#06x}: at most one of BY_TICK, BY_TABLE, BY_ALTER_TABLE may be set")]
    InvalidMode(u32),

    /// Configuration file could not be read or written.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file could not be parsed or serialized.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`CatalogError`].
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Validates that a name is usable as a bare SQLite identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}
