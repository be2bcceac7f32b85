//! Versioning mode flags and the strategy kind they select.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::table::TableNaming;

bitflags! {
    /// Bitmask selecting how schema versions are materialized.
    ///
    /// At most one *kind* bit (`BY_TICK`, `BY_TABLE`, `BY_ALTER_TABLE`) may
    /// be set. The two cleanup bits are independent modifiers applied to the
    /// superseded ("casted-off") table after its rows were migrated.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_tick_core::{VersioningKind, VersioningMode};
    ///
    /// let mode = VersioningMode::BY_TICK | VersioningMode::DROP_TABLE_CASTED_OFF;
    /// assert_eq!(mode.kind().unwrap(), VersioningKind::ByTick);
    /// assert!(mode.drops_casted_off());
    /// assert!(!mode.clears_casted_off());
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct VersioningMode: u32 {
        /// One suffixed table per version; old tables are retained.
        const BY_TICK = 0b0000_0001;
        /// Rebuild the table in place under its original name.
        const BY_ALTER_TABLE = 0b0000_0010;
        /// Like `BY_TICK`, but every entity advances independently.
        const BY_TABLE = 0b0000_0100;
        /// Drop the superseded table after migrating its rows.
        const DROP_TABLE_CASTED_OFF = 0b0001_0000;
        /// Delete all rows from the superseded table but keep it.
        const DELETE_ALL_RECORD_IN_TABLE_CASTED_OFF = 0b0010_0000;
    }
}

impl Default for VersioningMode {
    fn default() -> Self {
        Self::BY_TICK
    }
}

/// Strategy kind selected by a [`VersioningMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersioningKind {
    ByTick,
    ByTable,
    ByAlterTable,
    /// No kind bit set; every registry operation is rejected.
    NotSupported,
}

impl VersioningKind {
    /// How physical table names are derived under this kind.
    pub fn naming(self) -> TableNaming {
        match self {
            Self::ByAlterTable => TableNaming::Plain,
            Self::ByTick | Self::ByTable | Self::NotSupported => TableNaming::Ticked,
        }
    }
}

impl VersioningMode {
    const KIND_BITS: Self = Self::BY_TICK
        .union(Self::BY_ALTER_TABLE)
        .union(Self::BY_TABLE);

    /// Determines the strategy kind.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidMode`] when more than one kind bit is set.
    pub fn kind(self) -> Result<VersioningKind> {
        let kind = self.intersection(Self::KIND_BITS);
        if kind == Self::BY_TICK {
            Ok(VersioningKind::ByTick)
        } else if kind == Self::BY_ALTER_TABLE {
            Ok(VersioningKind::ByAlterTable)
        } else if kind == Self::BY_TABLE {
            Ok(VersioningKind::ByTable)
        } else if kind.is_empty() {
            Ok(VersioningKind::NotSupported)
        } else {
            Err(CatalogError::InvalidMode(self.bits()))
        }
    }

    /// `DROP_TABLE_CASTED_OFF` is set.
    pub fn drops_casted_off(self) -> bool {
        self.contains(Self::DROP_TABLE_CASTED_OFF)
    }

    /// `DELETE_ALL_RECORD_IN_TABLE_CASTED_OFF` is set.
    pub fn clears_casted_off(self) -> bool {
        self.contains(Self::DELETE_ALL_RECORD_IN_TABLE_CASTED_OFF)
    }
}
