//! Schema version identity and the linear version chain.
//!
//! Every versioned concept has exactly one root [`Version`] and an ordered
//! list of successors. The position of a version in its chain is its
//! *tick*: the root has tick `0`, its immediate successor tick `1`, and so
//! on. Ticks are what decorate physical table names under by-tick
//! versioning (`Origin`, `Origin_1`, `Origin_2`).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result, validate_identifier};

/// One schema version in a [`VersionChain`].
///
/// Versions compare by tick, so `a < b` means `a` precedes `b` in the chain.
///
/// # Examples
///
/// ```
/// use schema_tick_core::Version;
///
/// let origin = Version::root("VersionOrigin");
/// let v1 = origin.successor("Version_1");
/// assert!(origin.is_root());
/// assert_eq!(v1.tick(), 1);
/// assert!(origin < v1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    name: String,
    tick: u32,
}

impl Version {
    /// Creates the root version of a chain.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tick: 0,
        }
    }

    /// Creates the immediate successor of this version.
    pub fn successor(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tick: self.tick + 1,
        }
    }

    /// The version's unique name within its chain.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this version in its chain (root is `0`).
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Returns `true` for the first version of a chain.
    pub fn is_root(&self) -> bool {
        self.tick == 0
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A linear, root-first sequence of schema versions.
///
/// # Examples
///
/// ```
/// use schema_tick_core::VersionChain;
///
/// let chain = VersionChain::new("VersionOrigin")
///     .unwrap()
///     .then("Version_1")
///     .unwrap();
///
/// assert_eq!(chain.len(), 2);
/// assert_eq!(chain.latest().name(), "Version_1");
/// assert_eq!(chain.get("Version_1").unwrap().tick(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// Starts a chain with the given root version name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidIdentifier`] if the name is not a
    /// valid identifier.
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        validate_identifier(&root)?;
        Ok(Self {
            versions: vec![Version::root(root)],
        })
    }

    /// Builds a chain from root-first version names.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = names.into_iter();
        let root = names
            .next()
            .ok_or_else(|| CatalogError::UnknownVersion("<root>".to_string()))?;
        let mut chain = Self::new(root)?;
        for name in names {
            chain.push(name)?;
        }
        Ok(chain)
    }

    /// Appends a successor to the latest version, consuming and returning
    /// the chain for chaining.
    pub fn then(mut self, name: impl Into<String>) -> Result<Self> {
        self.push(name)?;
        Ok(self)
    }

    /// Appends a successor to the latest version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateVersion`] if the name is already
    /// part of the chain.
    pub fn push(&mut self, name: impl Into<String>) -> Result<&Version> {
        let name = name.into();
        validate_identifier(&name)?;
        if self.get(&name).is_some() {
            return Err(CatalogError::DuplicateVersion(name));
        }
        let next = self.latest().successor(name);
        self.versions.push(next);
        Ok(self.latest())
    }

    /// Looks up a version by name.
    pub fn get(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Looks up a version by name, failing with
    /// [`CatalogError::UnknownVersion`] when it is absent.
    pub fn require(&self, name: &str) -> Result<&Version> {
        self.get(name)
            .ok_or_else(|| CatalogError::UnknownVersion(name.to_string()))
    }

    /// The root version.
    pub fn root(&self) -> &Version {
        &self.versions[0]
    }

    /// The most recent version.
    pub fn latest(&self) -> &Version {
        // A chain is never empty: `new` always seeds the root.
        &self.versions[self.versions.len() - 1]
    }

    /// Returns `true` if `version` belongs to this chain.
    pub fn contains(&self, version: &Version) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Iterates versions root first.
    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    /// Number of versions in the chain.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Always `false`; a chain holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_assigns_ticks_in_order() {
        let chain = VersionChain::from_names(["VersionOrigin", "Version_1", "Version_2"]).unwrap();
        let ticks: Vec<u32> = chain.iter().map(Version::tick).collect();
        assert_eq!(ticks, vec![0, 1, 2]);
        assert!(chain.root().is_root());
        assert_eq!(chain.latest().name(), "Version_2");
    }

    #[test]
    fn test_chain_rejects_duplicate_names() {
        let mut chain = VersionChain::new("VersionOrigin").unwrap();
        chain.push("Version_1").unwrap();
        let err = chain.push("Version_1").unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateVersion(name) if name == "Version_1"));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_chain_rejects_invalid_names() {
        assert!(VersionChain::new("bad name").is_err());
        assert!(VersionChain::from_names(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_version_ordering_follows_ticks() {
        let origin = Version::root("Z");
        let v1 = origin.successor("A");
        assert!(origin < v1);
        assert_eq!(v1.to_string(), "A");
    }

    #[test]
    fn test_require_unknown_version() {
        let chain = VersionChain::new("VersionOrigin").unwrap();
        assert!(matches!(
            chain.require("Version_9"),
            Err(CatalogError::UnknownVersion(_))
        ));
    }
}
