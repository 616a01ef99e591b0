// src/model/record.rs

//! Environment record value objects
//!
//! A [`Record`] is an immutable snapshot of the package environment: the set
//! of installed distributions and the set of modules currently active in the
//! process. Everything here is a value object: equality is structural,
//! order-independent set equality, never object identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A loadable module, identified by its file path
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ModuleFile {
    path: PathBuf,
}

impl ModuleFile {
    /// Create a module file from a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the module's file path
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ModuleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// An installed distribution: a package with the loadable files it owns
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Distribution {
    pub name: String,
    pub version: String,
    pub modules: BTreeSet<ModuleFile>,
}

impl Distribution {
    /// Create a distribution with no module manifest
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            modules: BTreeSet::new(),
        }
    }

    /// Create a distribution with its member modules
    pub fn with_modules(
        name: impl Into<String>,
        version: impl Into<String>,
        modules: impl IntoIterator<Item = ModuleFile>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            modules: modules.into_iter().collect(),
        }
    }

    /// True if at least one member module is in the given active set
    ///
    /// A distribution without a module manifest is never active.
    pub fn is_active(&self, active_modules: &BTreeSet<ModuleFile>) -> bool {
        !self.modules.is_disjoint(active_modules)
    }
}

/// Immutable snapshot of the package environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    installed: BTreeSet<Distribution>,
    active_modules: BTreeSet<ModuleFile>,
}

impl Record {
    /// Create a record from its constituent sets
    pub fn new(
        installed: impl IntoIterator<Item = Distribution>,
        active_modules: impl IntoIterator<Item = ModuleFile>,
    ) -> Self {
        Self {
            installed: installed.into_iter().collect(),
            active_modules: active_modules.into_iter().collect(),
        }
    }

    /// All installed distributions
    #[inline]
    pub fn installed(&self) -> &BTreeSet<Distribution> {
        &self.installed
    }

    /// All modules active in the process
    #[inline]
    pub fn active_modules(&self) -> &BTreeSet<ModuleFile> {
        &self.active_modules
    }

    /// The installed distributions that are active
    pub fn active_distributions(&self) -> impl Iterator<Item = &Distribution> {
        self.installed
            .iter()
            .filter(|d| d.is_active(&self.active_modules))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Record:")?;
        writeln!(f, "    Installed Distributions:")?;
        let name_width = self
            .installed
            .iter()
            .map(|d| d.name.len())
            .max()
            .unwrap_or(0);
        for dist in &self.installed {
            let marker = if dist.is_active(&self.active_modules) {
                '+'
            } else {
                '-'
            };
            writeln!(
                f,
                "        {} {:<name_width$} ({})",
                marker, dist.name, dist.version
            )?;
        }
        writeln!(f, "    Active Modules:")?;
        for module in &self.active_modules {
            writeln!(f, "        {module}")?;
        }
        Ok(())
    }
}
