// src/env/dpkg.rs

//! Enumerate installed distributions from the dpkg database
//!
//! Package names and versions come from `dpkg-query`; per-package file
//! manifests are read directly from `/var/lib/dpkg/info/<package>.list`
//! (with an architecture suffix for multi-arch packages). Member files are
//! restricted to shared objects that still exist on disk; only loadable
//! code counts as a module.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::{DistributionFinder, is_shared_object};
use crate::error::{Error, Result};
use crate::model::record::{Distribution, ModuleFile};

/// Default location of the dpkg info database
const DPKG_INFO_DIR: &str = "/var/lib/dpkg/info";

/// Distribution finder backed by the local dpkg database
///
/// Enumeration is memoized per process by default: installed packages are
/// stable mid-process and a full enumeration reads hundreds of manifest
/// files. Use [`DpkgDistributionFinder::with_fresh`] to re-read on every
/// call.
#[derive(Debug)]
pub struct DpkgDistributionFinder {
    info_dir: PathBuf,
    memoize: bool,
    cache: OnceLock<BTreeSet<Distribution>>,
}

impl DpkgDistributionFinder {
    /// Create a finder over the system dpkg database
    pub fn new() -> Self {
        Self::with_info_dir(DPKG_INFO_DIR)
    }

    /// Create a finder reading manifests from an alternate info directory
    pub fn with_info_dir(info_dir: impl Into<PathBuf>) -> Self {
        Self {
            info_dir: info_dir.into(),
            memoize: true,
            cache: OnceLock::new(),
        }
    }

    /// Disable per-process memoization
    pub fn with_fresh(mut self) -> Self {
        self.memoize = false;
        self
    }

    /// Check if dpkg is available on this system
    pub fn available() -> bool {
        Command::new("dpkg-query")
            .args(["--version"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn enumerate(&self) -> Result<BTreeSet<Distribution>> {
        debug!("querying installed dpkg packages");

        let output = Command::new("dpkg-query")
            .args(["-W", "-f", "${Package}|${Version}|${Architecture}\n"])
            .output()
            .map_err(|e| {
                Error::Environment(format!("Failed to run dpkg-query: {e}. Is dpkg installed?"))
            })?;

        if !output.status.success() {
            return Err(Error::Environment(format!(
                "dpkg-query failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let mut distributions = BTreeSet::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let parts: Vec<&str> = line.split('|').collect();
            if parts.len() < 3 {
                warn!("Skipping malformed dpkg-query output line: {}", line);
                continue;
            }
            let modules = self.member_modules(parts[0], parts[2]);
            distributions.insert(Distribution::with_modules(parts[0], parts[1], modules));
        }

        debug!("found {} installed distributions", distributions.len());
        Ok(distributions)
    }

    /// Read a package's file manifest from the dpkg info database
    ///
    /// A package without a manifest contributes an empty module set.
    fn member_modules(&self, name: &str, arch: &str) -> BTreeSet<ModuleFile> {
        let candidates = [
            self.info_dir.join(format!("{name}.list")),
            self.info_dir.join(format!("{name}:{arch}.list")),
        ];
        for path in &candidates {
            if let Ok(content) = fs::read_to_string(path) {
                return modules_from_manifest(&content);
            }
        }
        BTreeSet::new()
    }
}

impl Default for DpkgDistributionFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributionFinder for DpkgDistributionFinder {
    fn find(&self) -> Result<BTreeSet<Distribution>> {
        if !self.memoize {
            return self.enumerate();
        }
        if let Some(cached) = self.cache.get() {
            return Ok(cached.clone());
        }
        let distributions = self.enumerate()?;
        let _ = self.cache.set(distributions.clone());
        Ok(distributions)
    }
}

/// Parse a dpkg file manifest into member modules
///
/// Keeps shared objects that still exist on disk; everything else in the
/// manifest (directories, docs, config files) is excluded.
fn modules_from_manifest(content: &str) -> BTreeSet<ModuleFile> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Path::new)
        .filter(|path| is_shared_object(path) && path.exists())
        .map(ModuleFile::new)
        .collect()
}
