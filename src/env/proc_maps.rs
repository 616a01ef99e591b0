// src/env/proc_maps.rs

//! Detect shared objects mapped into the running process
//!
//! Reads `/proc/self/maps` and collects the file-backed mappings that are
//! shared objects. The maps file is re-read on every call; what is loaded
//! changes mid-process (dlopen, lazy plugin loading) and memoizing here
//! would hide exactly the drift this crate exists to observe.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ActiveModuleDetector, is_shared_object};
use crate::error::{Error, Result};
use crate::model::record::ModuleFile;

/// Default maps file of the running process
const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Active-module detector backed by the process memory map
#[derive(Debug)]
pub struct ProcMapsDetector {
    maps_path: PathBuf,
}

impl ProcMapsDetector {
    /// Create a detector over `/proc/self/maps`
    pub fn new() -> Self {
        Self::with_maps_path(PROC_SELF_MAPS)
    }

    /// Create a detector reading an alternate maps file
    pub fn with_maps_path(maps_path: impl Into<PathBuf>) -> Self {
        Self {
            maps_path: maps_path.into(),
        }
    }
}

impl Default for ProcMapsDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveModuleDetector for ProcMapsDetector {
    fn detect(&self) -> Result<BTreeSet<ModuleFile>> {
        let content = fs::read_to_string(&self.maps_path).map_err(|e| {
            Error::Environment(format!(
                "Failed to read {}: {e}",
                self.maps_path.display()
            ))
        })?;
        let modules = mapped_shared_objects(&content);
        debug!("found {} active modules", modules.len());
        Ok(modules)
    }
}

/// Extract the shared-object paths from maps-file content
///
/// Maps lines are `address perms offset dev inode [pathname]`. Anonymous
/// mappings have no pathname; unmapped-but-open files show a `(deleted)`
/// suffix and are excluded.
fn mapped_shared_objects(content: &str) -> BTreeSet<ModuleFile> {
    content
        .lines()
        .filter(|line| !line.ends_with("(deleted)"))
        .filter_map(|line| line.split_whitespace().nth(5))
        .filter(|pathname| pathname.starts_with('/'))
        .map(Path::new)
        .filter(|path| is_shared_object(path))
        .map(ModuleFile::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d68579c000-55d6857a0000 r--p 00000000 fd:01 1573080 /usr/bin/cat
7f20acc00000-7f20acc28000 r--p 00000000 fd:01 1583326 /usr/lib/x86_64-linux-gnu/libc.so.6
7f20acc28000-7f20acdbd000 r-xp 00028000 fd:01 1583326 /usr/lib/x86_64-linux-gnu/libc.so.6
7f20ace7a000-7f20ace7c000 rw-p 00000000 00:00 0
7f20acebc000-7f20acebe000 r--p 00000000 fd:01 1583323 /usr/lib/x86_64-linux-gnu/ld-linux-x86-64.so.2
7f20acf00000-7f20acf10000 r-xp 00000000 fd:01 1583399 /usr/lib/x86_64-linux-gnu/libgone.so.1 (deleted)
7ffd3a9f2000-7ffd3aa13000 rw-p 00000000 00:00 0 [stack]
";

    #[test]
    fn test_mapped_shared_objects_are_deduplicated() {
        let modules = mapped_shared_objects(MAPS);
        assert_eq!(
            modules,
            BTreeSet::from([
                ModuleFile::new("/usr/lib/x86_64-linux-gnu/libc.so.6"),
                ModuleFile::new("/usr/lib/x86_64-linux-gnu/ld-linux-x86-64.so.2"),
            ])
        );
    }

    #[test]
    fn test_non_library_mappings_are_excluded() {
        let modules = mapped_shared_objects(MAPS);
        assert!(!modules.contains(&ModuleFile::new("/usr/bin/cat")));
        assert!(!modules.iter().any(|m| m.path().ends_with("[stack]")));
    }

    #[test]
    fn test_deleted_mappings_are_excluded() {
        let modules = mapped_shared_objects(MAPS);
        assert!(
            !modules
                .iter()
                .any(|m| m.path().to_string_lossy().contains("libgone"))
        );
    }

    #[test]
    fn test_detector_reads_alternate_maps_file() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps");
        fs::write(&maps, MAPS).unwrap();

        let detector = ProcMapsDetector::with_maps_path(&maps);
        assert_eq!(detector.detect().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_maps_file_is_an_environment_error() {
        let detector = ProcMapsDetector::with_maps_path("/no/such/maps");
        assert!(matches!(
            detector.detect(),
            Err(Error::Environment(_))
        ));
    }
}
