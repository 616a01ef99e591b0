// src/env/mod.rs

//! Environment snapshotting
//!
//! The [`Environment`] builds [`Record`] snapshots by cross-referencing two
//! injected collaborators: a [`DistributionFinder`] enumerating installed
//! distributions and an [`ActiveModuleDetector`] enumerating the modules
//! currently active in the process. Both are pure queries behind trait seams
//! so units stay independently testable; no process-global state is involved.

mod dpkg;
mod proc_maps;

pub use dpkg::DpkgDistributionFinder;
pub use proc_maps::ProcMapsDetector;

use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::computation::ConsistencyCheck;
use crate::model::record::{Distribution, ModuleFile, Record};

/// Enumerates installed distributions
pub trait DistributionFinder {
    /// Return all installed distributions with their member modules
    fn find(&self) -> Result<BTreeSet<Distribution>>;
}

/// Enumerates modules currently active in the running process
pub trait ActiveModuleDetector {
    /// Return the modules active right now
    ///
    /// Implementations must read fresh state on every call; active modules
    /// change mid-process.
    fn detect(&self) -> Result<BTreeSet<ModuleFile>>;
}

/// True for `libfoo.so` and versioned `libfoo.so.1.2.3` names
pub(crate) fn is_shared_object(path: &std::path::Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.ends_with(".so") || name.contains(".so."),
        None => false,
    }
}

/// The current execution environment
pub struct Environment {
    finder: Box<dyn DistributionFinder>,
    detector: Box<dyn ActiveModuleDetector>,
}

impl Environment {
    /// Create an environment over the given collaborators
    pub fn new(
        finder: Box<dyn DistributionFinder>,
        detector: Box<dyn ActiveModuleDetector>,
    ) -> Self {
        Self { finder, detector }
    }

    /// Create an environment backed by the local system
    ///
    /// Distributions come from the dpkg database, active modules from
    /// `/proc/self/maps`.
    pub fn system() -> Self {
        Self::new(
            Box::new(DpkgDistributionFinder::new()),
            Box::new(ProcMapsDetector::new()),
        )
    }

    /// Record the current state of the environment
    pub fn record(&self) -> Result<Record> {
        let installed = self.finder.find()?;
        let active_modules = self.detector.detect()?;
        Ok(Record::new(installed, active_modules))
    }

    /// Begin a consistency check bracketing a computation
    pub fn consistency_check(&self) -> Result<ConsistencyCheck<'_>> {
        ConsistencyCheck::begin(self)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic finder/detector fakes shared by unit tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Finder returning a scripted sequence of snapshots
    ///
    /// The last snapshot repeats once the script is exhausted.
    pub struct ScriptedFinder {
        script: Mutex<VecDeque<BTreeSet<Distribution>>>,
        last: Mutex<BTreeSet<Distribution>>,
    }

    impl ScriptedFinder {
        pub fn new(script: impl IntoIterator<Item = BTreeSet<Distribution>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                last: Mutex::new(BTreeSet::new()),
            }
        }
    }

    impl DistributionFinder for ScriptedFinder {
        fn find(&self) -> Result<BTreeSet<Distribution>> {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = script.pop_front() {
                *last = next;
            }
            Ok(last.clone())
        }
    }

    /// Detector returning a fixed set of active modules
    pub struct FixedDetector {
        active: BTreeSet<ModuleFile>,
    }

    impl FixedDetector {
        pub fn new(active: impl IntoIterator<Item = ModuleFile>) -> Self {
            Self {
                active: active.into_iter().collect(),
            }
        }

        pub fn empty() -> Self {
            Self::new([])
        }
    }

    impl ActiveModuleDetector for FixedDetector {
        fn detect(&self) -> Result<BTreeSet<ModuleFile>> {
            Ok(self.active.clone())
        }
    }

    /// Environment over a fixed distribution set and fixed active modules
    pub fn fixed_environment(
        installed: impl IntoIterator<Item = Distribution>,
        active: impl IntoIterator<Item = ModuleFile>,
    ) -> Environment {
        Environment::new(
            Box::new(ScriptedFinder::new([installed.into_iter().collect()])),
            Box::new(FixedDetector::new(active)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FixedDetector, ScriptedFinder, fixed_environment};
    use super::*;

    #[test]
    fn test_record_cross_references_finder_and_detector() {
        let ssl = Distribution::with_modules(
            "openssl",
            "3.0.2",
            [ModuleFile::new("/usr/lib/libssl.so.3")],
        );
        let zlib = Distribution::with_modules(
            "zlib1g",
            "1.2.11",
            [ModuleFile::new("/usr/lib/libz.so.1")],
        );
        let environment = fixed_environment(
            [ssl.clone(), zlib],
            [ModuleFile::new("/usr/lib/libssl.so.3")],
        );

        let record = environment.record().unwrap();

        assert_eq!(record.installed().len(), 2);
        let active: Vec<_> = record.active_distributions().collect();
        assert_eq!(active, vec![&ssl]);
    }

    #[test]
    fn test_scripted_finder_repeats_last_snapshot() {
        let first = BTreeSet::from([Distribution::new("zlib1g", "1.2.11")]);
        let second = BTreeSet::from([Distribution::new("zlib1g", "1.2.12")]);
        let environment = Environment::new(
            Box::new(ScriptedFinder::new([first.clone(), second.clone()])),
            Box::new(FixedDetector::empty()),
        );

        assert_eq!(*environment.record().unwrap().installed(), first);
        assert_eq!(*environment.record().unwrap().installed(), second);
        assert_eq!(*environment.record().unwrap().installed(), second);
    }
}
