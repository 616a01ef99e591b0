// src/lib.rs

//! provenv: computational provenance capture
//!
//! Tracks the software environment around side-effecting computations. For
//! each tracked computation, provenv snapshots the installed distributions
//! and the modules active in the process immediately before and after a
//! caller-supplied trigger runs, persists the after-snapshot under an opaque
//! identifier derived from the caller's composite key, and can later tell
//! whether two stored snapshots differ.
//!
//! # Architecture
//!
//! - Value-object model: records, distributions and modules compare by
//!   content as order-independent sets, never by identity
//! - Injected collaborators: distribution enumeration and active-module
//!   detection sit behind trait seams; dpkg- and /proc/self/maps-backed
//!   implementations are provided
//! - Hash-based identity: callers never leak key material into storage
//! - Unit of work: repository writes happen inside transactional scopes
//!   that roll back by default

pub mod db;
pub mod env;
mod error;
pub mod identity;
pub mod model;
pub mod repository;
pub mod service;
pub mod transaction;

pub use env::{
    ActiveModuleDetector, DistributionFinder, DpkgDistributionFinder, Environment,
    ProcMapsDetector,
};
pub use error::{Error, Result};
pub use identity::{ExternalKey, Identifier, KeyValue, Translator};
pub use model::{
    Computation, ComputationRecord, ComputationState, Distribution, ModuleFile, Record, Trigger,
};
pub use repository::Repository;
pub use service::{DiffResult, DiffService, RecordService};
pub use transaction::{SqliteResource, TransactionalResource, UnitOfWork};
