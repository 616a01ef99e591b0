// src/service/diff.rs

//! The diff operation

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::identity::{ExternalKey, Translator};
use crate::transaction::{TransactionalResource, UnitOfWork};

/// Outcome of comparing two stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffResult {
    /// True if the two records' distribution sets differ
    pub differ: bool,
}

/// Compares stored environment records
pub struct DiffService<R: TransactionalResource> {
    translator: Arc<Translator>,
    uow: UnitOfWork<R>,
}

impl<R: TransactionalResource> DiffService<R> {
    /// Create a diff service
    pub fn new(translator: Arc<Translator>, uow: UnitOfWork<R>) -> Self {
        Self { translator, uow }
    }

    /// Compare the records stored under two external keys
    ///
    /// Only set-equality of the installed-distribution sets is computed; no
    /// finer-grained delta. Either record missing surfaces as
    /// [`NotFound`](crate::Error::NotFound).
    pub fn diff(&mut self, left: &ExternalKey, right: &ExternalKey) -> Result<DiffResult> {
        let left_id = self.translator.to_internal(left)?;
        let right_id = self.translator.to_internal(right)?;
        debug!(left = %left_id, right = %right_id, "comparing records");

        // Read-only scope; the default rollback on exit is harmless
        self.uow.scope(|uow| {
            let records = uow.records()?;
            let left_rec = records.get(&left_id)?;
            let right_rec = records.get(&right_id)?;
            Ok(DiffResult {
                differ: left_rec.record.installed() != right_rec.record.installed(),
            })
        })
    }
}
