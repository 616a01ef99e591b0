// src/service/record.rs

//! The record operation

use std::sync::Arc;
use tracing::debug;

use crate::env::Environment;
use crate::error::Result;
use crate::identity::{ExternalKey, Translator};
use crate::model::computation::{Computation, Trigger};
use crate::transaction::{TransactionalResource, UnitOfWork};

/// Records the environment around tracked computations
pub struct RecordService<R: TransactionalResource> {
    environment: Environment,
    translator: Arc<Translator>,
    uow: UnitOfWork<R>,
}

impl<R: TransactionalResource> RecordService<R> {
    /// Create a record service
    pub fn new(environment: Environment, translator: Arc<Translator>, uow: UnitOfWork<R>) -> Self {
        Self {
            environment,
            translator,
            uow,
        }
    }

    /// Execute a trigger and record the environment around it
    ///
    /// Inside one unit-of-work scope: snapshot the environment, run the
    /// trigger, snapshot again, persist the resulting computation record and
    /// commit. A duplicate key surfaces as [`AlreadyExists`] and the scope
    /// rolls back, but the trigger's real-world side effect has already run
    /// and is not undone. Bookkeeping is transactional; the tracked effect
    /// is not.
    ///
    /// [`AlreadyExists`]: crate::Error::AlreadyExists
    pub fn record(&mut self, key: &ExternalKey, trigger: Trigger) -> Result<()> {
        let identifier = self.translator.to_internal(key)?;
        debug!(identifier = %identifier, "recording computation");

        let environment = &self.environment;
        self.uow.scope(|uow| {
            let mut computation = Computation::new(identifier.clone(), environment, trigger);
            let comp_rec = computation.execute()?;
            uow.records()?.add(&comp_rec)?;
            uow.commit()
        })
    }
}
