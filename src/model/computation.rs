// src/model/computation.rs

//! Computation execution bracketed by environment snapshots
//!
//! A [`Computation`] is single-use: it snapshots the environment, runs the
//! caller's trigger exactly once, snapshots again, and returns a
//! [`ComputationRecord`] built from the after-snapshot. Drift between the
//! two snapshots is observable but never fatal; the trigger's side effect
//! already exists, so the computation warns and returns the record that
//! describes what actually ran.
//!
//! # Computation lifecycle
//!
//! ```text
//! CREATED -> EXECUTING -> COMPLETED
//!                 \
//!                  -> FAILED  (only via the trigger failing)
//! ```
//!
//! Both terminal states reject further execution.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::identity::Identifier;
use crate::model::record::Record;

/// The tracked body of a computation
///
/// Invoked exactly once; a failure propagates out of `execute` unmodified
/// and the computation is not marked completed.
pub type Trigger = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Computation state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationState {
    /// Created, trigger not yet run
    Created,
    /// Trigger running
    Executing,
    /// Trigger ran, record returned - terminal
    Completed,
    /// Trigger failed - terminal
    Failed,
}

impl ComputationState {
    /// Returns true if execution can no longer be started
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The persisted association of an identifier with a captured record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationRecord {
    pub identifier: Identifier,
    pub record: Record,
}

/// Consistency check bracketing a computation
///
/// Created with a before-snapshot; [`finish`](Self::finish) takes the
/// after-snapshot and reports whether the environment stayed consistent.
pub struct ConsistencyCheck<'a> {
    environment: &'a Environment,
    before: Record,
}

impl<'a> ConsistencyCheck<'a> {
    /// Take the before-snapshot and begin the check
    pub fn begin(environment: &'a Environment) -> Result<Self> {
        Ok(Self {
            before: environment.record()?,
            environment,
        })
    }

    /// Take the after-snapshot and finish the check
    pub fn finish(self) -> Result<CheckOutcome> {
        let after = self.environment.record()?;
        Ok(CheckOutcome {
            consistent: self.before == after,
            record: after,
        })
    }
}

/// Result of a finished consistency check
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// True if the before- and after-snapshots are equal
    pub consistent: bool,
    /// The after-snapshot: the environment once the side effect finished
    pub record: Record,
}

/// A single tracked computation
pub struct Computation<'a> {
    identifier: Identifier,
    environment: &'a Environment,
    trigger: Option<Trigger>,
    state: ComputationState,
}

impl<'a> Computation<'a> {
    /// Create a computation over the given environment and trigger
    pub fn new(identifier: Identifier, environment: &'a Environment, trigger: Trigger) -> Self {
        Self {
            identifier,
            environment,
            trigger: Some(trigger),
            state: ComputationState::Created,
        }
    }

    /// The computation's identifier
    #[inline]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The current lifecycle state
    #[inline]
    pub fn state(&self) -> ComputationState {
        self.state
    }

    /// Execute the computation
    ///
    /// Snapshots the environment, runs the trigger once, snapshots again and
    /// returns a record built from the after-snapshot. If the snapshots
    /// differ a drift warning is emitted; the operation still succeeds. A
    /// trigger failure surfaces unmodified and leaves the computation in a
    /// terminal Failed state.
    pub fn execute(&mut self) -> Result<ComputationRecord> {
        if self.state != ComputationState::Created {
            return Err(Error::AlreadyExecuted);
        }

        // A failed before-snapshot leaves the computation in Created; the
        // trigger has not run yet
        let check = self.environment.consistency_check()?;
        self.state = ComputationState::Executing;

        // State was Created, so the trigger is still present
        let trigger = self.trigger.take().ok_or(Error::AlreadyExecuted)?;
        if let Err(e) = trigger() {
            self.state = ComputationState::Failed;
            return Err(Error::Trigger(e));
        }

        let outcome = check.finish()?;
        if !outcome.consistent {
            warn!(
                identifier = %self.identifier,
                "environment changed during execution"
            );
        }

        self.state = ComputationState::Completed;
        Ok(ComputationRecord {
            identifier: self.identifier.clone(),
            record: outcome.record,
        })
    }
}

impl std::fmt::Debug for Computation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computation")
            .field("identifier", &self.identifier)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
