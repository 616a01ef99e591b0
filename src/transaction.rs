// src/transaction.rs

//! Unit of work over a transactional resource
//!
//! A [`UnitOfWork`] bounds one logical operation. While a scope is active it
//! exposes the repository; on scope exit, normal or error, it rolls the
//! transaction back unless [`commit`](UnitOfWork::commit) was called first.
//! Rollback-by-default protects multi-step sequences (snapshot, trigger,
//! persist) from leaving partial bookkeeping behind on any failure.
//!
//! Entering a scope begins a transaction if none is active; entering while
//! a transaction is already active is a no-op.

use rusqlite::Connection;
use std::rc::Rc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::repository::Repository;

/// A resource exposing transactional semantics
pub trait TransactionalResource {
    /// Begin a transaction
    fn begin(&mut self) -> Result<()>;

    /// Commit the active transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the active transaction
    fn rollback(&mut self) -> Result<()>;

    /// True while a transaction is active
    fn in_transaction(&self) -> bool;
}

/// Transactional resource over a SQLite connection
pub struct SqliteResource {
    conn: Rc<Connection>,
}

impl SqliteResource {
    /// Create a resource over a database connection
    pub fn new(conn: Rc<Connection>) -> Self {
        Self { conn }
    }
}

impl TransactionalResource for SqliteResource {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

/// Transactional scope around repository operations
pub struct UnitOfWork<R: TransactionalResource> {
    resource: R,
    records: Repository,
    depth: u32,
    committed: bool,
    scope_id: Option<Uuid>,
}

impl UnitOfWork<SqliteResource> {
    /// Create a unit of work over a SQLite connection and repository
    pub fn sqlite(conn: Rc<Connection>, records: Repository) -> Self {
        Self::new(SqliteResource::new(conn), records)
    }
}

impl<R: TransactionalResource> UnitOfWork<R> {
    /// Create a unit of work over a transactional resource and repository
    pub fn new(resource: R, records: Repository) -> Self {
        Self {
            resource,
            records,
            depth: 0,
            committed: false,
            scope_id: None,
        }
    }

    /// Run a body inside a scope
    ///
    /// On exit the transaction is rolled back unless the body called
    /// [`commit`](Self::commit). A body error propagates after rollback.
    pub fn scope<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter()?;
        let result = body(self);
        self.exit(result)
    }

    /// The repository, accessible only while a scope is active
    pub fn records(&self) -> Result<&Repository> {
        if self.depth == 0 {
            return Err(Error::NotInScope);
        }
        Ok(&self.records)
    }

    /// Commit the active transaction
    ///
    /// Ends the transaction; a following scope starts fresh.
    pub fn commit(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::NotInScope);
        }
        debug!(scope = ?self.scope_id, "committing unit-of-work scope");
        self.resource.commit()?;
        self.committed = true;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.committed = false;
            let id = Uuid::new_v4();
            debug!(scope = %id, "entering unit-of-work scope");
            self.scope_id = Some(id);
            if !self.resource.in_transaction() {
                self.resource.begin()?;
            }
        }
        self.depth += 1;
        Ok(())
    }

    fn exit<T>(&mut self, result: Result<T>) -> Result<T> {
        self.depth -= 1;
        if self.depth > 0 {
            return result;
        }
        let scope_id = self.scope_id.take();
        if !self.committed && self.resource.in_transaction() {
            debug!(scope = ?scope_id, "rolling back unit-of-work scope");
            if let Err(rollback_error) = self.resource.rollback() {
                // A rollback failure must not mask the body's own error
                match result {
                    Ok(_) => return Err(rollback_error),
                    Err(_) => warn!(
                        scope = ?scope_id,
                        error = %rollback_error,
                        "rollback failed while unwinding a failed scope"
                    ),
                }
            }
        }
        result
    }
}

impl<R: TransactionalResource> std::fmt::Debug for UnitOfWork<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("depth", &self.depth)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}
