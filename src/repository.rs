// src/repository.rs

//! At-most-once keyed persistence of computation records
//!
//! The repository stores [`ComputationRecord`]s keyed by identifier and by
//! the storage key obtained through the translator: the canonical form of
//! the caller's external key. Uniqueness is enforced by the database's
//! UNIQUE constraint, not by application-level locking: a race between two
//! writers for the same identifier resolves with the loser's add failing.

use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::db::models::{DistributionEntry, MembershipEntry, ModuleEntry, RecordEntry};
use crate::error::{Error, Result};
use crate::identity::{Identifier, Translator, canonical_key};
use crate::model::computation::ComputationRecord;
use crate::model::record::{Distribution, ModuleFile, Record};

/// Repository of computation records backed by SQLite
pub struct Repository {
    conn: Rc<Connection>,
    translator: Arc<Translator>,
}

impl Repository {
    /// Create a repository over a database connection
    pub fn new(conn: Rc<Connection>, translator: Arc<Translator>) -> Self {
        Self { conn, translator }
    }

    /// Add a computation record
    ///
    /// The storage key is the canonical form of the external key the
    /// identifier was translated from; the identifier must therefore have
    /// been forward-translated by this process's translator. Fails with
    /// [`Error::AlreadyExists`] if a record with this identifier is already
    /// stored.
    pub fn add(&self, comp_rec: &ComputationRecord) -> Result<()> {
        let external = self.translator.to_external(&comp_rec.identifier)?;
        let storage_key = canonical_key(&external)?;
        debug!(identifier = %comp_rec.identifier, "adding computation record");

        let record_id = match RecordEntry::new(comp_rec.identifier.as_str(), storage_key)
            .insert(&self.conn)
        {
            Ok(id) => id,
            Err(Error::Database(e)) if is_unique_violation(&e) => {
                return Err(Error::AlreadyExists(comp_rec.identifier.to_string()));
            }
            Err(e) => return Err(e),
        };

        let record = &comp_rec.record;
        let mut module_ids: HashMap<&ModuleFile, i64> = HashMap::new();
        let all_modules: BTreeSet<&ModuleFile> = record
            .installed()
            .iter()
            .flat_map(|d| d.modules.iter())
            .chain(record.active_modules().iter())
            .collect();
        for module in all_modules {
            let is_active = record.active_modules().contains(module);
            let path = module.path().to_string_lossy().into_owned();
            let id = ModuleEntry::new(record_id, path, is_active).insert(&self.conn)?;
            module_ids.insert(module, id);
        }

        for dist in record.installed() {
            let dist_id =
                DistributionEntry::new(record_id, &dist.name, &dist.version).insert(&self.conn)?;
            for module in &dist.modules {
                // All member modules were inserted above
                if let Some(&module_id) = module_ids.get(module) {
                    MembershipEntry::new(record_id, dist_id, module_id).insert(&self.conn)?;
                }
            }
        }

        Ok(())
    }

    /// Get the computation record stored under an identifier
    pub fn get(&self, identifier: &Identifier) -> Result<ComputationRecord> {
        let entry = self.find_entry(identifier)?;
        let record_id = entry.id.ok_or_else(|| missing(identifier))?;

        let module_rows = ModuleEntry::find_by_record(&self.conn, record_id)?;
        let membership_rows = MembershipEntry::find_by_record(&self.conn, record_id)?;
        let dist_rows = DistributionEntry::find_by_record(&self.conn, record_id)?;

        let modules_by_id: HashMap<i64, ModuleFile> = module_rows
            .iter()
            .filter_map(|m| m.id.map(|id| (id, ModuleFile::new(&m.path))))
            .collect();

        let mut members: HashMap<i64, BTreeSet<ModuleFile>> = HashMap::new();
        for membership in &membership_rows {
            if let Some(module) = modules_by_id.get(&membership.module_id) {
                members
                    .entry(membership.distribution_id)
                    .or_default()
                    .insert(module.clone());
            }
        }

        let installed = dist_rows.into_iter().map(|d| Distribution {
            modules: d.id.and_then(|id| members.remove(&id)).unwrap_or_default(),
            name: d.name,
            version: d.version,
        });
        let active_modules = module_rows
            .iter()
            .filter(|m| m.is_active)
            .map(|m| ModuleFile::new(&m.path));

        Ok(ComputationRecord {
            identifier: identifier.clone(),
            record: Record::new(installed, active_modules),
        })
    }

    /// Remove the computation record stored under an identifier
    pub fn remove(&self, identifier: &Identifier) -> Result<()> {
        self.find_entry(identifier)?;
        RecordEntry::delete(&self.conn, identifier.as_str())
    }

    /// List all stored identifiers
    pub fn iterate(&self) -> Result<Vec<Identifier>> {
        let identifiers = RecordEntry::list_identifiers(&self.conn)?;
        Ok(identifiers.into_iter().map(Identifier::new).collect())
    }

    /// Count stored computation records
    pub fn count(&self) -> Result<usize> {
        RecordEntry::count(&self.conn)
    }

    fn find_entry(&self, identifier: &Identifier) -> Result<RecordEntry> {
        RecordEntry::find_by_identifier(&self.conn, identifier.as_str())?
            .ok_or_else(|| missing(identifier))
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

fn missing(identifier: &Identifier) -> Error {
    Error::NotFound(format!("Computation record '{identifier}'"))
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::{ExternalKey, KeyValue};

    fn setup() -> (Repository, Arc<Translator>) {
        let conn = Rc::new(db::open_in_memory().unwrap());
        let translator = Arc::new(Translator::new());
        (
            Repository::new(conn, Arc::clone(&translator)),
            translator,
        )
    }

    fn external_key(run: i64) -> ExternalKey {
        ExternalKey::from([("run".to_string(), KeyValue::Int(run))])
    }

    fn sample_record() -> Record {
        let ssl = Distribution::with_modules(
            "openssl",
            "3.0.2",
            [ModuleFile::new("/usr/lib/libssl.so.3")],
        );
        let fonts = Distribution::new("fonts-dejavu", "2.37");
        Record::new(
            [ssl, fonts],
            [
                ModuleFile::new("/usr/lib/libssl.so.3"),
                ModuleFile::new("/opt/plugins/libcustom.so"),
            ],
        )
    }

    fn computation_record(translator: &Translator, run: i64, record: Record) -> ComputationRecord {
        let identifier = translator.to_internal(&external_key(run)).unwrap();
        ComputationRecord { identifier, record }
    }

    #[test]
    fn test_roundtrip_preserves_value_equality() {
        let (repo, translator) = setup();
        let comp_rec = computation_record(&translator, 42, sample_record());

        repo.add(&comp_rec).unwrap();
        let fetched = repo.get(&comp_rec.identifier).unwrap();

        assert_eq!(fetched, comp_rec);
    }

    #[test]
    fn test_second_add_fails_with_already_exists() {
        let (repo, translator) = setup();
        let comp_rec = computation_record(&translator, 42, sample_record());

        repo.add(&comp_rec).unwrap();
        let second = repo.add(&comp_rec);

        assert!(matches!(second, Err(Error::AlreadyExists(_))));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_get_unknown_identifier_fails() {
        let (repo, translator) = setup();
        let identifier = translator.to_internal(&external_key(42)).unwrap();

        assert!(matches!(repo.get(&identifier), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_add_requires_forward_translated_identifier() {
        let (repo, _translator) = setup();
        let foreign = Translator::new();
        let comp_rec = computation_record(&foreign, 42, sample_record());

        assert!(matches!(repo.add(&comp_rec), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove() {
        let (repo, translator) = setup();
        let comp_rec = computation_record(&translator, 42, sample_record());

        repo.add(&comp_rec).unwrap();
        repo.remove(&comp_rec.identifier).unwrap();

        assert_eq!(repo.count().unwrap(), 0);
        assert!(matches!(
            repo.remove(&comp_rec.identifier),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_iterate_and_count() {
        let (repo, translator) = setup();
        let first = computation_record(&translator, 42, sample_record());
        let second = computation_record(&translator, 43, Record::new([], []));

        repo.add(&first).unwrap();
        repo.add(&second).unwrap();

        let mut expected = vec![first.identifier.clone(), second.identifier.clone()];
        expected.sort();
        assert_eq!(repo.iterate().unwrap(), expected);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_empty_record_roundtrips() {
        let (repo, translator) = setup();
        let comp_rec = computation_record(&translator, 42, Record::new([], []));

        repo.add(&comp_rec).unwrap();
        let fetched = repo.get(&comp_rec.identifier).unwrap();

        assert_eq!(fetched, comp_rec);
        assert!(fetched.record.installed().is_empty());
    }
}
