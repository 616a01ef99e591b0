// src/db/models.rs

//! Row models for database entities
//!
//! One struct per table with methods for creating, reading and deleting
//! rows. The repository layer assembles these into domain values; nothing
//! here knows about the domain model.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;

/// A persisted computation record row
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub id: Option<i64>,
    pub identifier: String,
    pub storage_key: String,
    pub created_at: Option<String>,
}

impl RecordEntry {
    /// Create a new record entry
    pub fn new(identifier: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            id: None,
            identifier: identifier.into(),
            storage_key: storage_key.into(),
            created_at: None,
        }
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO records (identifier, storage_key, created_at) VALUES (?1, ?2, ?3)",
            params![&self.identifier, &self.storage_key, &created_at],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        self.created_at = Some(created_at);
        Ok(id)
    }

    /// Find a record by its identifier
    pub fn find_by_identifier(conn: &Connection, identifier: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, identifier, storage_key, created_at FROM records WHERE identifier = ?1",
        )?;
        let entry = stmt.query_row([identifier], Self::from_row).optional()?;
        Ok(entry)
    }

    /// List all stored identifiers
    pub fn list_identifiers(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT identifier FROM records ORDER BY identifier")?;
        let identifiers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(identifiers)
    }

    /// Count stored records
    pub fn count(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete a record by its identifier, cascading to its parts
    pub fn delete(conn: &Connection, identifier: &str) -> Result<()> {
        conn.execute("DELETE FROM records WHERE identifier = ?1", [identifier])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            identifier: row.get(1)?,
            storage_key: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// A distribution captured in a record
#[derive(Debug, Clone)]
pub struct DistributionEntry {
    pub id: Option<i64>,
    pub record_id: i64,
    pub name: String,
    pub version: String,
}

impl DistributionEntry {
    /// Create a new distribution entry
    pub fn new(record_id: i64, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: None,
            record_id,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Insert this distribution into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO distributions (record_id, name, version) VALUES (?1, ?2, ?3)",
            params![&self.record_id, &self.name, &self.version],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all distributions belonging to a record
    pub fn find_by_record(conn: &Connection, record_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, record_id, name, version FROM distributions
             WHERE record_id = ?1 ORDER BY name, version",
        )?;
        let entries = stmt
            .query_map([record_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            record_id: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
        })
    }
}

/// A module file captured in a record
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub id: Option<i64>,
    pub record_id: i64,
    pub path: String,
    pub is_active: bool,
}

impl ModuleEntry {
    /// Create a new module entry
    pub fn new(record_id: i64, path: impl Into<String>, is_active: bool) -> Self {
        Self {
            id: None,
            record_id,
            path: path.into(),
            is_active,
        }
    }

    /// Insert this module into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO modules (record_id, path, is_active) VALUES (?1, ?2, ?3)",
            params![&self.record_id, &self.path, &self.is_active],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all modules belonging to a record
    pub fn find_by_record(conn: &Connection, record_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, record_id, path, is_active FROM modules
             WHERE record_id = ?1 ORDER BY path",
        )?;
        let entries = stmt
            .query_map([record_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            record_id: row.get(1)?,
            path: row.get(2)?,
            is_active: row.get(3)?,
        })
    }
}

/// Membership of a module in a distribution, within one record
#[derive(Debug, Clone)]
pub struct MembershipEntry {
    pub id: Option<i64>,
    pub record_id: i64,
    pub distribution_id: i64,
    pub module_id: i64,
}

impl MembershipEntry {
    /// Create a new membership entry
    pub fn new(record_id: i64, distribution_id: i64, module_id: i64) -> Self {
        Self {
            id: None,
            record_id,
            distribution_id,
            module_id,
        }
    }

    /// Insert this membership into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO memberships (record_id, distribution_id, module_id) VALUES (?1, ?2, ?3)",
            params![&self.record_id, &self.distribution_id, &self.module_id],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all memberships belonging to a record
    pub fn find_by_record(conn: &Connection, record_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, record_id, distribution_id, module_id FROM memberships
             WHERE record_id = ?1",
        )?;
        let entries = stmt
            .query_map([record_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            record_id: row.get(1)?,
            distribution_id: row.get(2)?,
            module_id: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn create_test_db() -> Connection {
        db::open_in_memory().unwrap()
    }

    #[test]
    fn test_record_crud() {
        let conn = create_test_db();

        let mut entry = RecordEntry::new("abc123", r#"{"run":42}"#);
        let id = entry.insert(&conn).unwrap();
        assert!(id > 0);
        assert_eq!(entry.id, Some(id));
        assert!(entry.created_at.is_some());

        let found = RecordEntry::find_by_identifier(&conn, "abc123")
            .unwrap()
            .unwrap();
        assert_eq!(found.storage_key, r#"{"run":42}"#);

        assert_eq!(RecordEntry::count(&conn).unwrap(), 1);
        assert_eq!(
            RecordEntry::list_identifiers(&conn).unwrap(),
            vec!["abc123".to_string()]
        );

        RecordEntry::delete(&conn, "abc123").unwrap();
        assert!(
            RecordEntry::find_by_identifier(&conn, "abc123")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_duplicate_identifier_is_rejected() {
        let conn = create_test_db();

        RecordEntry::new("abc123", r#"{"run":42}"#)
            .insert(&conn)
            .unwrap();
        let result = RecordEntry::new("abc123", r#"{"run":43}"#).insert(&conn);
        assert!(result.is_err());
    }

    #[test]
    fn test_parts_crud() {
        let conn = create_test_db();

        let record_id = RecordEntry::new("abc123", r#"{"run":42}"#)
            .insert(&conn)
            .unwrap();

        let dist_id = DistributionEntry::new(record_id, "openssl", "3.0.2")
            .insert(&conn)
            .unwrap();
        let module_id = ModuleEntry::new(record_id, "/usr/lib/libssl.so.3", true)
            .insert(&conn)
            .unwrap();
        MembershipEntry::new(record_id, dist_id, module_id)
            .insert(&conn)
            .unwrap();

        let dists = DistributionEntry::find_by_record(&conn, record_id).unwrap();
        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].name, "openssl");

        let modules = ModuleEntry::find_by_record(&conn, record_id).unwrap();
        assert_eq!(modules.len(), 1);
        assert!(modules[0].is_active);

        let memberships = MembershipEntry::find_by_record(&conn, record_id).unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].distribution_id, dist_id);
        assert_eq!(memberships[0].module_id, module_id);
    }

    #[test]
    fn test_cascade_delete() {
        let conn = create_test_db();

        let record_id = RecordEntry::new("abc123", r#"{"run":42}"#)
            .insert(&conn)
            .unwrap();
        let dist_id = DistributionEntry::new(record_id, "openssl", "3.0.2")
            .insert(&conn)
            .unwrap();
        let module_id = ModuleEntry::new(record_id, "/usr/lib/libssl.so.3", true)
            .insert(&conn)
            .unwrap();
        MembershipEntry::new(record_id, dist_id, module_id)
            .insert(&conn)
            .unwrap();

        RecordEntry::delete(&conn, "abc123").unwrap();

        assert!(
            DistributionEntry::find_by_record(&conn, record_id)
                .unwrap()
                .is_empty()
        );
        assert!(
            ModuleEntry::find_by_record(&conn, record_id)
                .unwrap()
                .is_empty()
        );
        assert!(
            MembershipEntry::find_by_record(&conn, record_id)
                .unwrap()
                .is_empty()
        );
    }
}
