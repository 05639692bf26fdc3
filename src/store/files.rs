//! File registry (`files` table)

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::Store;
use crate::core::identity::{normalize_hash, FileIdentity};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub hash: String,
    pub size: Option<i64>,
    pub extension: Option<String>,
}

impl Store {
    /// Register a file, or confirm an existing registration.
    ///
    /// Re-registering the same (id, hash) is a no-op; any other overlap with
    /// a recorded id or hash is an `IdentityMismatch`.
    pub fn register_file(
        &self,
        identity: &FileIdentity,
        size: Option<i64>,
        extension: Option<&str>,
    ) -> Result<()> {
        let tx = self.write_transaction()?;
        match check_identity(&tx, identity) {
            Ok(()) => {}
            Err(Error::UnknownFile(_)) => {
                tx.execute(
                    "INSERT INTO files (id, hash, size, extension) VALUES (?1, ?2, ?3, ?4)",
                    params![identity.id(), identity.hash(), size, extension],
                )?;
                tracing::debug!(file = %identity, "registered file");
            }
            Err(e) => return Err(e),
        }
        tx.commit()?;
        Ok(())
    }

    pub fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT id, hash, size, extension FROM files WHERE id = ?1",
                [id],
                map_file,
            )
            .optional()?;
        Ok(record)
    }

    pub fn file_by_hash(&self, hash: &str) -> Result<Option<FileRecord>> {
        let hash = normalize_hash(hash)?;
        let record = self
            .conn()
            .query_row(
                "SELECT id, hash, size, extension FROM files WHERE hash = ?1",
                [hash],
                map_file,
            )
            .optional()?;
        Ok(record)
    }

    /// Verify an identity against the registry.
    pub fn check_identity(&self, identity: &FileIdentity) -> Result<()> {
        check_identity(self.conn(), identity)
    }
}

fn map_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        hash: row.get(1)?,
        size: row.get(2)?,
        extension: row.get(3)?,
    })
}

/// Identity check usable inside a transaction.
///
/// Both halves of the identity must point at the same `files` row, and any
/// label rows already recorded for the id must carry the same hash.
pub(crate) fn check_identity(conn: &Connection, identity: &FileIdentity) -> Result<()> {
    let by_id: Option<String> = conn
        .query_row(
            "SELECT hash FROM files WHERE id = ?1",
            [identity.id()],
            |row| row.get(0),
        )
        .optional()?;
    let by_hash: Option<i64> = conn
        .query_row(
            "SELECT id FROM files WHERE hash = ?1",
            [identity.hash()],
            |row| row.get(0),
        )
        .optional()?;

    match (by_id, by_hash) {
        (None, None) => return Err(Error::UnknownFile(identity.to_string())),
        (Some(hash), _) if hash != identity.hash() => {
            return Err(identity.mismatch(identity.id(), &hash))
        }
        (_, Some(id)) if id != identity.id() => {
            return Err(identity.mismatch(id, identity.hash()))
        }
        _ => {}
    }

    let label_hash: Option<String> = conn
        .query_row(
            "SELECT file_hash FROM file_tag_labels WHERE file_id = ?1 AND file_hash != ?2 LIMIT 1",
            params![identity.id(), identity.hash()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(hash) = label_hash {
        return Err(identity.mismatch(identity.id(), &hash));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64, hash: &str) -> FileIdentity {
        FileIdentity::new(id, hash).unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        store
            .register_file(&identity(1, "aa01"), Some(1024), Some("pdf"))
            .unwrap();
        // Idempotent
        store.register_file(&identity(1, "aa01"), None, None).unwrap();

        let record = store.file_by_id(1).unwrap().unwrap();
        assert_eq!(record.hash, "aa01");
        assert_eq!(record.size, Some(1024));
        assert_eq!(store.file_by_hash("AA01").unwrap().unwrap().id, 1);
        assert!(store.file_by_id(2).unwrap().is_none());
    }

    #[test]
    fn test_conflicting_identity_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.register_file(&identity(1, "aa01"), None, None).unwrap();
        store.register_file(&identity(2, "bb02"), None, None).unwrap();

        for bad in [identity(1, "bb02"), identity(1, "cc03"), identity(3, "aa01")] {
            assert!(matches!(
                store.register_file(&bad, None, None),
                Err(Error::IdentityMismatch { .. })
            ));
        }
        assert!(matches!(
            store.check_identity(&identity(9, "ff")),
            Err(Error::UnknownFile(_))
        ));
    }
}
