//! Label store with hierarchical propagation
//!
//! A primary label is always written together with non-primary rows for each
//! of its ancestors, inside one write transaction. Readers therefore never see
//! a primary label without its ancestors.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{LabelSource, Split};
use crate::core::identity::{normalize_hash, FileIdentity};
use crate::error::Result;
use crate::store::files::check_identity;
use crate::store::Store;
use crate::tags::Taxonomy;

/// One label row for a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLabel {
    pub tag: String,
    pub is_primary: bool,
    pub source: LabelSource,
    pub split: Split,
}

pub struct LabelStore<'a> {
    store: &'a Store,
    taxonomy: &'a Taxonomy,
}

impl<'a> LabelStore<'a> {
    pub fn new(store: &'a Store, taxonomy: &'a Taxonomy) -> Self {
        Self { store, taxonomy }
    }

    /// Label `file` with `tag` as primary and propagate ancestor labels.
    ///
    /// Re-assigning an existing primary label refreshes its source and split.
    /// An existing ancestor row for `tag` is promoted to primary. Ancestor rows
    /// that already exist (primary or not) are left as they are.
    pub fn assign_primary(
        &self,
        file: &FileIdentity,
        tag: &str,
        source: LabelSource,
        split: Split,
    ) -> Result<()> {
        let ancestors = self.taxonomy.ancestors_of(tag)?;

        let tx = self.store.write_transaction()?;
        check_identity(&tx, file)?;

        tx.execute(
            r#"
            INSERT INTO file_tag_labels (file_id, file_hash, tag, is_primary, label_source, split)
            VALUES (?1, ?2, ?3, 1, ?4, ?5)
            ON CONFLICT (file_id, tag) DO UPDATE SET
                is_primary = 1,
                label_source = excluded.label_source,
                split = excluded.split
            "#,
            params![file.id(), file.hash(), tag, source.as_str(), split.as_str()],
        )?;

        for ancestor in &ancestors {
            tx.execute(
                r#"
                INSERT INTO file_tag_labels (file_id, file_hash, tag, is_primary, label_source, split)
                VALUES (?1, ?2, ?3, 0, ?4, ?5)
                ON CONFLICT (file_id, tag) DO NOTHING
                "#,
                params![file.id(), file.hash(), ancestor, source.as_str(), split.as_str()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(file = %file, tag, ancestors = ancestors.len(), %source, "assigned primary label");
        Ok(())
    }

    /// Remove a primary label and any ancestor rows it alone implied.
    ///
    /// If `tag` is still an ancestor of another primary label it is demoted to
    /// a non-primary row instead of deleted. Returns false when the file had
    /// no primary `tag` label.
    pub fn remove_primary(&self, file_id: i64, tag: &str) -> Result<bool> {
        let tx = self.store.write_transaction()?;

        let is_primary: Option<bool> = tx
            .query_row(
                "SELECT is_primary FROM file_tag_labels WHERE file_id = ?1 AND tag = ?2",
                params![file_id, tag],
                |row| row.get(0),
            )
            .optional()?;
        if is_primary != Some(true) {
            return Ok(false);
        }

        let remaining: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT tag FROM file_tag_labels WHERE file_id = ?1 AND is_primary = 1 AND tag != ?2",
            )?;
            let rows = stmt
                .query_map(params![file_id, tag], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            rows
        };

        let mut implied = BTreeSet::new();
        for primary in &remaining {
            implied.extend(self.taxonomy.ancestors_of(primary)?);
        }

        if implied.contains(tag) {
            tx.execute(
                "UPDATE file_tag_labels SET is_primary = 0 WHERE file_id = ?1 AND tag = ?2",
                params![file_id, tag],
            )?;
        } else {
            tx.execute(
                "DELETE FROM file_tag_labels WHERE file_id = ?1 AND tag = ?2",
                params![file_id, tag],
            )?;
        }

        let ancestor_rows: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT tag FROM file_tag_labels WHERE file_id = ?1 AND is_primary = 0",
            )?;
            let rows = stmt
                .query_map([file_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            rows
        };
        let mut orphaned = 0;
        for row_tag in ancestor_rows.iter().filter(|t| !implied.contains(*t)) {
            tx.execute(
                "DELETE FROM file_tag_labels WHERE file_id = ?1 AND tag = ?2",
                params![file_id, row_tag],
            )?;
            orphaned += 1;
        }

        tx.commit()?;
        tracing::debug!(file_id, tag, orphaned, "removed primary label");
        Ok(true)
    }

    /// All label rows for a file, ordered by tag.
    pub fn labels_for(&self, file_id: i64) -> Result<Vec<FileLabel>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT tag, is_primary, label_source, split
            FROM file_tag_labels
            WHERE file_id = ?1
            ORDER BY tag
            "#,
        )?;
        let rows = stmt
            .query_map([file_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(tag, is_primary, source, split)| {
                Ok(FileLabel {
                    tag,
                    is_primary,
                    source: source.parse()?,
                    split: split.parse()?,
                })
            })
            .collect()
    }

    /// Hashes of files labeled primary with `tag`, ascending.
    pub fn primary_files(&self, tag: &str, split: Option<Split>) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT file_hash FROM file_tag_labels
            WHERE tag = ?1 AND is_primary = 1 AND (?2 IS NULL OR split = ?2)
            ORDER BY file_hash
            "#,
        )?;
        let hashes = stmt
            .query_map(params![tag, split.map(Split::as_str)], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    /// (file id, hash) of files labeled primary with `tag`, by hash.
    pub fn primary_members(&self, tag: &str, split: Option<Split>) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT file_id, file_hash FROM file_tag_labels
            WHERE tag = ?1 AND is_primary = 1 AND (?2 IS NULL OR split = ?2)
            ORDER BY file_hash
            "#,
        )?;
        let members = stmt
            .query_map(params![tag, split.map(Split::as_str)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Primary tags recorded for a file hash.
    pub fn primary_tags_for_hash(&self, hash: &str) -> Result<Vec<String>> {
        let hash = normalize_hash(hash)?;
        let mut stmt = self.store.conn().prepare(
            "SELECT tag FROM file_tag_labels WHERE file_hash = ?1 AND is_primary = 1 ORDER BY tag",
        )?;
        let tags = stmt
            .query_map([hash], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    /// Tags that currently have at least one primary label.
    pub fn labeled_tags(&self) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT tag FROM file_tag_labels WHERE is_primary = 1 ORDER BY tag",
        )?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }
}

/// Bring a file's ancestor rows in line with `taxonomy`.
///
/// Missing ancestors of its primary labels are inserted as non-primary rows
/// (taking source and split from the first primary, by tag, that implies
/// them); non-primary rows no primary implies are deleted. Runs on the
/// caller's connection so it can share a write transaction. Returns the
/// number of rows inserted plus deleted.
pub(crate) fn rederive_ancestors(conn: &Connection, taxonomy: &Taxonomy, file_id: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        r#"
        SELECT tag, is_primary, file_hash, label_source, split
        FROM file_tag_labels
        WHERE file_id = ?1
        ORDER BY tag
        "#,
    )?;
    let rows = stmt
        .query_map([file_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut implied: BTreeMap<String, (&str, &str, &str)> = BTreeMap::new();
    for (tag, is_primary, hash, source, split) in &rows {
        if !*is_primary {
            continue;
        }
        for ancestor in taxonomy.ancestors_of(tag)? {
            implied
                .entry(ancestor)
                .or_insert((hash.as_str(), source.as_str(), split.as_str()));
        }
    }

    let present: BTreeSet<&str> = rows.iter().map(|(tag, ..)| tag.as_str()).collect();
    let mut changed = 0;
    for (ancestor, (hash, source, split)) in &implied {
        if present.contains(ancestor.as_str()) {
            continue;
        }
        conn.execute(
            r#"
            INSERT INTO file_tag_labels (file_id, file_hash, tag, is_primary, label_source, split)
            VALUES (?1, ?2, ?3, 0, ?4, ?5)
            "#,
            params![file_id, hash, ancestor, source, split],
        )?;
        changed += 1;
    }
    for (tag, ..) in rows.iter().filter(|(tag, is_primary, ..)| !is_primary && !implied.contains_key(tag)) {
        conn.execute(
            "DELETE FROM file_tag_labels WHERE file_id = ?1 AND tag = ?2",
            params![file_id, tag],
        )?;
        changed += 1;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tags::{Tag, TagDatabase};

    struct Fixture {
        store: Store,
        taxonomy: Taxonomy,
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let mut taxonomy = Taxonomy::default();
        {
            let db = TagDatabase::new(&store);
            db.add_tag(&mut taxonomy, Tag::new("A").with_floor(0.5)).unwrap();
            db.add_tag(&mut taxonomy, Tag::new("A.1").with_parent("A").with_floor(0.6))
                .unwrap();
            db.add_tag(&mut taxonomy, Tag::new("A.1.a").with_parent("A.1"))
                .unwrap();
            db.add_tag(&mut taxonomy, Tag::new("A.2").with_parent("A")).unwrap();
            db.add_tag(&mut taxonomy, Tag::new("B")).unwrap();
        }
        for (id, hash) in [(1, "aa01"), (2, "bb02")] {
            store
                .register_file(&FileIdentity::new(id, hash).unwrap(), None, None)
                .unwrap();
        }
        Fixture { store, taxonomy }
    }

    fn file1() -> FileIdentity {
        FileIdentity::new(1, "aa01").unwrap()
    }

    fn summary(labels: &[FileLabel]) -> Vec<(&str, bool)> {
        labels.iter().map(|l| (l.tag.as_str(), l.is_primary)).collect()
    }

    #[test]
    fn test_assign_propagates_ancestors() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A.1", LabelSource::Human, Split::Train)
            .unwrap();

        assert_eq!(
            summary(&labels.labels_for(1).unwrap()),
            vec![("A", false), ("A.1", true)]
        );
    }

    #[test]
    fn test_assign_is_idempotent_and_never_demotes() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A", LabelSource::Human, Split::Train)
            .unwrap();
        labels
            .assign_primary(&file1(), "A.1.a", LabelSource::Model, Split::Test)
            .unwrap();
        labels
            .assign_primary(&file1(), "A.1.a", LabelSource::Model, Split::Test)
            .unwrap();

        let rows = labels.labels_for(1).unwrap();
        assert_eq!(
            summary(&rows),
            vec![("A", true), ("A.1", false), ("A.1.a", true)]
        );
        // The earlier human primary keeps its provenance
        assert_eq!(rows[0].source, LabelSource::Human);
        assert_eq!(rows[2].split, Split::Test);
    }

    #[test]
    fn test_assign_promotes_existing_ancestor_row() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A.1", LabelSource::Rule, Split::Train)
            .unwrap();
        labels
            .assign_primary(&file1(), "A", LabelSource::Human, Split::Train)
            .unwrap();

        assert_eq!(
            summary(&labels.labels_for(1).unwrap()),
            vec![("A", true), ("A.1", true)]
        );
    }

    #[test]
    fn test_identity_mismatch_rejects_whole_assignment() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        let wrong = FileIdentity::new(1, "bb02").unwrap();

        assert!(matches!(
            labels.assign_primary(&wrong, "A.1", LabelSource::Human, Split::Train),
            Err(Error::IdentityMismatch { .. })
        ));
        assert!(labels.labels_for(1).unwrap().is_empty());
        assert!(labels.labels_for(2).unwrap().is_empty());

        let unknown = FileIdentity::new(3, "cc03").unwrap();
        assert!(matches!(
            labels.assign_primary(&unknown, "A", LabelSource::Human, Split::Train),
            Err(Error::UnknownFile(_))
        ));
        assert!(matches!(
            labels.assign_primary(&file1(), "Z", LabelSource::Human, Split::Train),
            Err(Error::UnknownTag(_))
        ));
    }

    #[test]
    fn test_remove_cleans_orphaned_ancestors() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A.1.a", LabelSource::Human, Split::Train)
            .unwrap();
        labels
            .assign_primary(&file1(), "A.2", LabelSource::Human, Split::Train)
            .unwrap();
        labels
            .assign_primary(&file1(), "B", LabelSource::Human, Split::Train)
            .unwrap();

        assert!(labels.remove_primary(1, "A.1.a").unwrap());
        assert_eq!(
            summary(&labels.labels_for(1).unwrap()),
            vec![("A", false), ("A.2", true), ("B", true)]
        );

        assert!(labels.remove_primary(1, "A.2").unwrap());
        assert_eq!(summary(&labels.labels_for(1).unwrap()), vec![("B", true)]);

        // Not primary (or absent) is a no-op
        assert!(!labels.remove_primary(1, "A").unwrap());
        assert!(!labels.remove_primary(2, "B").unwrap());
    }

    #[test]
    fn test_remove_demotes_tag_still_implied() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A", LabelSource::Human, Split::Train)
            .unwrap();
        labels
            .assign_primary(&file1(), "A.1", LabelSource::Human, Split::Train)
            .unwrap();

        assert!(labels.remove_primary(1, "A").unwrap());
        assert_eq!(
            summary(&labels.labels_for(1).unwrap()),
            vec![("A", false), ("A.1", true)]
        );
    }

    #[test]
    fn test_remaining_rows_are_primary_or_implied() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        for tag in ["A.1.a", "A.1", "A.2", "B"] {
            labels
                .assign_primary(&file1(), tag, LabelSource::Human, Split::Train)
                .unwrap();
        }
        for tag in ["A.1", "B", "A.1.a"] {
            labels.remove_primary(1, tag).unwrap();

            let rows = labels.labels_for(1).unwrap();
            let primaries: Vec<&str> = rows
                .iter()
                .filter(|r| r.is_primary)
                .map(|r| r.tag.as_str())
                .collect();
            for row in rows.iter().filter(|r| !r.is_primary) {
                assert!(primaries.iter().any(|p| f
                    .taxonomy
                    .ancestors_of(p)
                    .unwrap()
                    .contains(&row.tag)));
            }
        }
        assert_eq!(
            summary(&labels.labels_for(1).unwrap()),
            vec![("A", false), ("A.2", true)]
        );
    }

    #[test]
    fn test_primary_queries() {
        let f = fixture();
        let labels = LabelStore::new(&f.store, &f.taxonomy);
        labels
            .assign_primary(&file1(), "A.1", LabelSource::Human, Split::Train)
            .unwrap();
        labels
            .assign_primary(
                &FileIdentity::new(2, "bb02").unwrap(),
                "A.1",
                LabelSource::Human,
                Split::Test,
            )
            .unwrap();

        assert_eq!(labels.primary_files("A.1", None).unwrap(), vec!["aa01", "bb02"]);
        assert_eq!(
            labels.primary_files("A.1", Some(Split::Test)).unwrap(),
            vec!["bb02"]
        );
        assert!(labels.primary_files("A", None).unwrap().is_empty());
        assert_eq!(labels.primary_tags_for_hash("BB02").unwrap(), vec!["A.1"]);
        assert_eq!(labels.labeled_tags().unwrap(), vec!["A.1"]);
    }
}
