//! Tag persistence (`filing_tags`)
//!
//! Every mutation is validated against a staged copy of the taxonomy first,
//! written to the store inside one write transaction second, and swapped into
//! the caller's taxonomy only after the commit. A rejected call changes
//! neither.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

use super::taxonomy::{Tag, Taxonomy};
use crate::error::{Error, Result};
use crate::labels::rederive_ancestors;
use crate::store::Store;

/// One step of a tag batch
#[derive(Debug, Clone, PartialEq)]
pub enum TagChange {
    Add(Tag),
    /// Replace description, parent, rank and floor of an existing tag
    Update(Tag),
}

/// Tag database manager
pub struct TagDatabase<'a> {
    store: &'a Store,
}

impl<'a> TagDatabase<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Load every stored tag into a taxonomy.
    pub fn load(&self, default_floor: f32) -> Result<Taxonomy> {
        let tags = load_tags(self.store.conn())?;
        tracing::debug!(count = tags.len(), "loaded taxonomy");
        Taxonomy::from_tags(tags, default_floor)
    }

    /// Add a new tag.
    pub fn add_tag(&self, taxonomy: &mut Taxonomy, tag: Tag) -> Result<()> {
        self.apply(taxonomy, vec![TagChange::Add(tag)])
    }

    /// Replace description, parent, rank and floor of an existing tag,
    /// returning the previous version.
    pub fn update_tag(&self, taxonomy: &mut Taxonomy, tag: Tag) -> Result<Tag> {
        let previous = taxonomy
            .get(&tag.label)
            .cloned()
            .ok_or_else(|| Error::UnknownTag(tag.label.clone()))?;
        self.apply(taxonomy, vec![TagChange::Update(tag)])?;
        Ok(previous)
    }

    /// Apply `changes` in order, all or nothing.
    ///
    /// Files labeled anywhere under a re-parented tag get their ancestor rows
    /// re-derived in the same transaction.
    pub fn apply(&self, taxonomy: &mut Taxonomy, changes: Vec<TagChange>) -> Result<()> {
        let mut staged = taxonomy.clone();
        let mut moved = Vec::new();
        for change in &changes {
            match change {
                TagChange::Add(tag) => staged.add_tag(tag.clone())?,
                TagChange::Update(tag) => {
                    let previous = staged.update_tag(tag.clone())?;
                    if previous.parent_label != tag.parent_label {
                        moved.push(tag.label.as_str());
                    }
                }
            }
        }

        let tx = self.store.write_transaction()?;
        for change in &changes {
            match change {
                TagChange::Add(tag) => insert_tag(&tx, tag)?,
                TagChange::Update(tag) => update_tag_row(&tx, tag)?,
            }
        }

        let mut files = BTreeSet::new();
        for label in &moved {
            let mut subtree = staged.descendants_of(label)?;
            subtree.insert(label.to_string());
            for tag in &subtree {
                files.extend(primary_file_ids(&tx, tag)?);
            }
        }
        let mut relabeled = 0;
        for file_id in &files {
            relabeled += rederive_ancestors(&tx, &staged, *file_id)?;
        }
        tx.commit()?;

        tracing::debug!(
            changes = changes.len(),
            moved = moved.len(),
            files = files.len(),
            relabeled,
            "applied tag changes"
        );
        *taxonomy = staged;
        Ok(())
    }

    /// Delete a tag with no children and no file labels. Its prototypes cascade.
    pub fn remove_tag(&self, taxonomy: &mut Taxonomy, label: &str) -> Result<Tag> {
        let children = taxonomy.children_of(label)?.len();
        let labels = self.label_count(label)?;
        if children > 0 || labels > 0 {
            return Err(Error::TagInUse {
                label: label.to_string(),
                children,
                labels,
            });
        }

        self.store
            .conn()
            .execute("DELETE FROM filing_tags WHERE label = ?1", [label])?;
        tracing::debug!(label, "removed tag");

        taxonomy.remove_tag(label)
    }

    /// Fetch a single stored tag.
    pub fn get_tag(&self, label: &str) -> Result<Option<Tag>> {
        let tag = self
            .store
            .conn()
            .query_row(
                r#"
                SELECT label, parent_label, description, importance_rank, confidence_floor
                FROM filing_tags WHERE label = ?1
                "#,
                [label],
                map_tag,
            )
            .optional()?;
        Ok(tag)
    }

    /// Number of file labels (primary or ancestor) referencing the tag
    pub fn label_count(&self, label: &str) -> Result<usize> {
        let count: i64 = self.store.conn().query_row(
            "SELECT COUNT(*) FROM file_tag_labels WHERE tag = ?1",
            [label],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn insert_tag(conn: &Connection, tag: &Tag) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO filing_tags (label, parent_label, description, importance_rank, confidence_floor)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            tag.label,
            tag.parent_label,
            tag.description,
            tag.importance_rank,
            tag.confidence_floor.map(f64::from),
        ],
    )?;
    Ok(())
}

fn update_tag_row(conn: &Connection, tag: &Tag) -> Result<()> {
    conn.execute(
        r#"
        UPDATE filing_tags
        SET parent_label = ?2, description = ?3, importance_rank = ?4, confidence_floor = ?5
        WHERE label = ?1
        "#,
        params![
            tag.label,
            tag.parent_label,
            tag.description,
            tag.importance_rank,
            tag.confidence_floor.map(f64::from),
        ],
    )?;
    Ok(())
}

fn primary_file_ids(conn: &Connection, tag: &str) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT file_id FROM file_tag_labels WHERE tag = ?1 AND is_primary = 1")?;
    let ids = stmt
        .query_map([tag], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn load_tags(conn: &Connection) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT label, parent_label, description, importance_rank, confidence_floor
        FROM filing_tags
        ORDER BY label
        "#,
    )?;
    let tags = stmt
        .query_map([], map_tag)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn map_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    let floor: Option<f64> = row.get(4)?;
    Ok(Tag {
        label: row.get(0)?,
        parent_label: row.get(1)?,
        description: row.get(2)?,
        importance_rank: row.get(3)?,
        confidence_floor: floor.map(|f| f as f32),
    })
}
