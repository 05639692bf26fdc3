//! Tag prototype computation (`tag_prototypes`, `prototype_runs`,
//! `prototype_members`)

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeSet;

use super::PrototypeClassifier;
use crate::core::kmeans::spherical_kmeans;
use crate::core::vector::{bytes_to_embedding, embedding_to_bytes};
use crate::error::{Error, Result};
use crate::labels::{LabelStore, Split};
use crate::search::{EmbeddingIndex, EncoderModel};

pub const ALGORITHM: &str = "spherical-kmeans";

/// One centroid of a tag for one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prototype {
    pub tag: String,
    pub prototype_id: i64,
    pub model: EncoderModel,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub doc_count: i64,
    pub updated_at: String,
    pub notes: Option<String>,
}

/// Audit row written by every recompute
#[derive(Debug, Clone, Serialize)]
pub struct PrototypeRun {
    pub run_id: i64,
    pub model_name: String,
    pub model_version: String,
    pub algorithm: String,
    pub hyperparams: Option<String>,
    pub tag_filter: Option<String>,
    pub created_at: String,
}

/// A labeled file that formed a centroid in a given run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrototypeMember {
    pub run_id: i64,
    pub tag: String,
    pub prototype_id: i64,
    pub file_id: i64,
}

impl<'a> PrototypeClassifier<'a> {
    /// Replace the prototypes of `tag` for `model` with fresh centroids.
    ///
    /// Deterministic for a given input order. An empty `vectors` slice leaves
    /// the tag without prototypes for this model.
    pub fn recompute_prototypes(
        &self,
        tag: &str,
        model: EncoderModel,
        vectors: &[Vec<f32>],
    ) -> Result<Vec<Prototype>> {
        self.replace_prototypes(tag, model, vectors, &[])
    }

    /// `file_ids[i]` is the file behind `vectors[i]`; when given, cluster
    /// membership is recorded against the run.
    fn replace_prototypes(
        &self,
        tag: &str,
        model: EncoderModel,
        vectors: &[Vec<f32>],
        file_ids: &[i64],
    ) -> Result<Vec<Prototype>> {
        if !self.taxonomy.contains(tag) {
            return Err(Error::UnknownTag(tag.to_string()));
        }
        for vector in vectors {
            model.check_vector(vector)?;
        }

        let settings = &self.config.classifier;
        let clusters = spherical_kmeans(vectors, settings.prototype_clusters, settings.max_iterations);
        let updated_at = Utc::now().to_rfc3339();
        let members: Vec<(i64, i64)> = clusters
            .iter()
            .enumerate()
            .flat_map(|(i, cluster)| {
                cluster
                    .members
                    .iter()
                    .filter_map(move |&m| file_ids.get(m).map(|&file_id| (i as i64, file_id)))
            })
            .collect();
        let prototypes: Vec<Prototype> = clusters
            .into_iter()
            .enumerate()
            .map(|(i, cluster)| Prototype {
                tag: tag.to_string(),
                prototype_id: i as i64,
                model,
                doc_count: cluster.members.len() as i64,
                embedding: cluster.centroid,
                updated_at: updated_at.clone(),
                notes: Some(format!("{} of {} labeled files", cluster.members.len(), vectors.len())),
            })
            .collect();

        let hyperparams = serde_json::json!({
            "k": settings.prototype_clusters,
            "max_iterations": settings.max_iterations,
            "init": "farthest-point",
        });

        let tx = self.store.write_transaction()?;
        tx.execute(
            "DELETE FROM tag_prototypes WHERE tag = ?1 AND model_name = ?2",
            params![tag, model.as_str()],
        )?;
        for p in &prototypes {
            tx.execute(
                r#"
                INSERT INTO tag_prototypes (tag, prototype_id, model_name, embedding, doc_count, updated_at, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    p.tag,
                    p.prototype_id,
                    model.as_str(),
                    embedding_to_bytes(&p.embedding),
                    p.doc_count,
                    p.updated_at,
                    p.notes,
                ],
            )?;
        }
        tx.execute(
            r#"
            INSERT INTO prototype_runs (model_name, model_version, algorithm, hyperparams, tag_filter, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                model.as_str(),
                self.config.models.model_id(model),
                ALGORITHM,
                hyperparams.to_string(),
                tag,
                updated_at,
            ],
        )?;
        let run_id = tx.last_insert_rowid();
        for (prototype_id, file_id) in &members {
            tx.execute(
                r#"
                INSERT OR IGNORE INTO prototype_members (run_id, tag, prototype_id, file_id)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![run_id, tag, prototype_id, file_id],
            )?;
        }
        tx.commit()?;

        tracing::info!(tag, %model, run_id, files = vectors.len(), prototypes = prototypes.len(), "recomputed prototypes");
        Ok(prototypes)
    }

    /// Recompute `tag` from the stored vectors of its primary-labeled files.
    ///
    /// Files are taken in hash order; files without a `model` vector are
    /// skipped.
    pub fn recompute_from_labels(
        &self,
        tag: &str,
        model: EncoderModel,
        split: Option<Split>,
    ) -> Result<Vec<Prototype>> {
        let labeled = LabelStore::new(self.store, self.taxonomy).primary_members(tag, split)?;
        let index = EmbeddingIndex::new(self.store, &self.config.models);

        let mut vectors = Vec::with_capacity(labeled.len());
        let mut file_ids = Vec::with_capacity(labeled.len());
        for (file_id, hash) in &labeled {
            match index.vector_for(hash, model)? {
                Some(vector) => {
                    vectors.push(vector);
                    file_ids.push(*file_id);
                }
                None => tracing::debug!(tag, file_hash = %hash, %model, "labeled file has no vector, skipped"),
            }
        }
        self.replace_prototypes(tag, model, &vectors, &file_ids)
    }

    /// Recompute every tag that has primary labels, and clear the `model`
    /// prototypes of tags that no longer have any. Returns (tag, prototypes).
    pub fn recompute_all(
        &self,
        model: EncoderModel,
        split: Option<Split>,
    ) -> Result<Vec<(String, usize)>> {
        let mut tags: BTreeSet<String> = LabelStore::new(self.store, self.taxonomy)
            .labeled_tags()?
            .into_iter()
            .collect();
        tags.extend(self.prototype_tags(model)?);

        let mut summary = Vec::with_capacity(tags.len());
        for tag in tags {
            let prototypes = self.recompute_from_labels(&tag, model, split)?;
            summary.push((tag, prototypes.len()));
        }
        Ok(summary)
    }

    /// Tags holding at least one `model` prototype.
    fn prototype_tags(&self, model: EncoderModel) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT tag FROM tag_prototypes WHERE model_name = ?1 ORDER BY tag",
        )?;
        let tags = stmt
            .query_map([model.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    /// Files behind the current prototypes of `tag` for `model`, taken from
    /// the latest run that recomputed it.
    pub fn members(&self, tag: &str, model: EncoderModel) -> Result<Vec<PrototypeMember>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT run_id, tag, prototype_id, file_id
            FROM prototype_members
            WHERE tag = ?1 AND run_id = (
                SELECT MAX(run_id) FROM prototype_runs
                WHERE tag_filter = ?1 AND model_name = ?2
            )
            ORDER BY prototype_id, file_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![tag, model.as_str()], |row| {
                Ok(PrototypeMember {
                    run_id: row.get(0)?,
                    tag: row.get(1)?,
                    prototype_id: row.get(2)?,
                    file_id: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Stored prototypes of `tag` for `model`, by prototype id.
    pub fn prototypes(&self, tag: &str, model: EncoderModel) -> Result<Vec<Prototype>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT tag, prototype_id, embedding, doc_count, updated_at, notes
            FROM tag_prototypes
            WHERE tag = ?1 AND model_name = ?2
            ORDER BY prototype_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![tag, model.as_str()], |row| {
                let blob: Vec<u8> = row.get(2)?;
                Ok(Prototype {
                    tag: row.get(0)?,
                    prototype_id: row.get(1)?,
                    model,
                    embedding: bytes_to_embedding(&blob),
                    doc_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    updated_at: row.get(4)?,
                    notes: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent recompute runs, newest first.
    pub fn runs(&self, limit: usize) -> Result<Vec<PrototypeRun>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT run_id, model_name, model_version, algorithm, hyperparams, tag_filter, created_at
            FROM prototype_runs
            ORDER BY run_id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(PrototypeRun {
                    run_id: row.get(0)?,
                    model_name: row.get(1)?,
                    model_version: row.get(2)?,
                    algorithm: row.get(3)?,
                    hyperparams: row.get(4)?,
                    tag_filter: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
