//! Prototype-based tag classification
//!
//! Each tag holds one or more centroids per encoder model, computed from the
//! vectors of its primary-labeled files. A file vector is scored against the
//! centroids of candidate leaf tags and kept only above each tag's confidence
//! floor.

mod evaluation;
mod knn;
mod prototypes;

use rusqlite::params;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::core::config::Config;
use crate::core::identity::FileIdentity;
use crate::core::vector::{bytes_to_embedding, cosine_similarity};
use crate::error::{Error, Result};
use crate::labels::{LabelSource, LabelStore, Split};
use crate::search::{EmbeddingIndex, EncoderModel};
use crate::store::Store;
use crate::tags::Taxonomy;

pub use evaluation::{Evaluation, RunMetric, ACCURACY, COVERAGE, EVALUATED};
pub use knn::{NeighborVote, TagVote};
pub use prototypes::{Prototype, PrototypeMember, PrototypeRun, ALGORITHM};

/// A candidate tag that cleared its confidence floor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tag: String,
    pub similarity: f32,
    /// Centroid that produced the best similarity
    pub prototype_id: i64,
    pub confidence_floor: f32,
    pub importance_rank: Option<i32>,
}

pub struct PrototypeClassifier<'a> {
    store: &'a Store,
    taxonomy: &'a Taxonomy,
    config: &'a Config,
}

impl<'a> PrototypeClassifier<'a> {
    pub fn new(store: &'a Store, taxonomy: &'a Taxonomy, config: &'a Config) -> Self {
        Self {
            store,
            taxonomy,
            config,
        }
    }

    /// Score `vector` against the prototypes of `candidates`.
    ///
    /// Non-leaf candidates and tags without prototypes for `model` are
    /// skipped. Results are ordered by similarity (desc), importance rank
    /// (asc, unset last), then label.
    pub fn classify(
        &self,
        vector: &[f32],
        model: EncoderModel,
        candidates: &[String],
    ) -> Result<Vec<Classification>> {
        model.check_vector(vector)?;

        let mut eligible = BTreeSet::new();
        for tag in candidates {
            if self.taxonomy.is_leaf(tag)? {
                eligible.insert(tag.as_str());
            }
        }

        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT prototype_id, embedding FROM tag_prototypes
            WHERE tag = ?1 AND model_name = ?2
            ORDER BY prototype_id
            "#,
        )?;

        let mut results = Vec::new();
        for tag in eligible {
            let centroids = stmt
                .query_map(params![tag, model.as_str()], |row| {
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((row.get::<_, i64>(0)?, bytes_to_embedding(&blob)))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut best: Option<(i64, f32)> = None;
            for (id, centroid) in &centroids {
                let sim = cosine_similarity(vector, centroid);
                if best.map_or(true, |(_, s)| sim > s) {
                    best = Some((*id, sim));
                }
            }
            let Some((prototype_id, similarity)) = best else {
                continue;
            };

            let floor = self.taxonomy.confidence_floor(tag)?;
            if similarity >= floor {
                results.push(Classification {
                    tag: tag.to_string(),
                    similarity,
                    prototype_id,
                    confidence_floor: floor,
                    importance_rank: self.taxonomy.importance_rank(tag)?,
                });
            }
        }

        results.sort_by(compare_classifications);
        tracing::debug!(%model, candidates = candidates.len(), matches = results.len(), "classified vector");
        Ok(results)
    }

    /// Classify a file's stored vector and record the best match(es) as
    /// model-sourced primary labels. Returns the assigned classifications.
    pub fn label_file(
        &self,
        file: &FileIdentity,
        model: EncoderModel,
        candidates: &[String],
        split: Split,
    ) -> Result<Vec<Classification>> {
        self.store.check_identity(file)?;
        let vector = EmbeddingIndex::new(self.store, &self.config.models)
            .vector_for(file.hash(), model)?
            .ok_or_else(|| Error::MissingEmbedding {
                file_hash: file.hash().to_string(),
                model,
            })?;

        let mut matches = self.classify(&vector, model, candidates)?;
        matches.truncate(self.config.classifier.max_primary_labels);

        let labels = LabelStore::new(self.store, self.taxonomy);
        for m in &matches {
            labels.assign_primary(file, &m.tag, LabelSource::Model, split)?;
        }
        tracing::debug!(file = %file, assigned = matches.len(), "labeled file from prototypes");
        Ok(matches)
    }
}

fn compare_classifications(a: &Classification, b: &Classification) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.importance_rank, b.importance_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.tag.cmp(&b.tag))
}
