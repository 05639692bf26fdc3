//! Nearest-neighbor label voting
//!
//! An alternative to prototypes: the primary tags of the k most similar
//! labeled files vote for a query, each weighted by its similarity.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::config::ModelsConfig;
use crate::error::Result;
use crate::labels::Split;
use crate::search::{EmbeddingIndex, EncoderModel};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagVote {
    pub tag: String,
    /// Sum of the similarities of the neighbors carrying the tag
    pub score: f32,
    pub neighbors: usize,
}

pub struct NeighborVote<'a> {
    store: &'a Store,
    models: &'a ModelsConfig,
    k: usize,
    split: Option<Split>,
}

impl<'a> NeighborVote<'a> {
    pub fn new(store: &'a Store, models: &'a ModelsConfig, k: usize) -> Self {
        Self {
            store,
            models,
            k,
            split: None,
        }
    }

    /// Only count neighbors whose labels belong to `split`.
    pub fn with_split(mut self, split: Split) -> Self {
        self.split = Some(split);
        self
    }

    /// Tags voted for `query`, best first (score desc, then label).
    ///
    /// `exclude_hash` drops the query file itself when it is in the index.
    /// Neighbors without primary labels and with non-positive similarity
    /// cast no votes.
    pub fn vote(
        &self,
        model: EncoderModel,
        query: &[f32],
        exclude_hash: Option<&str>,
    ) -> Result<Vec<TagVote>> {
        let index = EmbeddingIndex::new(self.store, self.models);
        let neighbors = index.nearest_neighbors(model, query, usize::MAX, Some(f32::MIN_POSITIVE))?;

        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT tag FROM file_tag_labels
            WHERE file_hash = ?1 AND is_primary = 1 AND (?2 IS NULL OR split = ?2)
            ORDER BY tag
            "#,
        )?;

        let mut tally: BTreeMap<String, (f32, usize)> = BTreeMap::new();
        let mut voters = 0;
        for neighbor in neighbors {
            if voters == self.k {
                break;
            }
            if exclude_hash == Some(neighbor.file_hash.as_str()) {
                continue;
            }
            let tags = stmt
                .query_map(
                    rusqlite::params![neighbor.file_hash, self.split.map(Split::as_str)],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if tags.is_empty() {
                continue;
            }
            voters += 1;
            for tag in tags {
                let entry = tally.entry(tag).or_insert((0.0, 0));
                entry.0 += neighbor.similarity;
                entry.1 += 1;
            }
        }

        let mut votes: Vec<TagVote> = tally
            .into_iter()
            .map(|(tag, (score, neighbors))| TagVote {
                tag,
                score,
                neighbors,
            })
            .collect();
        votes.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.tag.cmp(&b.tag))
        });
        tracing::debug!(%model, k = self.k, voters, tags = votes.len(), "neighbor vote");
        Ok(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::tests::{axis, fixture};
    use crate::core::FileIdentity;
    use crate::labels::{LabelSource, LabelStore};

    #[test]
    fn test_vote_weights_by_similarity() {
        let fx = fixture();
        let index = EmbeddingIndex::new(&fx.store, &fx.config.models);
        let labels = LabelStore::new(&fx.store, &fx.taxonomy);

        let mut near_b = axis(0);
        near_b[1] = 1.0;
        let files = [
            (1, "aa", axis(0), Some(("A.1", Split::Train))),
            (2, "bb", near_b, Some(("B", Split::Train))),
            (3, "cc", axis(0), Some(("A.2", Split::Test))),
            (4, "dd", axis(0), None),
            (5, "ee", axis(1), Some(("B", Split::Train))),
        ];
        for (id, hash, vector, label) in &files {
            let file = FileIdentity::new(*id, hash).unwrap();
            fx.store.register_file(&file, None, None).unwrap();
            index
                .upsert_embedding(hash, "text", EncoderModel::Minilm, vector)
                .unwrap();
            if let Some((tag, split)) = label {
                labels
                    .assign_primary(&file, tag, LabelSource::Human, *split)
                    .unwrap();
            }
        }

        let votes = NeighborVote::new(&fx.store, &fx.config.models, 2)
            .with_split(Split::Train)
            .vote(EncoderModel::Minilm, &axis(0), Some("aa"))
            .unwrap();

        // aa excluded, cc is test split, dd unlabeled, ee orthogonal: bb is
        // the only voter with positive similarity
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].tag, "B");
        assert_eq!(votes[0].neighbors, 1);
        assert!((votes[0].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);

        let votes = NeighborVote::new(&fx.store, &fx.config.models, 3)
            .vote(EncoderModel::Minilm, &axis(0), None)
            .unwrap();
        let tags: Vec<&str> = votes.iter().map(|v| v.tag.as_str()).collect();
        assert_eq!(tags, vec!["A.1", "A.2", "B"]);
    }
}
