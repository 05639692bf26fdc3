//! Inverted-file (IVF) approximate index
//!
//! Vectors are partitioned by a spherical k-means coarse quantizer. A query
//! scans only the `probes` lists whose centroids are closest to it. Probing
//! every list is equivalent to exact search.
//!
//! The index is a snapshot: it does not follow later upserts and is rebuilt
//! from the store on demand. Snapshots persist as bincode.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use super::model::EncoderModel;
use super::vectordb::{rank_neighbors, Neighbor};
use crate::core::kmeans::spherical_kmeans;
use crate::core::vector::cosine_similarity;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    file_hash: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    model: EncoderModel,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<Entry>>,
    built_at: String,
}

impl IvfIndex {
    /// Partition `entries` into at most `lists` inverted lists.
    pub fn build(
        model: EncoderModel,
        entries: Vec<(String, Vec<f32>)>,
        lists: usize,
        max_iterations: usize,
    ) -> Result<Self> {
        for (_, vector) in &entries {
            model.check_vector(vector)?;
        }

        let vectors: Vec<Vec<f32>> = entries.iter().map(|(_, v)| v.clone()).collect();
        let clusters = spherical_kmeans(&vectors, lists.max(1), max_iterations);

        let mut slots: Vec<Option<(String, Vec<f32>)>> = entries.into_iter().map(Some).collect();
        let mut centroids = Vec::with_capacity(clusters.len());
        let mut inverted = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let list: Vec<Entry> = cluster
                .members
                .iter()
                .filter_map(|&i| slots[i].take())
                .map(|(file_hash, vector)| Entry { file_hash, vector })
                .collect();
            centroids.push(cluster.centroid);
            inverted.push(list);
        }

        Ok(Self {
            model,
            centroids,
            lists: inverted,
            built_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn model(&self) -> EncoderModel {
        self.model
    }

    pub fn built_at(&self) -> &str {
        &self.built_at
    }

    pub fn list_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate search. Same ordering and filtering as exact search.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        probes: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Neighbor>> {
        self.model.check_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, c)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let candidates = ranked
            .into_iter()
            .take(probes.max(1))
            .flat_map(|(i, _)| self.lists[i].iter())
            .map(|entry| Neighbor {
                file_hash: entry.file_hash.clone(),
                similarity: cosine_similarity(query, &entry.vector),
            });
        Ok(rank_neighbors(candidates, k, min_similarity))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bincode::serialize(self)?)?;
        tracing::debug!(path = %path.display(), vectors = self.len(), "saved IVF snapshot");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::search::model::MINILM_DIM;

    fn entries(n: usize) -> Vec<(String, Vec<f32>)> {
        (0..n)
            .map(|i| {
                let v: Vec<f32> = (0..MINILM_DIM)
                    .map(|d| ((i * 7 + d * 13) % 17) as f32 - 8.0)
                    .collect();
                (format!("{:04x}", i), v)
            })
            .collect()
    }

    fn exact(data: &[(String, Vec<f32>)], query: &[f32], k: usize) -> Vec<Neighbor> {
        rank_neighbors(
            data.iter().map(|(h, v)| Neighbor {
                file_hash: h.clone(),
                similarity: cosine_similarity(query, v),
            }),
            k,
            None,
        )
    }

    #[test]
    fn test_full_probe_matches_exact() {
        let data = entries(40);
        let index = IvfIndex::build(EncoderModel::Minilm, data.clone(), 6, 20).unwrap();
        assert_eq!(index.len(), 40);
        assert!(index.list_count() <= 6);

        let query = &data[3].1;
        let approx = index.search(query, 5, index.list_count(), None).unwrap();
        assert_eq!(approx, exact(&data, query, 5));
        assert_eq!(approx[0].file_hash, data[3].0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("minilm.ivf");
        let index = IvfIndex::build(EncoderModel::Minilm, entries(12), 3, 10).unwrap();
        index.save(&path).unwrap();

        let loaded = IvfIndex::load(&path).unwrap();
        assert_eq!(loaded.model(), EncoderModel::Minilm);
        assert_eq!(loaded.len(), 12);
        let data = entries(12);
        let query = &data[5].1;
        assert_eq!(
            loaded.search(query, 3, 3, None).unwrap(),
            index.search(query, 3, 3, None).unwrap()
        );
    }

    #[test]
    fn test_empty_and_invalid() {
        let index = IvfIndex::build(EncoderModel::Minilm, Vec::new(), 4, 10).unwrap();
        assert!(index.is_empty());
        assert!(index
            .search(&vec![1.0; MINILM_DIM], 3, 2, None)
            .unwrap()
            .is_empty());
        assert!(matches!(
            index.search(&[1.0], 3, 2, None),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
