//! Embedding index over `file_embeddings`
//!
//! Each file row holds the source text plus one optional vector per encoder
//! model. Exact search scans one model's vectors; `build_ivf` produces an
//! approximate index for larger catalogs.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;

use super::encoder::Encoder;
use super::ivf::IvfIndex;
use super::model::EncoderModel;
use crate::core::config::{IndexConfig, ModelsConfig};
use crate::core::identity::normalize_hash;
use crate::core::vector::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use crate::error::{Error, Result};
use crate::store::Store;

/// Search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub file_hash: String,
    pub similarity: f32,
}

/// A `file_embeddings` row
#[derive(Debug, Clone, Serialize)]
pub struct FileEmbedding {
    pub file_hash: String,
    pub source_text: Option<String>,
    pub text_length: Option<i64>,
    pub minilm_model: Option<String>,
    pub minilm: Option<Vec<f32>>,
    pub mpnet_model: Option<String>,
    pub mpnet: Option<Vec<f32>>,
    pub updated_at: String,
}

impl FileEmbedding {
    pub fn vector(&self, model: EncoderModel) -> Option<&[f32]> {
        match model {
            EncoderModel::Minilm => self.minilm.as_deref(),
            EncoderModel::Mpnet => self.mpnet.as_deref(),
        }
    }
}

/// Indexing statistics per model
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files: i64,
    pub minilm_vectors: i64,
    pub mpnet_vectors: i64,
    pub last_updated: Option<String>,
}

pub struct EmbeddingIndex<'a> {
    store: &'a Store,
    models: &'a ModelsConfig,
}

impl<'a> EmbeddingIndex<'a> {
    pub fn new(store: &'a Store, models: &'a ModelsConfig) -> Self {
        Self { store, models }
    }

    /// Store or replace `model`'s vector for a file.
    ///
    /// When `source_text` differs from the stored text, the other model's
    /// vector was computed from stale text and is cleared.
    pub fn upsert_embedding(
        &self,
        file_hash: &str,
        source_text: &str,
        model: EncoderModel,
        vector: &[f32],
    ) -> Result<()> {
        self.upsert_with_model_id(file_hash, source_text, model, vector, None)
    }

    fn upsert_with_model_id(
        &self,
        file_hash: &str,
        source_text: &str,
        model: EncoderModel,
        vector: &[f32],
        model_id: Option<&str>,
    ) -> Result<()> {
        model.check_vector(vector)?;
        let file_hash = normalize_hash(file_hash)?;
        let model_id = model_id.unwrap_or_else(|| self.models.model_id(model));

        let tx = self.store.write_transaction()?;

        let registered: Option<i64> = tx
            .query_row("SELECT id FROM files WHERE hash = ?1", [&file_hash], |row| {
                row.get(0)
            })
            .optional()?;
        if registered.is_none() {
            return Err(Error::UnknownFile(file_hash));
        }

        let stored_text: Option<Option<String>> = tx
            .query_row(
                "SELECT source_text FROM file_embeddings WHERE file_hash = ?1",
                [&file_hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(previous) = stored_text {
            if previous.as_deref() != Some(source_text) {
                let other = model.other();
                tx.execute(
                    &format!(
                        "UPDATE file_embeddings SET {} = NULL, {} = NULL WHERE file_hash = ?1",
                        other.model_column(),
                        other.embedding_column()
                    ),
                    [&file_hash],
                )?;
                tracing::debug!(file_hash = %file_hash, stale = %other, "source text changed, cleared stale vector");
            }
        }

        let (model_col, emb_col) = (model.model_column(), model.embedding_column());
        tx.execute(
            &format!(
                r#"
                INSERT INTO file_embeddings (file_hash, source_text, text_length, {model_col}, {emb_col}, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (file_hash) DO UPDATE SET
                    source_text = excluded.source_text,
                    text_length = excluded.text_length,
                    {model_col} = excluded.{model_col},
                    {emb_col} = excluded.{emb_col},
                    updated_at = excluded.updated_at
                "#
            ),
            params![
                file_hash,
                source_text,
                source_text.chars().count() as i64,
                model_id,
                embedding_to_bytes(vector),
                Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        tracing::debug!(file_hash = %file_hash, %model, "upserted embedding");
        Ok(())
    }

    /// Encode `text` with an external encoder and store the result.
    pub fn embed_text(
        &self,
        encoder: &dyn Encoder,
        file_hash: &str,
        text: &str,
        model: EncoderModel,
    ) -> Result<Vec<f32>> {
        let vector = encoder.encode(text, model).map_err(|e| Error::Encoder {
            model,
            message: format!("{:#}", e),
        })?;
        self.upsert_with_model_id(file_hash, text, model, &vector, encoder.model_id(model))?;
        Ok(vector)
    }

    pub fn get(&self, file_hash: &str) -> Result<Option<FileEmbedding>> {
        let file_hash = normalize_hash(file_hash)?;
        let row = self
            .store
            .conn()
            .query_row(
                r#"
                SELECT file_hash, source_text, text_length, minilm_model, minilm_emb,
                       mpnet_model, mpnet_emb, updated_at
                FROM file_embeddings WHERE file_hash = ?1
                "#,
                [file_hash],
                |row| {
                    let minilm: Option<Vec<u8>> = row.get(4)?;
                    let mpnet: Option<Vec<u8>> = row.get(6)?;
                    Ok(FileEmbedding {
                        file_hash: row.get(0)?,
                        source_text: row.get(1)?,
                        text_length: row.get(2)?,
                        minilm_model: row.get(3)?,
                        minilm: minilm.map(|b| bytes_to_embedding(&b)),
                        mpnet_model: row.get(5)?,
                        mpnet: mpnet.map(|b| bytes_to_embedding(&b)),
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// A single file's vector for `model`, if computed.
    pub fn vector_for(&self, file_hash: &str, model: EncoderModel) -> Result<Option<Vec<f32>>> {
        let file_hash = normalize_hash(file_hash)?;
        let blob: Option<Option<Vec<u8>>> = self
            .store
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM file_embeddings WHERE file_hash = ?1",
                    model.embedding_column()
                ),
                [file_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.flatten().map(|b| bytes_to_embedding(&b)))
    }

    /// All (hash, vector) pairs for `model`, ordered by hash.
    pub fn vectors(&self, model: EncoderModel) -> Result<Vec<(String, Vec<f32>)>> {
        let emb_col = model.embedding_column();
        let mut stmt = self.store.conn().prepare(&format!(
            "SELECT file_hash, {emb_col} FROM file_embeddings WHERE {emb_col} IS NOT NULL ORDER BY file_hash"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(1)?;
                Ok((row.get::<_, String>(0)?, bytes_to_embedding(&blob)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Exact cosine search over one model's vectors.
    ///
    /// Results are ordered by similarity descending, then file hash ascending.
    pub fn nearest_neighbors(
        &self,
        model: EncoderModel,
        query: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Neighbor>> {
        model.check_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .vectors(model)?
            .into_iter()
            .map(|(file_hash, vector)| Neighbor {
                similarity: cosine_similarity(query, &vector),
                file_hash,
            });
        Ok(rank_neighbors(candidates, k, min_similarity))
    }

    /// Build an inverted-file index over the current vectors of `model`.
    pub fn build_ivf(
        &self,
        model: EncoderModel,
        config: &IndexConfig,
        max_iterations: usize,
    ) -> Result<IvfIndex> {
        let entries = self.vectors(model)?;
        tracing::info!(%model, vectors = entries.len(), lists = config.lists, "building IVF index");
        IvfIndex::build(model, entries, config.lists, max_iterations)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let stats = self.store.conn().query_row(
            r#"
            SELECT COUNT(*), COUNT(minilm_emb), COUNT(mpnet_emb), MAX(updated_at)
            FROM file_embeddings
            "#,
            [],
            |row| {
                Ok(IndexStats {
                    files: row.get(0)?,
                    minilm_vectors: row.get(1)?,
                    mpnet_vectors: row.get(2)?,
                    last_updated: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Filter by `min_similarity`, order (similarity desc, hash asc) and keep `k`.
pub(crate) fn rank_neighbors<I>(candidates: I, k: usize, min_similarity: Option<f32>) -> Vec<Neighbor>
where
    I: IntoIterator<Item = Neighbor>,
{
    let mut hits: Vec<Neighbor> = candidates
        .into_iter()
        .filter(|n| min_similarity.map_or(true, |min| n.similarity >= min))
        .collect();
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.file_hash.cmp(&b.file_hash))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileIdentity;
    use crate::search::model::MINILM_DIM;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    fn setup(hashes: &[&str]) -> Store {
        let store = Store::open_in_memory().unwrap();
        for (i, hash) in hashes.iter().enumerate() {
            store
                .register_file(&FileIdentity::new(i as i64 + 1, hash).unwrap(), None, None)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_two_file_scenario() {
        let store = setup(&["aa", "bb"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);
        index
            .upsert_embedding("aa", "first", EncoderModel::Minilm, &unit(MINILM_DIM, 0))
            .unwrap();
        index
            .upsert_embedding("bb", "second", EncoderModel::Minilm, &unit(MINILM_DIM, 1))
            .unwrap();

        let hits = index
            .nearest_neighbors(EncoderModel::Minilm, &unit(MINILM_DIM, 0), 1, None)
            .unwrap();
        assert_eq!(
            hits,
            vec![Neighbor {
                file_hash: "aa".into(),
                similarity: 1.0
            }]
        );
    }

    #[test]
    fn test_identical_vector_with_min_one() {
        let store = setup(&["aa", "bb", "cc"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);
        let target: Vec<f32> = (0..MINILM_DIM).map(|i| (i as f32 * 0.37).sin()).collect();
        let near: Vec<f32> = target.iter().map(|x| x + 0.01).collect();
        index
            .upsert_embedding("aa", "t", EncoderModel::Minilm, &near)
            .unwrap();
        index
            .upsert_embedding("bb", "t", EncoderModel::Minilm, &target)
            .unwrap();

        let hits = index
            .nearest_neighbors(EncoderModel::Minilm, &target, 1, Some(1.0))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_hash, "bb");
    }

    #[test]
    fn test_ties_broken_by_hash_and_min_filter() {
        let store = setup(&["cc", "aa", "bb"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);
        for hash in ["cc", "aa"] {
            index
                .upsert_embedding(hash, "x", EncoderModel::Minilm, &unit(MINILM_DIM, 0))
                .unwrap();
        }
        index
            .upsert_embedding("bb", "y", EncoderModel::Minilm, &unit(MINILM_DIM, 1))
            .unwrap();

        let hits = index
            .nearest_neighbors(EncoderModel::Minilm, &unit(MINILM_DIM, 0), 10, Some(0.5))
            .unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.file_hash.as_str()).collect();
        assert_eq!(order, vec!["aa", "cc"]);

        assert!(index
            .nearest_neighbors(EncoderModel::Minilm, &unit(MINILM_DIM, 0), 0, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_models_are_independent() {
        let store = setup(&["aa"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);
        index
            .upsert_embedding("aa", "text", EncoderModel::Mpnet, &unit(768, 3))
            .unwrap();

        let row = index.get("aa").unwrap().unwrap();
        assert!(row.minilm.is_none());
        assert_eq!(row.mpnet_model.as_deref(), Some("all-mpnet-base-v2"));
        assert_eq!(row.text_length, Some(4));
        assert!(index
            .nearest_neighbors(EncoderModel::Minilm, &unit(MINILM_DIM, 0), 5, None)
            .unwrap()
            .is_empty());

        // Same text keeps the other model's vector
        index
            .upsert_embedding("aa", "text", EncoderModel::Minilm, &unit(MINILM_DIM, 0))
            .unwrap();
        let row = index.get("aa").unwrap().unwrap();
        assert!(row.minilm.is_some() && row.mpnet.is_some());

        // New text invalidates it
        index
            .upsert_embedding("aa", "new text", EncoderModel::Minilm, &unit(MINILM_DIM, 1))
            .unwrap();
        let row = index.get("aa").unwrap().unwrap();
        assert!(row.mpnet.is_none());
        assert_eq!(row.vector(EncoderModel::Minilm).unwrap()[1], 1.0);
    }

    #[test]
    fn test_rejections() {
        let store = setup(&["aa"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);

        assert!(matches!(
            index.upsert_embedding("aa", "t", EncoderModel::Mpnet, &unit(MINILM_DIM, 0)),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.upsert_embedding("ff", "t", EncoderModel::Minilm, &unit(MINILM_DIM, 0)),
            Err(Error::UnknownFile(_))
        ));
        // A rejected upsert leaves others unaffected
        index
            .upsert_embedding("aa", "t", EncoderModel::Minilm, &unit(MINILM_DIM, 0))
            .unwrap();
        assert_eq!(index.stats().unwrap().minilm_vectors, 1);
        assert!(matches!(
            index.nearest_neighbors(EncoderModel::Minilm, &[1.0, 0.0], 1, None),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    struct AxisEncoder;

    impl Encoder for AxisEncoder {
        fn encode(&self, text: &str, model: EncoderModel) -> anyhow::Result<Vec<f32>> {
            if text.is_empty() {
                anyhow::bail!("empty text");
            }
            Ok(unit(model.dimension(), text.len() % model.dimension()))
        }

        fn model_id(&self, _model: EncoderModel) -> Option<&str> {
            Some("axis-test")
        }
    }

    #[test]
    fn test_embed_text_with_encoder() {
        let store = setup(&["aa"]);
        let models = ModelsConfig::default();
        let index = EmbeddingIndex::new(&store, &models);

        let v = index
            .embed_text(&AxisEncoder, "aa", "abc", EncoderModel::Minilm)
            .unwrap();
        assert_eq!(v[3], 1.0);
        let row = index.get("aa").unwrap().unwrap();
        assert_eq!(row.minilm_model.as_deref(), Some("axis-test"));
        assert_eq!(row.source_text.as_deref(), Some("abc"));

        assert!(matches!(
            index.embed_text(&AxisEncoder, "aa", "", EncoderModel::Minilm),
            Err(Error::Encoder { .. })
        ));
    }
}
