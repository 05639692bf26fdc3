//! Held-out evaluation of stored prototypes (`prototype_run_metrics`)
//!
//! Files whose human or rule primary labels sit in the evaluated split are
//! classified against every leaf tag. A file is correct when its top match is
//! one of those labels. Model-sourced labels are never used as ground truth.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::PrototypeClassifier;
use crate::error::{Error, Result};
use crate::labels::{LabelSource, Split};
use crate::search::{EmbeddingIndex, EncoderModel};

pub const ACCURACY: &str = "accuracy";
pub const COVERAGE: &str = "coverage";
pub const EVALUATED: &str = "evaluated";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Run the metrics were recorded against
    pub run_id: i64,
    pub model: EncoderModel,
    pub split: Split,
    pub evaluated: usize,
    /// Labeled files without a vector for the model
    pub skipped: usize,
    /// Files with at least one tag above its floor
    pub predicted: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetric {
    pub run_id: i64,
    pub metric_name: String,
    pub split: String,
    pub value: Option<f64>,
    pub computed_at: String,
}

impl<'a> PrototypeClassifier<'a> {
    /// Score the current `model` prototypes on the labeled files of `split`
    /// and record the metrics against the latest `model` run.
    pub fn evaluate(&self, model: EncoderModel, split: Split) -> Result<Evaluation> {
        let run_id = self
            .latest_run(model)?
            .ok_or(Error::NoPrototypeRun(model))?;

        let mut truth: BTreeMap<i64, (String, BTreeSet<String>)> = BTreeMap::new();
        {
            let mut stmt = self.store.conn().prepare(
                r#"
                SELECT file_id, file_hash, tag FROM file_tag_labels
                WHERE is_primary = 1 AND split = ?1 AND label_source != ?2
                "#,
            )?;
            let rows = stmt
                .query_map(params![split.as_str(), LabelSource::Model.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (file_id, hash, tag) in rows {
                truth
                    .entry(file_id)
                    .or_insert_with(|| (hash, BTreeSet::new()))
                    .1
                    .insert(tag);
            }
        }

        let candidates: Vec<String> = self.taxonomy.leaves().into_iter().map(String::from).collect();
        let index = EmbeddingIndex::new(self.store, &self.config.models);

        let (mut evaluated, mut skipped, mut predicted, mut correct) = (0, 0, 0, 0);
        for (file_id, (hash, tags)) in &truth {
            let Some(vector) = index.vector_for(hash, model)? else {
                tracing::debug!(file_id, %model, "evaluation file has no vector, skipped");
                skipped += 1;
                continue;
            };
            evaluated += 1;
            if let Some(top) = self.classify(&vector, model, &candidates)?.first() {
                predicted += 1;
                if tags.contains(&top.tag) {
                    correct += 1;
                }
            }
        }

        let ratio = |n: usize| if evaluated == 0 { 0.0 } else { n as f64 / evaluated as f64 };
        let evaluation = Evaluation {
            run_id,
            model,
            split,
            evaluated,
            skipped,
            predicted,
            correct,
            accuracy: ratio(correct),
            coverage: ratio(predicted),
        };
        self.record_metrics(&evaluation)?;

        tracing::info!(
            run_id,
            %model,
            %split,
            evaluated,
            accuracy = evaluation.accuracy,
            "evaluated prototypes"
        );
        Ok(evaluation)
    }

    fn latest_run(&self, model: EncoderModel) -> Result<Option<i64>> {
        let run_id = self
            .store
            .conn()
            .query_row(
                "SELECT MAX(run_id) FROM prototype_runs WHERE model_name = ?1",
                [model.as_str()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(run_id)
    }

    fn record_metrics(&self, evaluation: &Evaluation) -> Result<()> {
        let computed_at = Utc::now().to_rfc3339();
        let tx = self.store.write_transaction()?;
        for (name, value) in [
            (ACCURACY, evaluation.accuracy),
            (COVERAGE, evaluation.coverage),
            (EVALUATED, evaluation.evaluated as f64),
        ] {
            tx.execute(
                r#"
                INSERT INTO prototype_run_metrics (run_id, metric_name, split, value, computed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (run_id, metric_name, split) DO UPDATE SET
                    value = excluded.value,
                    computed_at = excluded.computed_at
                "#,
                params![
                    evaluation.run_id,
                    name,
                    evaluation.split.as_str(),
                    value,
                    computed_at
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Metrics recorded for a run, by metric then split.
    pub fn run_metrics(&self, run_id: i64) -> Result<Vec<RunMetric>> {
        let mut stmt = self.store.conn().prepare(
            r#"
            SELECT run_id, metric_name, split, value, computed_at
            FROM prototype_run_metrics
            WHERE run_id = ?1
            ORDER BY metric_name, split
            "#,
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                Ok(RunMetric {
                    run_id: row.get(0)?,
                    metric_name: row.get(1)?,
                    split: row.get(2)?,
                    value: row.get(3)?,
                    computed_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::tests::{axis, fixture};
    use crate::core::FileIdentity;
    use crate::labels::LabelStore;

    #[test]
    fn test_evaluate_records_metrics() {
        let fx = fixture();
        let index = EmbeddingIndex::new(&fx.store, &fx.config.models);
        let labels = LabelStore::new(&fx.store, &fx.taxonomy);
        let c = fx.classifier();

        assert!(matches!(
            c.evaluate(EncoderModel::Minilm, Split::Test),
            Err(Error::NoPrototypeRun(EncoderModel::Minilm))
        ));

        let files: [(i64, &str, &str, Option<usize>, LabelSource, Split); 7] = [
            (1, "a1", "A.1", Some(0), LabelSource::Human, Split::Train),
            (2, "b1", "B", Some(1), LabelSource::Human, Split::Train),
            // Held out: right, below every floor, wrong, no vector
            (3, "c1", "A.1", Some(0), LabelSource::Human, Split::Test),
            (4, "c2", "B", Some(2), LabelSource::Human, Split::Test),
            (5, "c3", "A.2", Some(0), LabelSource::Rule, Split::Test),
            (6, "c4", "A.1", None, LabelSource::Human, Split::Test),
            // Model output is not ground truth
            (7, "c5", "B", Some(0), LabelSource::Model, Split::Test),
        ];
        for (id, hash, tag, dim, source, split) in files {
            let file = FileIdentity::new(id, hash).unwrap();
            fx.store.register_file(&file, None, None).unwrap();
            if let Some(dim) = dim {
                index
                    .upsert_embedding(hash, "text", EncoderModel::Minilm, &axis(dim))
                    .unwrap();
            }
            labels.assign_primary(&file, tag, source, split).unwrap();
        }
        c.recompute_all(EncoderModel::Minilm, Some(Split::Train)).unwrap();

        let eval = c.evaluate(EncoderModel::Minilm, Split::Test).unwrap();
        assert_eq!(
            (eval.evaluated, eval.skipped, eval.predicted, eval.correct),
            (3, 1, 2, 1)
        );
        assert!((eval.accuracy - 1.0 / 3.0).abs() < 1e-9);
        assert!((eval.coverage - 2.0 / 3.0).abs() < 1e-9);

        // Re-evaluating overwrites the same rows
        c.evaluate(EncoderModel::Minilm, Split::Test).unwrap();
        let metrics = c.run_metrics(eval.run_id).unwrap();
        let names: Vec<&str> = metrics.iter().map(|m| m.metric_name.as_str()).collect();
        assert_eq!(names, vec![ACCURACY, COVERAGE, EVALUATED]);
        assert!(metrics.iter().all(|m| m.split == "test"));
        assert_eq!(metrics[2].value, Some(3.0));
    }
}
