//! Nearest-neighbor search command

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use filing_tags::search::{EmbeddingIndex, IvfIndex, Neighbor};

use super::{parse_model, read_vector, Workspace};

pub fn run(
    vector_path: &Path,
    model: &str,
    limit: usize,
    min: Option<f32>,
    ivf: bool,
    probes: Option<usize>,
    json: bool,
) -> Result<()> {
    let model = parse_model(model)?;
    let query = read_vector(vector_path)?;
    let ws = Workspace::open()?;

    let hits: Vec<Neighbor> = if ivf {
        let path = ws.ivf_path(model);
        let index = IvfIndex::load(&path).with_context(|| {
            format!(
                "no IVF snapshot at {} (run `filing index build --model {}`)",
                path.display(),
                model
            )
        })?;
        index.search(&query, limit, probes.unwrap_or(ws.config.index.probes), min)?
    } else {
        EmbeddingIndex::new(&ws.store, &ws.config.models).nearest_neighbors(
            model, &query, limit, min,
        )?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("{} No matches", "!".yellow().bold());
        return Ok(());
    }

    let mode = if ivf { "ivf" } else { "exact" };
    println!(
        "{} {} results ({}, {})",
        "→".dimmed(),
        hits.len().to_string().cyan(),
        model,
        mode
    );
    println!();
    for (i, hit) in hits.iter().enumerate() {
        let file = ws
            .store
            .file_by_hash(&hit.file_hash)?
            .map(|f| format!("#{}", f.id))
            .unwrap_or_default();
        println!(
            "{:>3}. {} {} {}",
            i + 1,
            format!("{:.4}", hit.similarity).green(),
            hit.file_hash,
            file.dimmed()
        );
    }
    Ok(())
}
