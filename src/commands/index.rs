//! Index command - Build the IVF approximate search snapshot

use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Instant;

use filing_tags::core::config::IndexConfig;
use filing_tags::search::EmbeddingIndex;

use super::{parse_model, Workspace};

pub fn run_build(model: &str, lists: Option<usize>, json: bool) -> Result<()> {
    let model = parse_model(model)?;
    let ws = Workspace::open()?;
    let config = IndexConfig {
        lists: lists.unwrap_or(ws.config.index.lists),
        probes: ws.config.index.probes,
    };

    if !json {
        println!("{} Building {} index...", "→".dimmed(), model);
    }

    let started = Instant::now();
    let index = EmbeddingIndex::new(&ws.store, &ws.config.models).build_ivf(
        model,
        &config,
        ws.config.classifier.max_iterations,
    )?;
    let path = ws.ivf_path(model);
    index
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    let duration_ms = started.elapsed().as_millis();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "model": model,
                "vectors": index.len(),
                "lists": index.list_count(),
                "path": path,
                "duration_ms": duration_ms,
            })
        );
    } else {
        println!(
            "{} Indexed {} vectors into {} lists in {:.2}s",
            "✓".green().bold(),
            index.len().to_string().cyan(),
            index.list_count(),
            duration_ms as f64 / 1000.0
        );
        println!("  {} Snapshot saved to: {}", "→".dimmed(), path.display());
    }

    Ok(())
}
