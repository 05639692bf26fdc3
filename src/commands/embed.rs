use std::path::Path;

use anyhow::{Context, Result};
use colored::*;

use filing_tags::search::EmbeddingIndex;

use super::{parse_model, read_vector, Workspace};

pub fn run(hash: &str, model: &str, text: &str, vector_path: &Path) -> Result<()> {
    let model = parse_model(model)?;
    let vector = read_vector(vector_path)?;

    let ws = Workspace::open()?;
    EmbeddingIndex::new(&ws.store, &ws.config.models)
        .upsert_embedding(hash, text, model, &vector)
        .with_context(|| format!("failed to store {} embedding for {}", model, hash))?;

    println!(
        "{} Stored {}-dim {} vector for {}",
        "✓".green(),
        vector.len(),
        model.to_string().cyan(),
        hash
    );
    Ok(())
}
