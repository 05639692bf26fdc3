use anyhow::Result;
use chrono::Local;
use colored::*;
use serde::Serialize;

use filing_tags::search::{EmbeddingIndex, EncoderModel, IndexStats};

use super::Workspace;

#[derive(Serialize)]
struct CatalogStatus {
    timestamp: String,
    database: String,
    tables: Vec<TableCount>,
    tags: usize,
    leaf_tags: usize,
    embeddings: IndexStats,
    snapshots: Vec<Snapshot>,
}

#[derive(Serialize)]
struct TableCount {
    table: &'static str,
    rows: i64,
}

#[derive(Serialize)]
struct Snapshot {
    model: EncoderModel,
    exists: bool,
    size_bytes: u64,
}

pub fn run(json: bool) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;

    let tables = ws
        .store
        .table_counts()?
        .into_iter()
        .map(|(table, rows)| TableCount { table, rows })
        .collect();

    let snapshots = EncoderModel::ALL
        .iter()
        .map(|&model| {
            let size = std::fs::metadata(ws.ivf_path(model)).map(|m| m.len()).ok();
            Snapshot {
                model,
                exists: size.is_some(),
                size_bytes: size.unwrap_or(0),
            }
        })
        .collect();

    let status = CatalogStatus {
        timestamp: Local::now().to_rfc3339(),
        database: ws.config.db_path(&ws.root).display().to_string(),
        tables,
        tags: taxonomy.len(),
        leaf_tags: taxonomy.leaves().len(),
        embeddings: EmbeddingIndex::new(&ws.store, &ws.config.models).stats()?,
        snapshots,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &CatalogStatus) {
    println!("{}", "Catalog Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("  {} {}", "Database:".dimmed(), status.database);
    println!(
        "  {} {} ({} leaves)",
        "Tags:".dimmed(),
        status.tags.to_string().cyan(),
        status.leaf_tags
    );
    println!();

    println!("{}", "Tables".cyan().bold());
    for t in &status.tables {
        println!("  {:<18} {:>8}", t.table, t.rows);
    }
    println!();

    println!("{}", "Embeddings".cyan().bold());
    println!("  {:<18} {:>8}", "files", status.embeddings.files);
    println!("  {:<18} {:>8}", "minilm", status.embeddings.minilm_vectors);
    println!("  {:<18} {:>8}", "mpnet", status.embeddings.mpnet_vectors);
    if let Some(ts) = &status.embeddings.last_updated {
        println!("  {} {}", "Last updated:".dimmed(), ts);
    }
    for s in &status.snapshots {
        if s.exists {
            println!(
                "  {} {} IVF snapshot ({:.2} KB)",
                "✓".green(),
                s.model,
                s.size_bytes as f64 / 1024.0
            );
        } else {
            println!("  {} {} IVF snapshot missing", "→".dimmed(), s.model);
        }
    }
}
