use anyhow::Result;
use colored::*;
use serde::Serialize;

use filing_tags::core::FileIdentity;
use filing_tags::labels::{FileLabel, LabelSource, LabelStore, Split};
use filing_tags::store::FileRecord;

use super::Workspace;

#[derive(Serialize)]
struct FileLabels {
    file: Option<FileRecord>,
    labels: Vec<FileLabel>,
}

pub fn run_assign(
    id: i64,
    hash: &str,
    tag: &str,
    source: Option<&str>,
    split: Option<&str>,
) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let identity = FileIdentity::new(id, hash)?;

    let source = match source {
        Some(s) => s.parse::<LabelSource>()?,
        None => ws.config.labels.source,
    };
    let split = match split {
        Some(s) => s.parse::<Split>()?,
        None => ws.config.labels.split,
    };

    LabelStore::new(&ws.store, &taxonomy).assign_primary(&identity, tag, source, split)?;
    println!(
        "{} {} labeled {} ({}, {})",
        "✓".green(),
        identity,
        tag.cyan(),
        source,
        split
    );

    let ancestors = taxonomy.ancestors_of(tag)?;
    if !ancestors.is_empty() {
        println!("  {} also under {}", "→".dimmed(), ancestors.join(", "));
    }
    Ok(())
}

pub fn run_remove(id: i64, tag: &str) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    if LabelStore::new(&ws.store, &taxonomy).remove_primary(id, tag)? {
        println!("{} Removed {} from file #{}", "✓".green(), tag.cyan(), id);
    } else {
        println!(
            "{} File #{} has no primary label {}",
            "!".yellow().bold(),
            id,
            tag
        );
    }
    Ok(())
}

pub fn run_list(id: i64, json: bool) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let result = FileLabels {
        file: ws.store.file_by_id(id)?,
        labels: LabelStore::new(&ws.store, &taxonomy).labels_for(id)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match &result.file {
        Some(file) => println!("{} #{} ({})", "File".bold(), file.id, file.hash),
        None => {
            println!("{} File #{} is not registered", "!".yellow().bold(), id);
            return Ok(());
        }
    }
    if result.labels.is_empty() {
        println!("  {} no labels", "→".dimmed());
    }
    for label in &result.labels {
        let tag = if label.is_primary {
            label.tag.green().bold()
        } else {
            label.tag.dimmed()
        };
        println!("  {} [{} / {}]", tag, label.source, label.split);
    }
    Ok(())
}
