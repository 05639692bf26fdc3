use anyhow::{bail, Result};
use colored::*;
use serde::Serialize;

use filing_tags::classify::{Prototype, PrototypeClassifier, PrototypeMember};
use filing_tags::labels::Split;

use super::{parse_model, Workspace};

#[derive(Serialize)]
struct StoredPrototypes {
    prototypes: Vec<Prototype>,
    members: Vec<PrototypeMember>,
}

#[derive(Serialize)]
struct Recomputed {
    tag: String,
    prototypes: usize,
}

pub fn run_recompute(model: &str, tag: Option<&str>, split: Option<&str>, json: bool) -> Result<()> {
    let model = parse_model(model)?;
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let split = match split {
        Some(s) => Some(s.parse::<Split>()?),
        None => ws.config.classifier.prototype_split,
    };

    let classifier = PrototypeClassifier::new(&ws.store, &taxonomy, &ws.config);
    let summary: Vec<Recomputed> = match tag {
        Some(tag) => {
            let prototypes = classifier.recompute_from_labels(tag, model, split)?;
            vec![Recomputed {
                tag: tag.to_string(),
                prototypes: prototypes.len(),
            }]
        }
        None => classifier
            .recompute_all(model, split)?
            .into_iter()
            .map(|(tag, prototypes)| Recomputed { tag, prototypes })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.is_empty() {
        println!("{} No labeled tags to recompute", "!".yellow().bold());
        return Ok(());
    }
    for entry in &summary {
        let status = if entry.prototypes == 0 {
            "✗".red()
        } else {
            "✓".green()
        };
        println!(
            "{} {} {} prototype(s)",
            status,
            entry.tag.cyan(),
            entry.prototypes
        );
    }
    Ok(())
}

pub fn run_show(tag: &str, model: &str, json: bool) -> Result<()> {
    let model = parse_model(model)?;
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let classifier = PrototypeClassifier::new(&ws.store, &taxonomy, &ws.config);
    let stored = StoredPrototypes {
        prototypes: classifier.prototypes(tag, model)?,
        members: classifier.members(tag, model)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
        return Ok(());
    }

    println!("{} ({})", tag.bold(), model);
    if stored.prototypes.is_empty() {
        println!("  {} no prototypes", "→".dimmed());
    }
    for p in &stored.prototypes {
        println!(
            "  #{} {} files, updated {}",
            p.prototype_id,
            p.doc_count.to_string().cyan(),
            p.updated_at.dimmed()
        );
        let files: Vec<String> = stored
            .members
            .iter()
            .filter(|m| m.prototype_id == p.prototype_id)
            .map(|m| m.file_id.to_string())
            .collect();
        if !files.is_empty() {
            println!("     {} {}", "files:".dimmed(), files.join(", "));
        }
    }
    Ok(())
}

pub fn run_evaluate(model: &str, split: &str, json: bool) -> Result<()> {
    let model = parse_model(model)?;
    let split = split.parse::<Split>()?;
    if split == Split::Train {
        bail!("evaluate a held-out split (test or val), not train");
    }
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let eval = PrototypeClassifier::new(&ws.store, &taxonomy, &ws.config).evaluate(model, split)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&eval)?);
        return Ok(());
    }

    println!(
        "{} Evaluated {} {} files against run #{}",
        "✓".green().bold(),
        eval.evaluated.to_string().cyan(),
        split,
        eval.run_id
    );
    println!("  {} accuracy {:.3} ({} of {})", "→".dimmed(), eval.accuracy, eval.correct, eval.evaluated);
    println!("  {} coverage {:.3} ({} predicted)", "→".dimmed(), eval.coverage, eval.predicted);
    if eval.skipped > 0 {
        println!("  {} {} files without a {} vector skipped", "!".yellow(), eval.skipped, model);
    }
    Ok(())
}
