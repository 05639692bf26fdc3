use std::path::Path;

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;

use filing_tags::tags::{import_filing_codes, parse_filing_codes, Tag, TagDatabase, Taxonomy};

use super::Workspace;

#[derive(Serialize)]
struct TreeNode<'a> {
    depth: usize,
    label: &'a str,
    parent: Option<&'a str>,
    description: Option<&'a str>,
    rank: Option<i32>,
    floor: f32,
    leaf: bool,
}

#[derive(Serialize)]
struct TagDetail<'a> {
    tag: &'a Tag,
    floor: f32,
    ancestors: Vec<String>,
    children: Vec<&'a str>,
    label_count: usize,
}

fn load_taxonomy(ws: &Workspace) -> Result<Taxonomy> {
    TagDatabase::new(&ws.store)
        .load(ws.config.taxonomy.default_confidence_floor)
        .context("failed to load taxonomy")
}

pub fn run_add(
    label: &str,
    parent: Option<String>,
    description: Option<String>,
    rank: Option<i32>,
    floor: Option<f32>,
    update: bool,
) -> Result<()> {
    let ws = Workspace::open()?;
    let mut taxonomy = load_taxonomy(&ws)?;
    let db = TagDatabase::new(&ws.store);

    if update {
        let stored = taxonomy
            .get(label)
            .cloned()
            .with_context(|| format!("unknown tag: {}", label))?;
        let tag = merge_flags(stored, parent, description, rank, floor);
        let previous = db.update_tag(&mut taxonomy, tag)?;
        println!("{} Updated {}", "✓".green(), previous.label.cyan());
    } else {
        let tag = Tag {
            label: label.to_string(),
            parent_label: parent,
            description,
            importance_rank: rank,
            confidence_floor: floor.or(Some(ws.config.taxonomy.default_confidence_floor)),
        };
        db.add_tag(&mut taxonomy, tag)?;
        println!("{} Added {}", "✓".green(), label.cyan());
    }

    let ancestors = taxonomy.ancestors_of(label)?;
    if !ancestors.is_empty() {
        println!("  {} {}", "→".dimmed(), ancestors.join(" < ").dimmed());
    }
    Ok(())
}

/// Override only the fields given on the command line.
fn merge_flags(
    stored: Tag,
    parent: Option<String>,
    description: Option<String>,
    rank: Option<i32>,
    floor: Option<f32>,
) -> Tag {
    Tag {
        parent_label: parent.or(stored.parent_label),
        description: description.or(stored.description),
        importance_rank: rank.or(stored.importance_rank),
        confidence_floor: floor.or(stored.confidence_floor),
        label: stored.label,
    }
}

pub fn run_import(path: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let codes = parse_filing_codes(&text);

    let ws = Workspace::open()?;
    let mut taxonomy = load_taxonomy(&ws)?;
    let report = import_filing_codes(&TagDatabase::new(&ws.store), &mut taxonomy, &codes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Imported {} codes from {}",
        "✓".green().bold(),
        codes.len().to_string().cyan(),
        path.display()
    );
    println!("  {} {} added", "→".dimmed(), report.added.len());
    println!("  {} {} updated", "→".dimmed(), report.updated.len());
    println!("  {} {} unchanged", "→".dimmed(), report.unchanged);
    Ok(())
}

pub fn run_tree(json: bool) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;

    let mut nodes = Vec::with_capacity(taxonomy.len());
    for (depth, tag) in taxonomy.walk() {
        nodes.push(TreeNode {
            depth,
            label: &tag.label,
            parent: tag.parent_label.as_deref(),
            description: tag.description.as_deref(),
            rank: tag.importance_rank,
            floor: taxonomy.confidence_floor(&tag.label)?,
            leaf: taxonomy.is_leaf(&tag.label)?,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    println!("{}", "Filing Tags".bold());
    println!("{}", "=".repeat(60));
    if nodes.is_empty() {
        println!("{} No tags yet", "!".yellow().bold());
        return Ok(());
    }
    for node in &nodes {
        let indent = "  ".repeat(node.depth);
        let label = if node.leaf {
            node.label.cyan()
        } else {
            node.label.bold()
        };
        let description = node.description.map(|d| format!(" - {}", d)).unwrap_or_default();
        println!(
            "{}{}{} {}",
            indent,
            label,
            description,
            format!("(floor {:.2})", node.floor).dimmed()
        );
    }
    println!();
    println!("{} tags, {} leaves", taxonomy.len(), taxonomy.leaves().len());
    Ok(())
}

pub fn run_show(label: &str, json: bool) -> Result<()> {
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;
    let tag = taxonomy
        .get(label)
        .with_context(|| format!("unknown tag: {}", label))?;

    let detail = TagDetail {
        tag,
        floor: taxonomy.confidence_floor(label)?,
        ancestors: taxonomy.ancestors_of(label)?,
        children: taxonomy.children_of(label)?,
        label_count: TagDatabase::new(&ws.store).label_count(label)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{}", tag.display_label().bold());
    println!("{}", "-".repeat(60));
    if !detail.ancestors.is_empty() {
        println!("Ancestors:  {}", detail.ancestors.join(" < "));
    }
    if !detail.children.is_empty() {
        println!("Children:   {}", detail.children.join(", ").cyan());
    }
    println!("Floor:      {:.2}", detail.floor);
    match tag.importance_rank {
        Some(rank) => println!("Rank:       {}", rank),
        None => println!("Rank:       {}", "unset".dimmed()),
    }
    println!("Labels:     {}", detail.label_count);
    Ok(())
}

pub fn run_remove(label: &str) -> Result<()> {
    let ws = Workspace::open()?;
    let mut taxonomy = load_taxonomy(&ws)?;
    let removed = TagDatabase::new(&ws.store).remove_tag(&mut taxonomy, label)?;
    println!("{} Removed {}", "✓".green(), removed.label.cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_unset_flags() {
        let stored = Tag::new("A.1")
            .with_parent("A")
            .with_description("Invoices")
            .with_rank(2);

        let merged = merge_flags(stored.clone(), Some("B".to_string()), None, None, None);
        assert_eq!(merged.parent_label.as_deref(), Some("B"));
        assert_eq!(merged.description.as_deref(), Some("Invoices"));
        assert_eq!(merged.importance_rank, Some(2));
        assert_eq!(merged.confidence_floor, None);

        let merged = merge_flags(stored, None, None, Some(5), Some(0.8));
        assert_eq!(merged.parent_label.as_deref(), Some("A"));
        assert_eq!(merged.importance_rank, Some(5));
        assert_eq!(merged.confidence_floor, Some(0.8));
    }
}
