//! Classification command
//!
//! Scores a vector (from a JSON file, or a catalogued file's stored vector)
//! against tag prototypes, or by neighbor vote with `--knn`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::*;

use filing_tags::classify::{Classification, NeighborVote, PrototypeClassifier, TagVote};
use filing_tags::core::FileIdentity;
use filing_tags::labels::Split;
use filing_tags::search::{EmbeddingIndex, EncoderModel};

use super::{parse_model, read_vector, Workspace};

pub struct ClassifyArgs {
    pub candidates: Vec<String>,
    pub model: String,
    pub vector: Option<PathBuf>,
    pub file: Option<Vec<String>>,
    pub assign: bool,
    pub split: Option<String>,
    pub knn: Option<usize>,
    pub json: bool,
}

pub fn run(args: ClassifyArgs) -> Result<()> {
    let model = parse_model(&args.model)?;
    let ws = Workspace::open()?;
    let taxonomy = ws.taxonomy()?;

    let file = match args.file.as_deref() {
        Some([id, hash]) => {
            let id: i64 = id.parse().with_context(|| format!("invalid file id: {}", id))?;
            Some(FileIdentity::new(id, hash)?)
        }
        Some(_) => bail!("--file takes an id and a hash"),
        None => None,
    };

    let explicit = !args.candidates.is_empty();
    let candidates: Vec<String> = if !explicit {
        taxonomy.leaves().into_iter().map(String::from).collect()
    } else {
        args.candidates
    };

    if let Some(k) = args.knn {
        let (query, exclude) = match (&file, &args.vector) {
            (Some(file), _) => (stored_vector(&ws, file, model)?, Some(file.hash())),
            (None, Some(path)) => (read_vector(path)?, None),
            (None, None) => bail!("pass --vector <path> or --file <id> <hash>"),
        };
        let mut votes = NeighborVote::new(&ws.store, &ws.config.models, k)
            .vote(model, &query, exclude)?;
        if explicit {
            votes.retain(|v| candidates.contains(&v.tag));
        }
        return print_votes(&votes, args.json);
    }

    let classifier = PrototypeClassifier::new(&ws.store, &taxonomy, &ws.config);
    let results = match (&file, &args.vector) {
        (Some(file), _) if args.assign => {
            let split = match &args.split {
                Some(s) => s.parse::<Split>()?,
                None => ws.config.labels.split,
            };
            let assigned = classifier.label_file(file, model, &candidates, split)?;
            if !args.json {
                for c in &assigned {
                    println!("{} {} labeled {}", "✓".green(), file, c.tag.cyan());
                }
            }
            assigned
        }
        (Some(file), _) => {
            let vector = stored_vector(&ws, file, model)?;
            classifier.classify(&vector, model, &candidates)?
        }
        (None, Some(path)) => classifier.classify(&read_vector(path)?, model, &candidates)?,
        (None, None) => bail!("pass --vector <path> or --file <id> <hash>"),
    };

    print_classifications(&results, args.json)
}

fn stored_vector(ws: &Workspace, file: &FileIdentity, model: EncoderModel) -> Result<Vec<f32>> {
    ws.store.check_identity(file)?;
    EmbeddingIndex::new(&ws.store, &ws.config.models)
        .vector_for(file.hash(), model)?
        .with_context(|| format!("no {} embedding stored for {}", model, file))
}

fn print_classifications(results: &[Classification], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("{} No tag cleared its confidence floor", "!".yellow().bold());
        return Ok(());
    }
    for (i, c) in results.iter().enumerate() {
        println!(
            "{:>3}. {} {} {}",
            i + 1,
            c.tag.cyan(),
            format!("{:.4}", c.similarity).green(),
            format!("(floor {:.2}, prototype #{})", c.confidence_floor, c.prototype_id).dimmed()
        );
    }
    Ok(())
}

fn print_votes(votes: &[TagVote], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(votes)?);
        return Ok(());
    }
    if votes.is_empty() {
        println!("{} No labeled neighbors", "!".yellow().bold());
        return Ok(());
    }
    for (i, v) in votes.iter().enumerate() {
        println!(
            "{:>3}. {} {} {}",
            i + 1,
            v.tag.cyan(),
            format!("{:.4}", v.score).green(),
            format!("({} neighbors)", v.neighbors).dimmed()
        );
    }
    Ok(())
}
