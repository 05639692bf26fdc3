//! Workspace initialization

use anyhow::{Context, Result};
use colored::*;

use filing_tags::core::config::{Config, CONFIG_FILE};
use filing_tags::core::paths::{get_workspace_root, HOME_ENV};
use filing_tags::store::Store;

pub fn run(force: bool) -> Result<()> {
    let root = get_workspace_root();
    let config_path = root.join(CONFIG_FILE);

    println!("{}", "Filing Catalog Initialization".bold());
    println!("{}", "=".repeat(50));
    println!();

    let existed = config_path.exists();
    let config = if existed && !force {
        println!("{} Using existing {}", "→".blue(), config_path.display());
        Config::load(&root)
    } else {
        let config = Config::default();
        config
            .save(&root)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        let verb = if existed { "Reset" } else { "Created" };
        println!("{} {} {}", "✓".green(), verb, config_path.display());
        config
    };

    let db_path = config.db_path(&root);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&db_path, config.store.timeout())
        .with_context(|| format!("failed to create catalog at {}", db_path.display()))?;
    let tables = store.table_counts()?;
    println!(
        "{} Catalog ready at {} ({} tables)",
        "✓".green(),
        db_path.display(),
        tables.len()
    );

    println!();
    println!(
        "{} Set {} to use this workspace from anywhere",
        "→".dimmed(),
        HOME_ENV.yellow()
    );
    println!(
        "  Next: {} or {}",
        "filing tags import <codes.txt>".cyan(),
        "filing tags add <label>".cyan()
    );

    Ok(())
}
