use anyhow::Result;
use colored::*;

use filing_tags::core::FileIdentity;

use super::Workspace;

pub fn run_add(id: i64, hash: &str, size: Option<i64>, ext: Option<&str>) -> Result<()> {
    let ws = Workspace::open()?;
    let identity = FileIdentity::new(id, hash)?;
    ws.store.register_file(&identity, size, ext)?;
    println!("{} Registered {}", "✓".green(), identity.to_string().cyan());
    Ok(())
}
