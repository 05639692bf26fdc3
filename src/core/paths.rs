//! Workspace root detection

use std::path::PathBuf;

/// Environment variable for the workspace holding `filing.json` and the database
pub const HOME_ENV: &str = "FILING_HOME";

/// Get workspace root path from environment variable or current directory.
/// Priority: FILING_HOME env var > current directory
pub fn get_workspace_root() -> PathBuf {
    if let Ok(path) = std::env::var(HOME_ENV) {
        let root = PathBuf::from(&path);
        if root.exists() {
            return root;
        }
        tracing::warn!(
            "{} is set to '{}' but path does not exist. Falling back to current directory.",
            HOME_ENV,
            path
        );
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
