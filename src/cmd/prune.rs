use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::style::Stylize;

use crate::repo;

pub fn run(storage_root: &Path, older_than: Duration) -> Result<()> {
    let removed = repo::prune(storage_root, older_than)
        .with_context(|| format!("Failed to prune {}", storage_root.display()))?;

    eprintln!(
        "{} Removed {} checkout(s) older than {}",
        "✔".green(),
        removed.len(),
        humantime::format_duration(older_than)
    );
    Ok(())
}
