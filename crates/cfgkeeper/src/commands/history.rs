//! `cfgkeeper history`: list recorded backups.

use cfgkeeper_core::Config;
use cfgkeeper_store::{GitStore, VersionStore};
use chrono::Local;
use std::process::ExitCode;

/// Print up to `limit` versions, newest first.
///
/// Never creates a repository: a path without one simply has no history.
pub async fn show_history(config: &Config, limit: usize) -> anyhow::Result<ExitCode> {
    let repo = &config.repository.path;
    if !repo.join(".git").exists() {
        println!("No backups recorded in {}.", repo.display());
        return Ok(ExitCode::SUCCESS);
    }

    let store = GitStore::open_with(repo, config.store_options())?;
    let versions = store.history(limit).await?;
    if versions.is_empty() {
        println!("No backups recorded in {}.", repo.display());
        return Ok(ExitCode::SUCCESS);
    }

    for version in versions {
        println!(
            "{}  {}  {}",
            version.id.short(),
            version
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            version.message
        );
    }
    Ok(ExitCode::SUCCESS)
}
