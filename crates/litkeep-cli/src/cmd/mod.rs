//! Subcommand implementations.

pub mod expand;
pub mod ingest;
pub mod init;
pub mod rank;
pub mod report;
pub mod retrieve;
pub mod search;
pub mod status;

use anyhow::{Context, Result};
use litkeep_pipeline::ProjectPaths;
use litkeep_registry::Registry;

use crate::config::Config;

/// Open the project registry with the configured dedup settings.
pub fn open_registry(config: &Config) -> Result<(Registry, ProjectPaths)> {
    let paths = ProjectPaths::new(&config.project.dir);
    let registry = Registry::open(&paths.records(), config.dedup.into())
        .with_context(|| format!("failed to open registry at {}", paths.records().display()))?;
    Ok((registry, paths))
}
