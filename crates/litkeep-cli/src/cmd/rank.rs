//! Rank subcommand - bibliometric corpus ranking.

use anyhow::Result;
use clap::Args;

use litkeep_pipeline::{RankOptions, run_rank};
use litkeep_registry::DiscoveryMethod;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RankArgs {
    /// Number of top records to show
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Apply this tag to the top records
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only rank records with this tag
    #[arg(long)]
    pub filter_tag: Option<String>,

    /// Only rank records with this discovery method
    #[arg(long)]
    pub method: Option<String>,
}

pub fn run(args: RankArgs, config: &Config) -> Result<()> {
    let (mut registry, _paths) = super::open_registry(config)?;

    let filter_method = match args.method.as_deref() {
        Some(name) => Some(
            DiscoveryMethod::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown discovery method: {name}"))?,
        ),
        None => None,
    };

    let ranked = run_rank(
        &mut registry,
        &RankOptions {
            top: args.top,
            tag: args.tag,
            filter_tag: args.filter_tag,
            filter_method,
        },
    )?;

    for (i, entry) in ranked.iter().enumerate() {
        let year = entry
            .record
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "?".to_string());
        eprintln!(
            "{:>3}. {:.4}  [{}] {} ({year})",
            i + 1,
            entry.score,
            entry.record.citation_count.unwrap_or(0),
            entry.record.title
        );
    }
    Ok(())
}
