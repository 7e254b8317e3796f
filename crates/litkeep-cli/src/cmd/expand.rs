//! Expand subcommand - citation-graph expansion from seed records.

use anyhow::Result;
use clap::{Args, ValueEnum};

use litkeep_pipeline::{ExpandDeps, ExpandOptions, ExpandStrategy, run_expand};
use litkeep_sources::SemanticScholarClient;

use crate::config::Config;

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Strategy {
    Forward,
    Backward,
    Both,
    Recommend,
    All,
}

impl From<Strategy> for ExpandStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Forward => Self::Forward,
            Strategy::Backward => Self::Backward,
            Strategy::Both => Self::Both,
            Strategy::Recommend => Self::Recommend,
            Strategy::All => Self::All,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Tag identifying seed records
    #[arg(long)]
    pub seed_tag: Option<String>,

    /// Expand from these DOIs instead of the seed tag
    #[arg(long = "doi")]
    pub seed_dois: Vec<String>,

    /// Traversal strategy
    #[arg(long, value_enum, default_value = "both")]
    pub strategy: Strategy,

    /// Expansion depth
    #[arg(long)]
    pub depth: Option<usize>,

    /// Minimum citations for candidates
    #[arg(long, default_value_t = 0)]
    pub min_citations: u64,

    /// Maximum candidates admitted per depth level
    #[arg(long)]
    pub max_candidates: Option<usize>,
}

pub fn run(args: ExpandArgs, config: &Config) -> Result<()> {
    let (mut registry, paths) = super::open_registry(config)?;

    let mut options = ExpandOptions::from_config(&config.expand);
    if let Some(tag) = args.seed_tag {
        options.seed_tag = tag;
    }
    options.seed_dois = args.seed_dois;
    options.strategy = args.strategy.into();
    if let Some(depth) = args.depth {
        options.depth = depth;
    }
    options.min_citations = args.min_citations;
    if let Some(max) = args.max_candidates {
        options.max_candidates = max;
    }

    let client = SemanticScholarClient::new(config.apis.s2_api_key.clone());
    let deps = ExpandDeps {
        citations: &client,
        recommendations: Some(&client),
    };

    eprintln!(
        "Expanding from seeds (tag={}, dois={:?}), strategy={}, depth={}",
        options.seed_tag,
        options.seed_dois,
        options.strategy,
        options.depth
    );
    let summary = run_expand(&mut registry, &deps, &paths, &options)?;

    eprintln!(
        "\nExpansion complete: {} candidates found, {} added, {} already known, {} ambiguous",
        summary.candidates_found, summary.added, summary.already_known, summary.ambiguous
    );
    Ok(())
}
