//! Search subcommand - keyword search across the configured sources.

use anyhow::Result;
use clap::{Args, ValueEnum};

use litkeep_pipeline::{SearchOptions, run_search};
use litkeep_sources::{OpenAlexClient, PubMedClient, SearchProvider, SemanticScholarClient};

use crate::config::Config;

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum SearchSource {
    SemanticScholar,
    Pubmed,
    Openalex,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Sources to query
    #[arg(short, long, value_enum, default_values_t = [SearchSource::SemanticScholar])]
    pub source: Vec<SearchSource>,

    /// Publication year range (start and end)
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    pub year_range: Option<Vec<i32>>,

    /// Minimum citation count
    #[arg(long)]
    pub min_citations: Option<u64>,

    /// Maximum results per source
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Restrict to these fields of study
    #[arg(long = "field")]
    pub fields_of_study: Vec<String>,

    /// Tag applied to discovered records
    #[arg(short, long)]
    pub tag: Option<String>,
}

pub fn run(args: SearchArgs, config: &Config) -> Result<()> {
    let (mut registry, paths) = super::open_registry(config)?;

    let mut options = SearchOptions::new(&args.query, &config.search);
    if let Some(range) = &args.year_range {
        options.year_range = Some((range[0], range[1]));
    }
    if let Some(min) = args.min_citations {
        options.min_citations = min;
    }
    if let Some(max) = args.max_results {
        options.max_results = max;
    }
    if !args.fields_of_study.is_empty() {
        options.fields_of_study = args.fields_of_study.clone();
    }
    options.tag = args.tag.clone();

    let mut sources = args.source.clone();
    sources.dedup();
    let clients: Vec<Box<dyn SearchProvider>> = sources
        .iter()
        .map(|source| match source {
            SearchSource::SemanticScholar => Box::new(SemanticScholarClient::new(
                config.apis.s2_api_key.clone(),
            )) as Box<dyn SearchProvider>,
            SearchSource::Pubmed => Box::new(PubMedClient::new(
                config.apis.ncbi_email.clone(),
                config.apis.ncbi_api_key.clone(),
            )),
            SearchSource::Openalex => {
                Box::new(OpenAlexClient::new(config.apis.openalex_mailto.clone()))
            }
        })
        .collect();
    let providers: Vec<&dyn SearchProvider> = clients.iter().map(|c| c.as_ref()).collect();

    eprintln!("Searching for: {}", args.query);
    let summary = run_search(&mut registry, &providers, &paths, &options)?;

    eprintln!(
        "\nResults: {} total, {} new, {} merged, {} ambiguous",
        summary.total_results, summary.added, summary.merged, summary.ambiguous
    );
    if !summary.failed_sources.is_empty() {
        eprintln!("Failed sources: {}", summary.failed_sources.join(", "));
    }
    Ok(())
}
