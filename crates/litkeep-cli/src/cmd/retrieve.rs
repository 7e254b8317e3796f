//! Retrieve subcommand - full-text acquisition for registry records.

use anyhow::Result;
use clap::Args;

use litkeep_core::ProgressContext;
use litkeep_core::http::HttpFetcher;
use litkeep_pipeline::{RetrieveDeps, RetrieveOptions, run_retrieve};
use litkeep_registry::{AttemptLog, write_manual_list};
use litkeep_sources::{OaLocator, PubMedClient, UnpaywallClient};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// Only retrieve records carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Retry previously failed records
    #[arg(long)]
    pub retry_failed: bool,

    /// Retry records flagged for manual retrieval
    #[arg(long)]
    pub retry_manual_pending: bool,

    /// Plan only; no network calls, no registry changes
    #[arg(long)]
    pub dry_run: bool,

    /// Only regenerate the manual retrieval list
    #[arg(long)]
    pub update_manual_list: bool,
}

pub fn run(args: RetrieveArgs, config: &Config, progress: &ProgressContext) -> Result<()> {
    let (mut registry, paths) = super::open_registry(config)?;

    if args.update_manual_list {
        let manual: Vec<_> = registry.records().filter(|r| r.needs_manual()).collect();
        let count = write_manual_list(&manual, &paths.manual_list())?;
        eprintln!(
            "Manual retrieval list regenerated: {count} records in {}",
            paths.manual_list().display()
        );
        return Ok(());
    }

    let attempt_log = AttemptLog::new(&paths.attempts());
    let fetcher = HttpFetcher;
    let unpaywall = config
        .apis
        .unpaywall_email
        .clone()
        .map(UnpaywallClient::new);
    let pubmed = PubMedClient::new(
        config.apis.ncbi_email.clone(),
        config.apis.ncbi_api_key.clone(),
    );
    let deps = RetrieveDeps {
        fetcher: &fetcher,
        oa_locator: unpaywall.as_ref().map(|c| c as &dyn OaLocator),
        pmcid_resolver: Some(&pubmed),
        progress: Some(progress),
    };

    let options = RetrieveOptions {
        tag: args.tag,
        retry_failed: args.retry_failed,
        retry_manual_pending: args.retry_manual_pending,
        dry_run: args.dry_run,
    };

    let summary = run_retrieve(
        &mut registry,
        &attempt_log,
        &deps,
        &config.retrieval,
        &paths,
        &options,
    )?;

    progress.println(format!(
        "\nRetrieval complete: {} processed, {} retrieved, {} partial, {} failed, {} paywall hits",
        summary.processed, summary.retrieved, summary.partial, summary.failed, summary.paywall_hits
    ));
    if summary.manual_pending > 0 {
        progress.println(format!(
            "{} records need manual attention, see {}",
            summary.manual_pending,
            paths.manual_list().display()
        ));
    }
    Ok(())
}
