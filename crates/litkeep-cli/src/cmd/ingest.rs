//! Ingest subcommand - match manually downloaded PDFs from the inbox.

use anyhow::Result;
use clap::Args;

use litkeep_pipeline::ingest::{FileOutcome, IngestOptions, run_ingest};
use litkeep_registry::AttemptLog;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Preview matching without moving files
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: IngestArgs, config: &Config) -> Result<()> {
    let (mut registry, paths) = super::open_registry(config)?;
    let attempt_log = AttemptLog::new(&paths.attempts());

    let summary = run_ingest(
        &mut registry,
        &attempt_log,
        &config.retrieval,
        &paths,
        IngestOptions {
            dry_run: args.dry_run,
        },
    )?;

    for report in &summary.files {
        match &report.outcome {
            FileOutcome::Matched { record_id, method } => {
                eprintln!("  {} -> {record_id} ({method})", report.filename);
            }
            FileOutcome::Unmatched { best_score } => {
                eprintln!(
                    "  {} -> no confident match (best score {best_score:.2})",
                    report.filename
                );
            }
            FileOutcome::Rejected(err) => eprintln!("  {err}"),
        }
    }

    eprintln!(
        "\nIngest complete: {} ingested, {} unmatched, {} still need manual retrieval",
        summary.ingested, summary.unmatched, summary.still_pending
    );
    Ok(())
}
