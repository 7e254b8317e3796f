//! litkeep - Literature corpus consolidation CLI
//!
//! Builds and maintains a deduplicated registry of literature records
//! from keyword search and citation expansion, retrieves open-access
//! full text, and resolves manually downloaded PDFs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "litkeep")]
#[command(about = "Literature corpus consolidation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Corpus project directory
    #[arg(short, long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Config file path (default: {project}/litkeep.toml or ~/.config/litkeep/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new corpus project directory
    Init(cmd::init::InitArgs),
    /// Keyword search across configured sources
    Search(cmd::search::SearchArgs),
    /// Expand the corpus along the citation graph
    Expand(cmd::expand::ExpandArgs),
    /// Retrieve open-access full text
    Retrieve(cmd::retrieve::RetrieveArgs),
    /// Match manually downloaded PDFs from the inbox
    Ingest(cmd::ingest::IngestArgs),
    /// Rank the corpus bibliometrically
    Rank(cmd::rank::RankArgs),
    /// Corpus summary report
    Report(cmd::report::ReportArgs),
    /// Registry state at a glance
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress: litkeep_core::SharedProgress = Arc::new(litkeep_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress bars show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    litkeep_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load(&cli.project_dir)?
    };
    config.project.dir = cli.project_dir.clone();

    // HTTP settings: config file defaults, CLI overrides
    litkeep_core::set_http_config(litkeep_core::HttpConfig {
        timeout: std::time::Duration::from_secs(
            cli.timeout
                .unwrap_or(config.http.timeout_secs)
                .max(1),
        ),
        max_retries: cli.max_retries.unwrap_or(config.http.max_retries),
    });

    litkeep_core::install_signal_handlers();

    match cli.command {
        Command::Init(args) => cmd::init::run(args, &config),
        Command::Search(args) => cmd::search::run(args, &config),
        Command::Expand(args) => cmd::expand::run(args, &config),
        Command::Retrieve(args) => cmd::retrieve::run(args, &config, &progress),
        Command::Ingest(args) => cmd::ingest::run(args, &config),
        Command::Rank(args) => cmd::rank::run(args, &config),
        Command::Report(args) => cmd::report::run(args, &config),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Project directory",
                &config.project.dir.display().to_string(),
            ]);
            table.add_row(vec!["Project name", &config.project.name]);
            table.add_row(vec![
                "S2 API key",
                if config.apis.s2_api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec![
                "NCBI API key",
                if config.apis.ncbi_api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec![
                "Unpaywall email",
                config.apis.unpaywall_email.as_deref().unwrap_or("not set"),
            ]);
            table.add_row(vec![
                "PDF chain",
                &config
                    .retrieval
                    .pdf_chain
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            ]);
            table.add_row(vec![
                "Retrieval workers",
                &config.retrieval.concurrency.to_string(),
            ]);
            table.add_row(vec![
                "Dedup title threshold",
                &format!("{:.2}", config.dedup.title_threshold),
            ]);
            table.add_row(vec![
                "Request timeout",
                &format!("{}s", config.http.timeout_secs),
            ]);
            table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
