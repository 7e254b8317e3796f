//! Report subcommand - corpus summary in text, markdown, or JSON.

use anyhow::Result;
use clap::{Args, ValueEnum};

use litkeep_pipeline::{ReportFormat, build_stats, render};

use crate::config::Config;

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Format {
    Text,
    Markdown,
    Json,
}

impl From<Format> for ReportFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => Self::Text,
            Format::Markdown => Self::Markdown,
            Format::Json => Self::Json,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: Format,
}

pub fn run(args: ReportArgs, config: &Config) -> Result<()> {
    let (registry, _paths) = super::open_registry(config)?;
    let stats = build_stats(&registry);
    println!("{}", render(&stats, args.format.into())?);
    Ok(())
}
