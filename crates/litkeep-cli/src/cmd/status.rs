//! Status subcommand - registry state at a glance.

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use litkeep_core::fmt_num;
use litkeep_pipeline::build_stats;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub fn run(_args: StatusArgs, config: &Config) -> Result<()> {
    let (registry, paths) = super::open_registry(config)?;
    let stats = build_stats(&registry);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Metric").fg(Color::Cyan),
            Cell::new("Count").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Total records", &fmt_num(stats.total)]);
    for (status, count) in &stats.status_counts {
        table.add_row(vec![status.as_str(), &fmt_num(*count)]);
    }
    table.add_row(vec!["With PDF", &fmt_num(stats.has_pdf)]);
    table.add_row(vec!["With structured text", &fmt_num(stats.has_structured)]);
    table.add_row(vec!["Need manual retrieval", &fmt_num(stats.needs_manual)]);

    eprintln!("\nProject: {}", paths.project_dir.display());
    eprintln!("{table}");

    if stats.needs_manual > 0 {
        eprintln!(
            "\nManual retrieval list: {}",
            paths.manual_list().display()
        );
    }
    Ok(())
}
