//! Multi-source keyword search.
//!
//! Runs the query against every configured provider, folds the results
//! into the registry through the dedup cascade, and appends a run log
//! under `searches/`. A provider failure is isolated to that provider;
//! the others still contribute.

use std::fs;
use std::io::Write as _;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use litkeep_registry::{Registry, UpsertOutcome};
use litkeep_sources::{SearchProvider, SearchQuery};

use crate::config::{ProjectPaths, SearchConfig};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    pub year_range: Option<(i32, i32)>,
    pub min_citations: u64,
    pub max_results: usize,
    pub fields_of_study: Vec<String>,
    /// Tag applied to every record this search creates.
    pub tag: Option<String>,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>, config: &SearchConfig) -> Self {
        Self {
            query: query.into(),
            year_range: config.year_range,
            min_citations: config.min_citations,
            max_results: config.max_results,
            fields_of_study: config.fields_of_study.clone(),
            tag: None,
        }
    }

    fn as_query(&self) -> SearchQuery {
        SearchQuery {
            query: self.query.clone(),
            year_range: self.year_range,
            min_citations: Some(self.min_citations).filter(|&m| m > 0),
            fields_of_study: self.fields_of_study.clone(),
            max_results: self.max_results,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub total_results: usize,
    pub added: usize,
    pub merged: usize,
    pub ambiguous: usize,
    /// Providers whose search call failed outright.
    pub failed_sources: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SearchLogEntry<'a> {
    timestamp: chrono::DateTime<Utc>,
    query: &'a str,
    sources: Vec<&'a str>,
    year_range: Option<(i32, i32)>,
    min_citations: u64,
    max_results: usize,
    fields_of_study: &'a [String],
    total_results: usize,
    new_records_added: usize,
    duplicates_merged: usize,
}

/// Run a keyword search across `providers` and admit the results.
pub fn run_search(
    registry: &mut Registry,
    providers: &[&dyn SearchProvider],
    paths: &ProjectPaths,
    options: &SearchOptions,
) -> Result<SearchSummary> {
    let query = options.as_query();
    let mut summary = SearchSummary::default();

    for provider in providers {
        let found = match provider.search(&query) {
            Ok(found) => found,
            Err(e) => {
                log::error!("{} search failed: {e:#}", provider.name());
                summary.failed_sources.push(provider.name().to_string());
                continue;
            }
        };
        log::info!("{} returned {} results", provider.name(), found.len());
        summary.total_results += found.len();

        for mut record in found {
            if let Some(tag) = &options.tag {
                if !record.has_tag(tag) {
                    record.tags.push(tag.clone());
                }
            }
            match registry.upsert(record)? {
                UpsertOutcome::Created(_) => summary.added += 1,
                UpsertOutcome::Merged(id) => {
                    summary.merged += 1;
                    if let Some(tag) = &options.tag {
                        registry.add_tag(&id, tag)?;
                    }
                }
                UpsertOutcome::Ambiguous { closest, ratio, .. } => {
                    summary.ambiguous += 1;
                    log::warn!(
                        "ambiguous search result vs {closest} (ratio {ratio:.3}), skipped"
                    );
                }
            }
        }
    }

    append_run_log(paths, providers, options, &summary)
        .context("failed to append search run log")?;
    log::info!(
        "search complete: {} results, {} added, {} merged, {} ambiguous",
        summary.total_results,
        summary.added,
        summary.merged,
        summary.ambiguous
    );
    Ok(summary)
}

/// Query text shortened and sanitized for use in a log filename.
fn safe_query_fragment(query: &str) -> String {
    query
        .chars()
        .take(50)
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect()
}

fn append_run_log(
    paths: &ProjectPaths,
    providers: &[&dyn SearchProvider],
    options: &SearchOptions,
    summary: &SearchSummary,
) -> Result<()> {
    let dir = paths.searches_dir();
    fs::create_dir_all(&dir)?;
    let now = Utc::now();
    let path = dir.join(format!(
        "{}_{}.jsonl",
        now.format("%Y-%m-%d"),
        safe_query_fragment(&options.query)
    ));
    let entry = SearchLogEntry {
        timestamp: now,
        query: &options.query,
        sources: providers.iter().map(|p| p.name()).collect(),
        year_range: options.year_range,
        min_citations: options.min_citations,
        max_results: options.max_results,
        fields_of_study: &options.fields_of_study,
        total_results: summary.total_results,
        new_records_added: summary.added,
        duplicates_merged: summary.merged,
    };
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;
    Ok(())
}
