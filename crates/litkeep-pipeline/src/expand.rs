//! Citation-graph expansion.
//!
//! Walks forward citations, backward references, and recommendations
//! out from seed records, scores the discovered candidates with a
//! batch-normalized composite, and admits the top slice into the
//! registry. Candidates the registry already knows are excluded before
//! scoring so normalization reflects only genuinely new work.

use std::fs;
use std::io::Write as _;

use anyhow::{Context, Result};
use chrono::Utc;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use litkeep_registry::identifiers::normalize_doi;
use litkeep_registry::{DedupDecision, Record, Registry, UpsertOutcome};
use litkeep_sources::{CitationProvider, RecommendationProvider};

use crate::config::{ExpandConfig, ProjectPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandStrategy {
    Forward,
    Backward,
    /// Forward and backward.
    Both,
    Recommend,
    /// Everything, recommendations included.
    All,
}

impl ExpandStrategy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            "both" => Some(Self::Both),
            "recommend" => Some(Self::Recommend),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Both => "both",
            Self::Recommend => "recommend",
            Self::All => "all",
        }
    }

    fn wants_forward(self) -> bool {
        matches!(self, Self::Forward | Self::Both | Self::All)
    }

    fn wants_backward(self) -> bool {
        matches!(self, Self::Backward | Self::Both | Self::All)
    }

    fn wants_recommendations(self) -> bool {
        matches!(self, Self::Recommend | Self::All)
    }
}

impl std::fmt::Display for ExpandStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ExpandDeps<'a> {
    pub citations: &'a dyn CitationProvider,
    pub recommendations: Option<&'a dyn RecommendationProvider>,
}

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Expand from records carrying this tag when no DOIs are given.
    pub seed_tag: String,
    /// Explicit seed DOIs; overrides the tag selection.
    pub seed_dois: Vec<String>,
    pub strategy: ExpandStrategy,
    pub depth: usize,
    pub min_citations: u64,
    pub max_candidates: usize,
    /// Top-scored admissions carried as seeds into the next depth level.
    pub next_depth_seeds: usize,
}

impl ExpandOptions {
    pub fn from_config(config: &ExpandConfig) -> Self {
        Self {
            seed_tag: config.seed_tag.clone(),
            seed_dois: Vec::new(),
            strategy: ExpandStrategy::Both,
            depth: config.depth,
            min_citations: 0,
            max_candidates: config.max_candidates,
            next_depth_seeds: config.next_depth_seeds,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExpandSummary {
    pub seeds: usize,
    pub candidates_found: usize,
    pub already_known: usize,
    pub ambiguous: usize,
    pub added: usize,
}

#[derive(Debug, Serialize)]
struct ExpansionLogEntry<'a> {
    timestamp: chrono::DateTime<Utc>,
    seed_count: usize,
    seed_tag: &'a str,
    seed_dois: &'a [String],
    strategy: &'a str,
    depth: usize,
    candidates_found: usize,
    new_records_added: usize,
}

/// One candidate's normalization inputs, computed over the batch.
struct BatchNorms {
    max_log_citations: f64,
    min_year: i32,
    max_year: i32,
}

impl BatchNorms {
    fn over(candidates: &[Record]) -> Self {
        let max_log_citations = candidates
            .iter()
            .map(|r| ((r.citation_count.unwrap_or(0) + 1) as f64).ln())
            .fold(0.0_f64, f64::max);
        let years: Vec<i32> = candidates.iter().filter_map(|r| r.year).collect();
        Self {
            max_log_citations,
            min_year: years.iter().copied().min().unwrap_or(2000),
            max_year: years.iter().copied().max().unwrap_or(2025),
        }
    }
}

/// Composite relevance score, every component normalized to [0,1] over
/// the current batch.
///
/// 0.3 log-scaled citations + 0.4 seed-connection ratio + 0.2 recency
/// + 0.1 influential-citation ratio.
fn composite_score(
    record: &Record,
    seed_connections: u32,
    total_seeds: usize,
    norms: &BatchNorms,
) -> f64 {
    let cc = record.citation_count.unwrap_or(0);
    let citation_norm = if norms.max_log_citations > 0.0 {
        ((cc + 1) as f64).ln() / norms.max_log_citations
    } else {
        0.0
    };

    let seed_ratio = if total_seeds > 0 {
        f64::from(seed_connections) / total_seeds as f64
    } else {
        0.0
    };

    let year = record.year.unwrap_or(norms.min_year);
    let span = (norms.max_year - norms.min_year).max(1);
    let recency = f64::from(year - norms.min_year) / f64::from(span);

    let icc = record.influential_citation_count.unwrap_or(0);
    let influential_ratio = icc as f64 / (cc + 1) as f64;

    0.3 * citation_norm + 0.4 * seed_ratio + 0.2 * recency + 0.1 * influential_ratio
}

/// Score and order a candidate batch. Ties go to the higher raw
/// citation count, then the earlier year.
fn rank_candidates(
    mut candidates: Vec<Record>,
    connections: &FxHashMap<String, u32>,
    total_seeds: usize,
) -> Vec<(f64, Record)> {
    let norms = BatchNorms::over(&candidates);
    let mut scored: Vec<(f64, Record)> = candidates
        .drain(..)
        .map(|r| {
            let conns = connections.get(&r.record_id).copied().unwrap_or(1);
            let score = composite_score(&r, conns, total_seeds, &norms);
            (score, r)
        })
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then_with(|| b.citation_count.unwrap_or(0).cmp(&a.citation_count.unwrap_or(0)))
            .then_with(|| a.year.unwrap_or(i32::MAX).cmp(&b.year.unwrap_or(i32::MAX)))
    });
    scored
}

fn select_seeds(registry: &Registry, options: &ExpandOptions) -> Vec<Record> {
    if !options.seed_dois.is_empty() {
        let wanted: FxHashSet<String> = options
            .seed_dois
            .iter()
            .filter_map(|d| normalize_doi(d))
            .collect();
        registry
            .records()
            .filter(|r| r.doi.as_ref().is_some_and(|d| wanted.contains(d)))
            .cloned()
            .collect()
    } else {
        registry
            .records()
            .filter(|r| r.has_tag(&options.seed_tag))
            .cloned()
            .collect()
    }
}

/// Gather candidates for one depth level: every strategy's results for
/// every seed, with distinct-seed connection counts. Per-seed failures
/// are logged and skipped, never fatal.
fn gather_candidates(
    seeds: &[Record],
    deps: &ExpandDeps<'_>,
    options: &ExpandOptions,
) -> (Vec<Record>, FxHashMap<String, u32>) {
    let mut by_id: FxHashMap<String, Record> = FxHashMap::default();
    let mut connected_seeds: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();

    let mut absorb = |discovered: Vec<Record>, seed: &Record| {
        for mut candidate in discovered {
            candidate.seed_record_id = Some(seed.record_id.clone());
            connected_seeds
                .entry(candidate.record_id.clone())
                .or_default()
                .insert(seed.record_id.clone());
            by_id.entry(candidate.record_id.clone()).or_insert(candidate);
        }
    };

    for seed in seeds {
        if options.strategy.wants_forward() {
            match deps.citations.citations(&seed.record_id, options.max_candidates) {
                Ok(found) => absorb(found, seed),
                Err(e) => log::warn!("forward citations failed for {}: {e:#}", seed.record_id),
            }
        }
        if options.strategy.wants_backward() {
            match deps.citations.references(&seed.record_id, options.max_candidates) {
                Ok(found) => absorb(found, seed),
                Err(e) => log::warn!("backward references failed for {}: {e:#}", seed.record_id),
            }
        }
        if options.strategy.wants_recommendations() {
            if let Some(recommender) = deps.recommendations {
                match recommender
                    .recommendations(&[seed.record_id.clone()], options.max_candidates)
                {
                    Ok(found) => absorb(found, seed),
                    Err(e) => log::warn!("recommendations failed for {}: {e:#}", seed.record_id),
                }
            }
        }
    }

    let connections = connected_seeds
        .into_iter()
        .map(|(id, seeds)| (id, seeds.len() as u32))
        .collect();
    (by_id.into_values().collect(), connections)
}

/// Run depth-limited citation expansion from seed records.
pub fn run_expand(
    registry: &mut Registry,
    deps: &ExpandDeps<'_>,
    paths: &ProjectPaths,
    options: &ExpandOptions,
) -> Result<ExpandSummary> {
    let seeds = select_seeds(registry, options);
    let mut summary = ExpandSummary {
        seeds: seeds.len(),
        ..Default::default()
    };
    if seeds.is_empty() {
        log::warn!(
            "no seed records found (tag={:?}, dois={:?})",
            options.seed_tag,
            options.seed_dois
        );
        return Ok(summary);
    }
    if options.depth > 1 {
        log::warn!(
            "expansion depth {} grows the candidate set combinatorially",
            options.depth
        );
    }
    log::info!(
        "expanding from {} seeds, strategy={}, depth={}",
        seeds.len(),
        options.strategy,
        options.depth
    );

    let mut current_seeds = seeds;
    for level in 0..options.depth.max(1) {
        log::info!("expansion depth {}/{}", level + 1, options.depth.max(1));

        let (mut candidates, connections) = gather_candidates(&current_seeds, deps, options);
        summary.candidates_found += candidates.len();

        if options.min_citations > 0 {
            candidates.retain(|r| r.citation_count.unwrap_or(0) >= options.min_citations);
        }

        // Registry-known candidates drop out before scoring so batch
        // normalization only sees new work.
        let mut fresh = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match registry.decide(&candidate) {
                DedupDecision::NewRecord => fresh.push(candidate),
                DedupDecision::MergeInto(_) => summary.already_known += 1,
                DedupDecision::Ambiguous { closest, ratio } => {
                    summary.ambiguous += 1;
                    log::warn!(
                        "ambiguous candidate {:?} vs {closest} (ratio {ratio:.3}), skipped",
                        candidate.title
                    );
                }
            }
        }
        if fresh.is_empty() {
            log::info!("depth {}: no new candidates", level + 1);
            break;
        }

        let scored = rank_candidates(fresh, &connections, current_seeds.len());
        let mut admitted: Vec<Record> = Vec::new();
        for (score, mut record) in scored.into_iter().take(options.max_candidates) {
            record.seed_connections =
                connections.get(&record.record_id).copied().or(Some(1));
            log::debug!("admit {:.4} {} {:?}", score, record.record_id, record.title);
            match registry.upsert(record.clone())? {
                UpsertOutcome::Created(_) => {
                    summary.added += 1;
                    admitted.push(record);
                }
                UpsertOutcome::Merged(_) => summary.already_known += 1,
                UpsertOutcome::Ambiguous { .. } => summary.ambiguous += 1,
            }
        }

        log::info!("depth {}: {} new records added", level + 1, admitted.len());

        if level + 1 < options.depth {
            admitted.truncate(options.next_depth_seeds);
            if admitted.is_empty() {
                break;
            }
            current_seeds = admitted;
        }
    }

    append_run_log(paths, options, &summary)
        .context("failed to append expansion run log")?;
    Ok(summary)
}

fn append_run_log(
    paths: &ProjectPaths,
    options: &ExpandOptions,
    summary: &ExpandSummary,
) -> Result<()> {
    let dir = paths.expansions_dir();
    fs::create_dir_all(&dir)?;
    let now = Utc::now();
    let path = dir.join(format!("{}_expansion.jsonl", now.format("%Y-%m-%d")));
    let entry = ExpansionLogEntry {
        timestamp: now,
        seed_count: summary.seeds,
        seed_tag: &options.seed_tag,
        seed_dois: &options.seed_dois,
        strategy: options.strategy.as_str(),
        depth: options.depth,
        candidates_found: summary.candidates_found,
        new_records_added: summary.added,
    };
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;
    Ok(())
}
