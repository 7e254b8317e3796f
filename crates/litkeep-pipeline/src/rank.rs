//! Corpus ranking.
//!
//! Bibliometric score over a filtered slice of the registry, with
//! optional tagging of the top records. Normalization is computed over
//! the filtered slice, not the whole corpus, so a tag-restricted rank
//! spreads scores across its own batch.

use anyhow::Result;

use litkeep_registry::{DiscoveryMethod, Filter, Record, Registry};

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub top: usize,
    /// Tag applied to the top records after ranking.
    pub tag: Option<String>,
    /// Only rank records carrying this tag.
    pub filter_tag: Option<String>,
    pub filter_method: Option<DiscoveryMethod>,
}

#[derive(Debug, Clone)]
pub struct RankedRecord {
    pub score: f64,
    pub record: Record,
}

/// 0.6 log-scaled citations + 0.3 recency + 0.1 influential ratio,
/// normalized over the ranked batch.
fn bibliometric_score(
    record: &Record,
    max_log_citations: f64,
    min_year: i32,
    max_year: i32,
) -> f64 {
    let cc = record.citation_count.unwrap_or(0);
    let citation_norm = if max_log_citations > 0.0 {
        ((cc + 1) as f64).ln() / max_log_citations
    } else {
        0.0
    };

    let year = record.year.unwrap_or(min_year);
    let span = max_year - min_year;
    let recency = if span > 0 {
        f64::from(year - min_year) / f64::from(span)
    } else {
        0.5
    };

    let icc = record.influential_citation_count.unwrap_or(0);
    let influential_ratio = icc as f64 / (cc + 1) as f64;

    0.6 * citation_norm + 0.3 * recency + 0.1 * influential_ratio
}

/// Score and rank the (filtered) corpus, descending.
pub fn run_rank(registry: &mut Registry, options: &RankOptions) -> Result<Vec<RankedRecord>> {
    let filter = Filter {
        tags: options.filter_tag.clone().into_iter().collect(),
        discovery_method: options.filter_method,
        ..Default::default()
    };
    let slice: Vec<Record> = registry.query(&filter).cloned().collect();
    if slice.is_empty() {
        log::warn!("no records match the rank filters");
        return Ok(Vec::new());
    }

    let max_log_citations = slice
        .iter()
        .map(|r| ((r.citation_count.unwrap_or(0) + 1) as f64).ln())
        .fold(0.0_f64, f64::max);
    let years: Vec<i32> = slice.iter().filter_map(|r| r.year).collect();
    let min_year = years.iter().copied().min().unwrap_or(2000);
    let max_year = years.iter().copied().max().unwrap_or(2025);

    let mut ranked: Vec<RankedRecord> = slice
        .into_iter()
        .map(|record| RankedRecord {
            score: bibliometric_score(&record, max_log_citations, min_year, max_year),
            record,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(options.top.max(1));

    if let Some(tag) = &options.tag {
        for entry in &ranked {
            registry.add_tag(&entry.record.record_id, tag)?;
        }
        log::info!("tagged top {} records with {tag:?}", ranked.len());
    }

    Ok(ranked)
}
