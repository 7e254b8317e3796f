//! Corpus summary report.
//!
//! Aggregates the registry into counts and listings and renders them
//! as plain text, markdown, or JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use litkeep_registry::{Record, Registry};

const HISTOGRAM_WIDTH: usize = 40;
const TOP_VENUES: usize = 10;
const TOP_CITED: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CitedEntry {
    pub record_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub citations: u64,
    pub doi: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CorpusStats {
    pub total: usize,
    pub method_counts: BTreeMap<String, usize>,
    pub status_counts: BTreeMap<String, usize>,
    pub has_pdf: usize,
    pub has_structured: usize,
    pub needs_manual: usize,
    pub artifact_source_counts: BTreeMap<String, usize>,
    pub year_counts: BTreeMap<i32, usize>,
    pub top_venues: Vec<(String, usize)>,
    pub tag_counts: BTreeMap<String, usize>,
    pub top_cited: Vec<CitedEntry>,
    pub avg_citations: f64,
}

/// Aggregate registry contents into report statistics.
pub fn build_stats(registry: &Registry) -> CorpusStats {
    let records: Vec<&Record> = registry.records().collect();

    let mut method_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut artifact_source_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut year_counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut venue_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut has_pdf = 0;
    let mut has_structured = 0;
    let mut needs_manual = 0;
    let mut citation_sum = 0u64;
    let mut citation_n = 0usize;

    for r in &records {
        *method_counts
            .entry(r.discovery_method.as_str().to_string())
            .or_default() += 1;
        *status_counts.entry(r.status.as_str().to_string()).or_default() += 1;
        if let Some(src) = r.artifact_source {
            *artifact_source_counts.entry(src.as_str().to_string()).or_default() += 1;
        }
        if let Some(year) = r.year {
            *year_counts.entry(year).or_default() += 1;
        }
        if let Some(venue) = r.venue.as_deref().or(r.journal.as_deref()) {
            *venue_counts.entry(venue.to_string()).or_default() += 1;
        }
        for tag in &r.tags {
            *tag_counts.entry(tag.clone()).or_default() += 1;
        }
        if r.has_pdf() {
            has_pdf += 1;
        }
        if r.has_structured() {
            has_structured += 1;
        }
        if r.needs_manual() {
            needs_manual += 1;
        }
        if let Some(cc) = r.citation_count {
            citation_sum += cc;
            citation_n += 1;
        }
    }

    let mut top_venues: Vec<(String, usize)> = venue_counts.into_iter().collect();
    top_venues.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_venues.truncate(TOP_VENUES);

    let mut cited: Vec<&&Record> = records
        .iter()
        .filter(|r| r.citation_count.is_some())
        .collect();
    cited.sort_by_key(|r| std::cmp::Reverse(r.citation_count.unwrap_or(0)));
    let top_cited = cited
        .into_iter()
        .take(TOP_CITED)
        .map(|r| CitedEntry {
            record_id: r.record_id.clone(),
            title: r.title.clone(),
            year: r.year,
            citations: r.citation_count.unwrap_or(0),
            doi: r.doi.clone(),
        })
        .collect();

    CorpusStats {
        total: records.len(),
        method_counts,
        status_counts,
        has_pdf,
        has_structured,
        needs_manual,
        artifact_source_counts,
        year_counts,
        top_venues,
        tag_counts,
        top_cited,
        avg_citations: if citation_n > 0 {
            citation_sum as f64 / citation_n as f64
        } else {
            0.0
        },
    }
}

/// Render a report in the requested format.
pub fn render(stats: &CorpusStats, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => render_text(stats),
        ReportFormat::Markdown => render_markdown(stats),
        ReportFormat::Json => serde_json::to_string_pretty(stats)?,
    })
}

fn year_histogram(year_counts: &BTreeMap<i32, usize>) -> String {
    let Some((&min_year, _)) = year_counts.iter().next() else {
        return "  no year data".to_string();
    };
    let &max_year = year_counts.keys().next_back().unwrap_or(&min_year);
    let max_count = year_counts.values().copied().max().unwrap_or(1);

    let mut out = String::new();
    for year in min_year..=max_year {
        let count = year_counts.get(&year).copied().unwrap_or(0);
        let bar_len = count * HISTOGRAM_WIDTH / max_count.max(1);
        let _ = writeln!(out, "  {year} | {} ({count})", "#".repeat(bar_len));
    }
    out.pop();
    out
}

fn render_text(stats: &CorpusStats) -> String {
    let mut out = String::new();
    let push = |out: &mut String, line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    push(&mut out, &"=".repeat(60));
    push(&mut out, "  litkeep corpus report");
    push(&mut out, &"=".repeat(60));
    push(&mut out, "");
    push(&mut out, &format!("Total records: {}", stats.total));
    push(&mut out, "");

    push(&mut out, "Discovery methods:");
    for (method, count) in &stats.method_counts {
        push(&mut out, &format!("  {method}: {count}"));
    }
    push(&mut out, "");

    push(&mut out, "Retrieval status:");
    for (status, count) in &stats.status_counts {
        push(&mut out, &format!("  {status}: {count}"));
    }
    push(&mut out, "");
    push(&mut out, &format!("  Records with PDF: {}", stats.has_pdf));
    push(
        &mut out,
        &format!("  Records with structured text: {}", stats.has_structured),
    );
    push(
        &mut out,
        &format!("  Awaiting manual retrieval: {}", stats.needs_manual),
    );
    push(&mut out, "");

    if !stats.artifact_source_counts.is_empty() {
        push(&mut out, "Artifact sources:");
        for (source, count) in &stats.artifact_source_counts {
            push(&mut out, &format!("  {source}: {count}"));
        }
        push(&mut out, "");
    }

    push(&mut out, "Year distribution:");
    push(&mut out, &year_histogram(&stats.year_counts));
    push(&mut out, "");

    if !stats.top_venues.is_empty() {
        push(&mut out, "Top venues:");
        for (venue, count) in &stats.top_venues {
            push(&mut out, &format!("  {venue}: {count}"));
        }
        push(&mut out, "");
    }

    push(
        &mut out,
        &format!("Average citations per record: {:.1}", stats.avg_citations),
    );
    push(&mut out, "");

    if !stats.top_cited.is_empty() {
        push(&mut out, "Top cited:");
        for (i, entry) in stats.top_cited.iter().enumerate() {
            let year = entry
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "?".to_string());
            push(
                &mut out,
                &format!(
                    "  {}. [{}] {} ({year})",
                    i + 1,
                    entry.citations,
                    truncate(&entry.title, 70)
                ),
            );
        }
        push(&mut out, "");
    }

    if !stats.tag_counts.is_empty() {
        push(&mut out, "Tags:");
        for (tag, count) in &stats.tag_counts {
            push(&mut out, &format!("  {tag}: {count}"));
        }
    }

    out
}

fn render_markdown(stats: &CorpusStats) -> String {
    let mut out = String::new();
    let push = |out: &mut String, line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    push(&mut out, "# litkeep corpus report");
    push(&mut out, "");
    push(&mut out, &format!("**Total records:** {}", stats.total));
    push(&mut out, "");

    push(&mut out, "## Discovery methods");
    push(&mut out, "");
    push(&mut out, "| Method | Count |");
    push(&mut out, "|--------|-------|");
    for (method, count) in &stats.method_counts {
        push(&mut out, &format!("| {method} | {count} |"));
    }
    push(&mut out, "");

    push(&mut out, "## Retrieval status");
    push(&mut out, "");
    push(&mut out, "| Status | Count |");
    push(&mut out, "|--------|-------|");
    for (status, count) in &stats.status_counts {
        push(&mut out, &format!("| {status} | {count} |"));
    }
    push(&mut out, "");
    push(&mut out, &format!("- Records with PDF: {}", stats.has_pdf));
    push(
        &mut out,
        &format!("- Records with structured text: {}", stats.has_structured),
    );
    push(
        &mut out,
        &format!("- Awaiting manual retrieval: {}", stats.needs_manual),
    );
    push(&mut out, "");

    push(&mut out, "## Year distribution");
    push(&mut out, "");
    push(&mut out, "```");
    push(&mut out, &year_histogram(&stats.year_counts));
    push(&mut out, "```");
    push(&mut out, "");

    if !stats.top_venues.is_empty() {
        push(&mut out, "## Top venues");
        push(&mut out, "");
        push(&mut out, "| Venue | Count |");
        push(&mut out, "|-------|-------|");
        for (venue, count) in &stats.top_venues {
            push(&mut out, &format!("| {venue} | {count} |"));
        }
        push(&mut out, "");
    }

    push(
        &mut out,
        &format!("**Average citations per record:** {:.1}", stats.avg_citations),
    );
    push(&mut out, "");

    if !stats.top_cited.is_empty() {
        push(&mut out, "## Top cited");
        push(&mut out, "");
        for (i, entry) in stats.top_cited.iter().enumerate() {
            let doi_link = entry
                .doi
                .as_deref()
                .map(|d| format!(" ([DOI](https://doi.org/{d}))"))
                .unwrap_or_default();
            let year = entry
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "?".to_string());
            push(
                &mut out,
                &format!(
                    "{}. [{}] {} ({year}){doi_link}",
                    i + 1,
                    entry.citations,
                    entry.title
                ),
            );
        }
        push(&mut out, "");
    }

    if !stats.tag_counts.is_empty() {
        push(&mut out, "## Tags");
        push(&mut out, "");
        for (tag, count) in &stats.tag_counts {
            push(&mut out, &format!("- {tag}: {count}"));
        }
    }

    out
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litkeep_registry::{
        ArtifactSource, ArtifactUpdate, DedupConfig, DiscoveryMethod, RetrievalStatus,
    };
    use tempfile::TempDir;

    fn populated_registry(dir: &TempDir) -> Registry {
        let mut registry =
            Registry::open(&dir.path().join("records.jsonl"), DedupConfig::default()).unwrap();

        let mut a = Record::new("s2:a", "Alpha work");
        a.year = Some(2020);
        a.citation_count = Some(100);
        a.venue = Some("Nature".to_string());
        a.tags.push("seed".to_string());
        registry.upsert(a).unwrap();
        registry
            .update_status(
                "s2:a",
                RetrievalStatus::Partial,
                ArtifactUpdate {
                    pdf_path: Some("fulltext/pdf/a.pdf".to_string()),
                    artifact_source: Some(ArtifactSource::Unpaywall),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut b = Record::new("s2:b", "Beta work");
        b.year = Some(2022);
        b.citation_count = Some(20);
        b.discovery_method = DiscoveryMethod::CitationForward;
        registry.upsert(b).unwrap();
        registry
            .update_status("s2:b", RetrievalStatus::Failed, ArtifactUpdate::default())
            .unwrap();

        registry
    }

    #[test]
    fn stats_aggregate_counts() {
        let dir = TempDir::new().unwrap();
        let registry = populated_registry(&dir);
        let stats = build_stats(&registry);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.method_counts["keyword_search"], 1);
        assert_eq!(stats.method_counts["citation_forward"], 1);
        assert_eq!(stats.status_counts["partial"], 1);
        assert_eq!(stats.status_counts["failed"], 1);
        assert_eq!(stats.has_pdf, 1);
        assert_eq!(stats.needs_manual, 1);
        assert_eq!(stats.artifact_source_counts["unpaywall"], 1);
        assert!((stats.avg_citations - 60.0).abs() < f64::EPSILON);
        assert_eq!(stats.top_cited[0].record_id, "s2:a");
        assert_eq!(stats.tag_counts["seed"], 1);
    }

    #[test]
    fn histogram_scales_bars() {
        let mut counts = BTreeMap::new();
        counts.insert(2020, 4);
        counts.insert(2022, 2);
        let h = year_histogram(&counts);
        let lines: Vec<&str> = h.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(&"#".repeat(40)));
        assert!(lines[1].contains("2021 |  (0)"));
        assert!(lines[2].contains(&"#".repeat(20)));
    }

    #[test]
    fn json_report_round_trips() {
        let dir = TempDir::new().unwrap();
        let registry = populated_registry(&dir);
        let stats = build_stats(&registry);
        let json = render(&stats, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["status_counts"]["failed"], 1);
    }

    #[test]
    fn text_and_markdown_contain_sections() {
        let dir = TempDir::new().unwrap();
        let registry = populated_registry(&dir);
        let stats = build_stats(&registry);

        let text = render(&stats, ReportFormat::Text).unwrap();
        assert!(text.contains("Total records: 2"));
        assert!(text.contains("Year distribution:"));
        assert!(text.contains("Nature: 1"));

        let md = render(&stats, ReportFormat::Markdown).unwrap();
        assert!(md.contains("# litkeep corpus report"));
        assert!(md.contains("| keyword_search | 1 |"));
        // No DOIs in the fixture, so no resolver links
        assert!(!md.contains("https://doi.org"));
    }
}
