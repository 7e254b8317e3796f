//! Cross-source deduplication.
//!
//! Matching cascade (first hit wins): normalized DOI, PMID, record id,
//! then fuzzy normalized-title similarity gated on publication year.
//! Near-threshold ratios land in a dead zone and are reported as
//! ambiguous rather than resolved either way.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::identifiers::{normalize_doi, normalize_title};
use crate::model::Record;

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Normalized-Levenshtein ratio at or above which titles match.
    pub title_threshold: f64,
    /// Width of the ambiguity dead zone below the threshold.
    pub ambiguity_band: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.92,
            ambiguity_band: 0.05,
        }
    }
}

/// Outcome of checking a candidate against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    NewRecord,
    MergeInto(String),
    /// Near-miss fuzzy match: surfaced for review, never auto-resolved.
    Ambiguous { closest: String, ratio: f64 },
}

/// Fast lookup index over the registry for dedup decisions.
pub struct DedupIndex {
    config: DedupConfig,
    by_doi: FxHashMap<String, String>,
    by_pmid: FxHashMap<String, String>,
    record_ids: FxHashSet<String>,
    titles: Vec<TitleEntry>,
}

struct TitleEntry {
    normalized: String,
    year: Option<i32>,
    record_id: String,
}

impl DedupIndex {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            by_doi: FxHashMap::default(),
            by_pmid: FxHashMap::default(),
            record_ids: FxHashSet::default(),
            titles: Vec::new(),
        }
    }

    pub fn add(&mut self, record: &Record) {
        if let Some(doi) = record.doi.as_deref().and_then(normalize_doi) {
            self.by_doi.entry(doi).or_insert_with(|| record.record_id.clone());
        }
        if let Some(pmid) = &record.pmid {
            self.by_pmid
                .entry(pmid.clone())
                .or_insert_with(|| record.record_id.clone());
        }
        self.record_ids.insert(record.record_id.clone());
        if !record.title.is_empty() {
            self.titles.push(TitleEntry {
                normalized: normalize_title(&record.title),
                year: record.year,
                record_id: record.record_id.clone(),
            });
        }
    }

    pub fn contains_id(&self, record_id: &str) -> bool {
        self.record_ids.contains(record_id)
    }

    /// Record id holding this DOI, if any. Input is normalized first.
    pub fn owner_of_doi(&self, doi: &str) -> Option<&str> {
        let doi = normalize_doi(doi)?;
        self.by_doi.get(&doi).map(String::as_str)
    }

    pub fn owner_of_pmid(&self, pmid: &str) -> Option<&str> {
        self.by_pmid.get(pmid).map(String::as_str)
    }

    /// Run the matching cascade for one candidate.
    pub fn decide(&self, candidate: &Record) -> DedupDecision {
        if let Some(doi) = candidate.doi.as_deref().and_then(normalize_doi) {
            if let Some(id) = self.by_doi.get(&doi) {
                return DedupDecision::MergeInto(id.clone());
            }
        }
        if let Some(pmid) = &candidate.pmid {
            if let Some(id) = self.by_pmid.get(pmid) {
                return DedupDecision::MergeInto(id.clone());
            }
        }
        if self.record_ids.contains(&candidate.record_id) {
            return DedupDecision::MergeInto(candidate.record_id.clone());
        }

        if candidate.title.is_empty() {
            return DedupDecision::NewRecord;
        }
        let normalized = normalize_title(&candidate.title);
        let mut best: Option<(f64, &str)> = None;
        for entry in &self.titles {
            // Year mismatch always disqualifies, even on a perfect
            // title match (reprints/preprints share titles).
            if let (Some(a), Some(b)) = (candidate.year, entry.year) {
                if a != b {
                    continue;
                }
            }
            let ratio = strsim::normalized_levenshtein(&normalized, &entry.normalized);
            if best.map_or(true, |(b, _)| ratio > b) {
                best = Some((ratio, &entry.record_id));
            }
        }

        match best {
            Some((ratio, id)) if ratio >= self.config.title_threshold => {
                DedupDecision::MergeInto(id.to_string())
            }
            Some((ratio, id))
                if ratio >= self.config.title_threshold - self.config.ambiguity_band =>
            {
                DedupDecision::Ambiguous {
                    closest: id.to_string(),
                    ratio,
                }
            }
            _ => DedupDecision::NewRecord,
        }
    }
}

/// Merge a duplicate candidate into an existing record.
///
/// Identifiers become the union; missing scalar fields are filled from
/// the candidate; empty lists are taken from whichever side has them;
/// tags are unioned. Discovery provenance of the first-seen record is
/// retained untouched.
pub fn merge_records(existing: &Record, incoming: &Record) -> Record {
    let mut merged = existing.clone();

    fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if slot.is_none() {
            *slot = value.clone();
        }
    }

    fill(&mut merged.doi, &incoming.doi.as_deref().and_then(normalize_doi));
    fill(&mut merged.pmid, &incoming.pmid);
    fill(&mut merged.pmcid, &incoming.pmcid);
    fill(&mut merged.arxiv_id, &incoming.arxiv_id);

    fill(&mut merged.year, &incoming.year);
    fill(&mut merged.venue, &incoming.venue);
    fill(&mut merged.journal, &incoming.journal);
    fill(&mut merged.citation_count, &incoming.citation_count);
    fill(
        &mut merged.influential_citation_count,
        &incoming.influential_citation_count,
    );
    fill(&mut merged.abstract_text, &incoming.abstract_text);
    fill(&mut merged.is_open_access, &incoming.is_open_access);
    fill(&mut merged.oa_pdf_url, &incoming.oa_pdf_url);

    if merged.authors.is_empty() && !incoming.authors.is_empty() {
        merged.authors = incoming.authors.clone();
    }
    if merged.fields_of_study.is_empty() && !incoming.fields_of_study.is_empty() {
        merged.fields_of_study = incoming.fields_of_study.clone();
    }
    for tag in &incoming.tags {
        if !merged.has_tag(tag) {
            merged.tags.push(tag.clone());
        }
    }
    if let Some(n) = incoming.seed_connections {
        merged.seed_connections = Some(merged.seed_connections.unwrap_or(0).max(n));
    }
    if merged.notes.is_empty() && !incoming.notes.is_empty() {
        merged.notes = incoming.notes.clone();
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscoveryMethod;

    fn record(id: &str, title: &str, year: Option<i32>) -> Record {
        let mut r = Record::new(id, title);
        r.year = year;
        r
    }

    #[test]
    fn doi_match_wins_first() {
        let mut index = DedupIndex::new(DedupConfig::default());
        let mut a = record("s2:a", "Completely different title", Some(2019));
        a.doi = Some("10.1/a".to_string());
        index.add(&a);

        let mut c = record("s2:b", "Another title entirely", Some(2021));
        c.doi = Some("https://doi.org/10.1/A".to_string());
        assert_eq!(index.decide(&c), DedupDecision::MergeInto("s2:a".to_string()));
    }

    #[test]
    fn pmid_match() {
        let mut index = DedupIndex::new(DedupConfig::default());
        let mut a = record("s2:a", "Title one", Some(2019));
        a.pmid = Some("12345".to_string());
        index.add(&a);

        let mut c = record("pmid:12345", "Title two", Some(2019));
        c.pmid = Some("12345".to_string());
        assert_eq!(index.decide(&c), DedupDecision::MergeInto("s2:a".to_string()));
    }

    #[test]
    fn fuzzy_title_same_year_merges() {
        // "Foo Bar Study" vs "Foo Bar  study", same year
        let mut index = DedupIndex::new(DedupConfig::default());
        let mut a = record("s2:a", "Foo Bar Study", Some(2020));
        a.doi = Some("10.1/a".to_string());
        index.add(&a);

        let c = record("s2:b", "Foo Bar  study", Some(2020));
        assert_eq!(index.decide(&c), DedupDecision::MergeInto("s2:a".to_string()));
    }

    #[test]
    fn year_mismatch_disqualifies_fuzzy() {
        let mut index = DedupIndex::new(DedupConfig::default());
        index.add(&record("s2:a", "Foo Bar Study", Some(2020)));

        // Identical title, different year: never silently merged
        let c = record("s2:b", "Foo Bar Study", Some(2021));
        assert_eq!(index.decide(&c), DedupDecision::NewRecord);
    }

    #[test]
    fn near_threshold_is_ambiguous() {
        let config = DedupConfig {
            title_threshold: 0.92,
            ambiguity_band: 0.05,
        };
        let mut index = DedupIndex::new(config);
        index.add(&record("s2:a", "deep learning for protein folding", Some(2021)));

        // Three edits over 33 chars: 0.909, below the confident threshold
        let c = record("s2:b", "deep learning for protein binding", Some(2021));
        match index.decide(&c) {
            DedupDecision::Ambiguous { closest, ratio } => {
                assert_eq!(closest, "s2:a");
                assert!(ratio < 0.92 && ratio >= 0.87, "ratio {ratio}");
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_title_is_new() {
        let mut index = DedupIndex::new(DedupConfig::default());
        index.add(&record("s2:a", "Foo Bar Study", Some(2020)));
        let c = record("s2:b", "Genome wide association analysis", Some(2020));
        assert_eq!(index.decide(&c), DedupDecision::NewRecord);
    }

    #[test]
    fn merge_unions_identifiers_and_keeps_provenance() {
        let mut a = record("s2:a", "Foo Bar Study", Some(2020));
        a.doi = Some("10.1/a".to_string());
        a.discovery_method = DiscoveryMethod::KeywordSearch;
        a.discovery_query = Some("foo bar".to_string());

        let mut b = record("s2:b", "Foo Bar Study", Some(2020));
        b.pmid = Some("999".to_string());
        b.pmcid = Some("PMC1".to_string());
        b.citation_count = Some(42);
        b.discovery_method = DiscoveryMethod::CitationForward;

        let merged = merge_records(&a, &b);
        assert_eq!(merged.record_id, "s2:a");
        assert_eq!(merged.doi.as_deref(), Some("10.1/a"));
        assert_eq!(merged.pmid.as_deref(), Some("999"));
        assert_eq!(merged.pmcid.as_deref(), Some("PMC1"));
        assert_eq!(merged.citation_count, Some(42));
        // Provenance of the first-seen record is retained
        assert_eq!(merged.discovery_method, DiscoveryMethod::KeywordSearch);
        assert_eq!(merged.discovery_query.as_deref(), Some("foo bar"));
    }

    #[test]
    fn merge_prefers_more_complete_field_by_field() {
        let mut a = record("s2:a", "T", Some(2020));
        a.citation_count = Some(10);
        let mut b = record("s2:b", "T", Some(2020));
        b.citation_count = Some(99);
        b.venue = Some("Nature".to_string());

        let merged = merge_records(&a, &b);
        // Existing non-null value is never overwritten
        assert_eq!(merged.citation_count, Some(10));
        // Missing field filled from the candidate
        assert_eq!(merged.venue.as_deref(), Some("Nature"));
    }

    #[test]
    fn merge_unions_tags() {
        let mut a = record("s2:a", "T", None);
        a.tags = vec!["seed".to_string()];
        let mut b = record("s2:b", "T", None);
        b.tags = vec!["seed".to_string(), "review".to_string()];
        let merged = merge_records(&a, &b);
        assert_eq!(merged.tags, vec!["seed".to_string(), "review".to_string()]);
    }
}
