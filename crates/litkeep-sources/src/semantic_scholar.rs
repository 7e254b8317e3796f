//! Semantic Scholar Graph API client

use anyhow::Context;
use litkeep_core::http::get_with_retry;
use litkeep_core::ratelimit::TokenBucket;
use serde::Deserialize;

use litkeep_registry::identifiers::normalize_doi;
use litkeep_registry::{Author, DiscoveryMethod, Record};

use crate::{CitationProvider, RecommendationProvider, SearchProvider, SearchQuery};

const GRAPH_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const RECOMMEND_BASE: &str = "https://api.semanticscholar.org/recommendations/v1";

/// Metadata fields requested on every paper endpoint.
const S2_FIELDS: &str = "paperId,externalIds,title,abstract,year,venue,journal,\
citationCount,influentialCitationCount,isOpenAccess,openAccessPdf,fieldsOfStudy,authors";

/// Single page cap of the search endpoint.
const SEARCH_PAGE_LIMIT: usize = 100;

pub struct SemanticScholarClient {
    api_key: Option<String>,
    limiter: TokenBucket,
}

impl SemanticScholarClient {
    /// Without a key S2 enforces a shared pool; stay well under it.
    pub fn new(api_key: Option<String>) -> Self {
        let rate = if api_key.is_some() { 10.0 } else { 0.8 };
        Self {
            api_key,
            limiter: TokenBucket::new(rate),
        }
    }

    fn get(&self, url: &str) -> anyhow::Result<String> {
        self.limiter.acquire();
        let headers: Vec<(&str, &str)> = match &self.api_key {
            Some(key) => vec![("x-api-key", key.as_str())],
            None => Vec::new(),
        };
        Ok(get_with_retry(url, &headers)?)
    }

    fn paged_url(&self, path: &str, params: &[(&str, String)]) -> anyhow::Result<String> {
        let url = reqwest::Url::parse_with_params(path, params.iter().map(|(k, v)| (*k, v.as_str())))
            .context("invalid S2 request URL")?;
        Ok(url.into())
    }
}

impl SearchProvider for SemanticScholarClient {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<Record>> {
        log::info!(
            "S2 search: query={:?} max_results={}",
            query.query,
            query.max_results
        );

        let mut records = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("query", query.query.clone()),
                ("fields", S2_FIELDS.to_string()),
                (
                    "limit",
                    (query.max_results - records.len()).min(SEARCH_PAGE_LIMIT).to_string(),
                ),
                ("offset", offset.to_string()),
            ];
            if let Some((from, to)) = query.year_range {
                params.push(("year", format!("{from}-{to}")));
            }
            if let Some(min) = query.min_citations {
                params.push(("minCitationCount", min.to_string()));
            }
            if !query.fields_of_study.is_empty() {
                params.push(("fieldsOfStudy", query.fields_of_study.join(",")));
            }

            let url = self.paged_url(&format!("{GRAPH_BASE}/paper/search"), &params)?;
            let body = self.get(&url).context("S2 search request failed")?;
            let page: S2SearchPage =
                serde_json::from_str(&body).context("invalid S2 search response")?;

            for raw in page.data {
                if records.len() >= query.max_results {
                    break;
                }
                if let Some(record) = s2_record(
                    raw,
                    DiscoveryMethod::KeywordSearch,
                    Some(query.query.clone()),
                    None,
                ) {
                    records.push(record);
                }
            }
            match page.next {
                Some(next) if records.len() < query.max_results => offset = next,
                _ => break,
            }
        }

        log::info!("S2 search returned {} records", records.len());
        Ok(records)
    }
}

impl CitationProvider for SemanticScholarClient {
    fn citations(&self, record_id: &str, max_results: usize) -> anyhow::Result<Vec<Record>> {
        let raw_id = record_id.strip_prefix("s2:").unwrap_or(record_id);
        let params = [
            ("fields", S2_FIELDS.to_string()),
            ("limit", max_results.min(1000).to_string()),
        ];
        let url = self.paged_url(&format!("{GRAPH_BASE}/paper/{raw_id}/citations"), &params)?;
        let body = self
            .get(&url)
            .with_context(|| format!("S2 citations request failed for {record_id}"))?;
        let page: S2EdgePage =
            serde_json::from_str(&body).context("invalid S2 citations response")?;

        let records = page
            .data
            .into_iter()
            .filter_map(|edge| edge.citing_paper)
            .filter_map(|raw| {
                s2_record(
                    raw,
                    DiscoveryMethod::CitationForward,
                    None,
                    Some(record_id.to_string()),
                )
            })
            .take(max_results)
            .collect();
        Ok(records)
    }

    fn references(&self, record_id: &str, max_results: usize) -> anyhow::Result<Vec<Record>> {
        let raw_id = record_id.strip_prefix("s2:").unwrap_or(record_id);
        let params = [
            ("fields", S2_FIELDS.to_string()),
            ("limit", max_results.min(1000).to_string()),
        ];
        let url = self.paged_url(&format!("{GRAPH_BASE}/paper/{raw_id}/references"), &params)?;
        let body = self
            .get(&url)
            .with_context(|| format!("S2 references request failed for {record_id}"))?;
        let page: S2EdgePage =
            serde_json::from_str(&body).context("invalid S2 references response")?;

        let records = page
            .data
            .into_iter()
            .filter_map(|edge| edge.cited_paper)
            .filter_map(|raw| {
                s2_record(
                    raw,
                    DiscoveryMethod::CitationBackward,
                    None,
                    Some(record_id.to_string()),
                )
            })
            .take(max_results)
            .collect();
        Ok(records)
    }
}

impl RecommendationProvider for SemanticScholarClient {
    fn recommendations(
        &self,
        record_ids: &[String],
        max_results: usize,
    ) -> anyhow::Result<Vec<Record>> {
        // The forpaper endpoint takes one positive example; use the first.
        let Some(first) = record_ids.first() else {
            return Ok(Vec::new());
        };
        let raw_id = first.strip_prefix("s2:").unwrap_or(first);
        let params = [
            ("fields", S2_FIELDS.to_string()),
            ("limit", max_results.min(500).to_string()),
        ];
        let url = self.paged_url(
            &format!("{RECOMMEND_BASE}/papers/forpaper/{raw_id}"),
            &params,
        )?;
        let body = self
            .get(&url)
            .with_context(|| format!("S2 recommendations request failed for {first}"))?;
        let page: S2RecommendPage =
            serde_json::from_str(&body).context("invalid S2 recommendations response")?;

        let records = page
            .recommended_papers
            .into_iter()
            .filter_map(|raw| {
                s2_record(
                    raw,
                    DiscoveryMethod::Recommendation,
                    None,
                    Some(first.clone()),
                )
            })
            .take(max_results)
            .collect();
        Ok(records)
    }
}

// === Wire structs ===

#[derive(Debug, Deserialize)]
struct S2SearchPage {
    #[serde(default)]
    data: Vec<S2Paper>,
    #[serde(default)]
    next: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct S2EdgePage {
    #[serde(default)]
    data: Vec<S2Edge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Edge {
    #[serde(default)]
    citing_paper: Option<S2Paper>,
    #[serde(default)]
    cited_paper: Option<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2RecommendPage {
    #[serde(default)]
    recommended_papers: Vec<S2Paper>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct S2Paper {
    paper_id: Option<String>,
    external_ids: Option<S2ExternalIds>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    journal: Option<S2Journal>,
    citation_count: Option<u64>,
    influential_citation_count: Option<u64>,
    is_open_access: Option<bool>,
    open_access_pdf: Option<S2OpenAccessPdf>,
    fields_of_study: Option<Vec<String>>,
    authors: Vec<S2Author>,
}

#[derive(Debug, Default, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
    #[serde(rename = "PubMedCentral")]
    pubmed_central: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct S2Journal {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct S2Author {
    author_id: Option<String>,
    name: Option<String>,
}

/// Map one S2 paper to a canonical record. Entries missing an id or
/// title are dropped (withdrawn or stub results).
fn s2_record(
    raw: S2Paper,
    method: DiscoveryMethod,
    query: Option<String>,
    seed: Option<String>,
) -> Option<Record> {
    let paper_id = raw.paper_id?;
    let title = raw.title.filter(|t| !t.trim().is_empty())?;

    let mut record = Record::new(format!("s2:{paper_id}"), title);
    let ext = raw.external_ids.unwrap_or_default();
    record.doi = ext.doi.as_deref().and_then(normalize_doi);
    record.pmid = ext.pubmed;
    record.pmcid = ext.pubmed_central;
    record.arxiv_id = ext.arxiv;

    record.authors = raw
        .authors
        .into_iter()
        .filter_map(|a| {
            let name = a.name?;
            Some(Author {
                name,
                author_id: a.author_id.map(|id| format!("s2:{id}")),
            })
        })
        .collect();
    record.year = raw.year;
    record.venue = raw.venue.filter(|v| !v.is_empty());
    record.journal = raw.journal.and_then(|j| j.name);
    record.citation_count = raw.citation_count;
    record.influential_citation_count = raw.influential_citation_count;
    record.abstract_text = raw.abstract_text;
    record.fields_of_study = raw.fields_of_study.unwrap_or_default();
    record.is_open_access = raw.is_open_access;
    record.oa_pdf_url = raw.open_access_pdf.and_then(|p| p.url);

    record.source = Some("semantic_scholar".to_string());
    record.discovery_method = method;
    record.discovery_query = query;
    record.seed_record_id = seed;
    Some(record)
}
