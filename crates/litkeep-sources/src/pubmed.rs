//! PubMed E-utilities client (esearch + esummary), NCBI id conversion,
//! and the PMC BioC full-text endpoint.

use anyhow::Context;
use litkeep_core::http::get_with_retry;
use litkeep_core::ratelimit::TokenBucket;
use serde::Deserialize;
use serde_json::Value;

use litkeep_registry::identifiers::normalize_doi;
use litkeep_registry::{Author, DiscoveryMethod, Record};

use crate::{SearchProvider, SearchQuery};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const IDCONV_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/";
const BIOC_BASE: &str = "https://www.ncbi.nlm.nih.gov/research/bionlp/RESTful/pmcoa.cgi/BioC_json";

const TOOL_NAME: &str = "litkeep";

pub struct PubMedClient {
    email: Option<String>,
    api_key: Option<String>,
    limiter: TokenBucket,
}

impl PubMedClient {
    /// NCBI allows 10 req/s with an API key, 3 without; stay under both.
    pub fn new(email: Option<String>, api_key: Option<String>) -> Self {
        let rate = if api_key.is_some() { 8.0 } else { 2.0 };
        Self {
            email,
            api_key,
            limiter: TokenBucket::new(rate),
        }
    }

    fn get(&self, base: &str, mut params: Vec<(&str, String)>) -> anyhow::Result<String> {
        params.push(("tool", TOOL_NAME.to_string()));
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        let url =
            reqwest::Url::parse_with_params(base, params.iter().map(|(k, v)| (*k, v.as_str())))
                .context("invalid NCBI request URL")?;
        self.limiter.acquire();
        Ok(get_with_retry(url.as_str(), &[])?)
    }

    /// Fetch summaries for a PMID batch and map them to records.
    fn summaries(&self, pmids: &[String], query: Option<&str>) -> anyhow::Result<Vec<Record>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.get(
            &format!("{EUTILS_BASE}/esummary.fcgi"),
            vec![
                ("db", "pubmed".to_string()),
                ("id", pmids.join(",")),
                ("retmode", "json".to_string()),
            ],
        )?;
        let parsed: Value = serde_json::from_str(&body).context("invalid esummary JSON")?;
        let result = parsed
            .get("result")
            .and_then(Value::as_object)
            .context("no result object in esummary response")?;

        let mut records = Vec::new();
        // uids preserves the relevance order esearch returned
        let uids = result
            .get("uids")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for uid in uids.iter().filter_map(Value::as_str) {
            if let Some(summary) = result.get(uid) {
                if let Some(record) = summary_to_record(uid, summary, query) {
                    records.push(record);
                }
            }
        }
        log::info!("PubMed esummary parsed {} records", records.len());
        Ok(records)
    }

    /// Convert a PMID to its PMCID via the NCBI id converter.
    pub fn pmid_to_pmcid(&self, pmid: &str) -> anyhow::Result<Option<String>> {
        let body = self.get(
            IDCONV_URL,
            vec![
                ("ids", pmid.to_string()),
                ("format", "json".to_string()),
            ],
        )?;
        let parsed: Value = serde_json::from_str(&body).context("invalid idconv JSON")?;
        let pmcid = parsed
            .get("records")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(|r| r.get("pmcid"))
            .and_then(Value::as_str)
            .map(String::from);
        Ok(pmcid)
    }
}

/// BioC full-text JSON endpoint for an open-access PMC article.
pub fn bioc_url(pmcid: &str) -> String {
    let digits = pmcid.trim_start_matches("PMC");
    format!("{BIOC_BASE}/{digits}/unicode")
}

impl SearchProvider for PubMedClient {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<Record>> {
        let mut term = query.query.clone();
        if let Some((from, to)) = query.year_range {
            term = format!("({term}) AND ({from}:{to}[pdat])");
        }
        log::info!("PubMed search: term={:?} max_results={}", term, query.max_results);

        let body = self.get(
            &format!("{EUTILS_BASE}/esearch.fcgi"),
            vec![
                ("db", "pubmed".to_string()),
                ("term", term.clone()),
                ("retmax", query.max_results.to_string()),
                ("sort", "relevance".to_string()),
                ("retmode", "json".to_string()),
            ],
        )?;
        let parsed: EsearchResponse =
            serde_json::from_str(&body).context("invalid esearch JSON")?;
        let pmids = parsed.esearchresult.idlist;
        if pmids.is_empty() {
            log::info!("PubMed search returned 0 results");
            return Ok(Vec::new());
        }
        self.summaries(&pmids, Some(&term))
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EsearchResult {
    idlist: Vec<String>,
}

/// Map one esummary document to a canonical record.
fn summary_to_record(uid: &str, summary: &Value, query: Option<&str>) -> Option<Record> {
    let title = summary.get("title").and_then(Value::as_str)?;
    let title = title.trim().trim_end_matches('.');
    if title.is_empty() {
        return None;
    }

    let mut record = Record::new(format!("pmid:{uid}"), title);
    record.pmid = Some(uid.to_string());

    if let Some(ids) = summary.get("articleids").and_then(Value::as_array) {
        for id in ids {
            let idtype = id.get("idtype").and_then(Value::as_str).unwrap_or("");
            let value = id.get("value").and_then(Value::as_str).unwrap_or("");
            match idtype {
                "doi" => record.doi = normalize_doi(value),
                "pmc" => {
                    let pmcid = if value.starts_with("PMC") {
                        value.to_string()
                    } else {
                        format!("PMC{value}")
                    };
                    record.pmcid = Some(pmcid);
                }
                _ => {}
            }
        }
    }

    // pubdate looks like "2023 Jan-Feb"; the year is the first token
    record.year = summary
        .get("pubdate")
        .and_then(Value::as_str)
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok());

    record.journal = summary
        .get("fulljournalname")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);
    record.venue = summary
        .get("source")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| record.journal.clone());

    if let Some(authors) = summary.get("authors").and_then(Value::as_array) {
        record.authors = authors
            .iter()
            .filter_map(|a| a.get("name").and_then(Value::as_str))
            .map(|name| Author {
                name: name.to_string(),
                author_id: None,
            })
            .collect();
    }

    record.source = Some("pubmed".to_string());
    record.discovery_method = DiscoveryMethod::KeywordSearch;
    record.discovery_query = query.map(String::from);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_summary_document() {
        let summary = json!({
            "title": "A macaque study.",
            "pubdate": "2023 Jan-Feb",
            "fulljournalname": "Journal of Primatology",
            "source": "J Primatol",
            "authors": [{"name": "Smith J"}, {"name": "Doe A"}],
            "articleids": [
                {"idtype": "pubmed", "value": "12345"},
                {"idtype": "doi", "value": "10.1000/ABC"},
                {"idtype": "pmc", "value": "9876543"}
            ]
        });
        let r = summary_to_record("12345", &summary, Some("macaque")).unwrap();
        assert_eq!(r.record_id, "pmid:12345");
        assert_eq!(r.title, "A macaque study");
        assert_eq!(r.doi.as_deref(), Some("10.1000/abc"));
        assert_eq!(r.pmcid.as_deref(), Some("PMC9876543"));
        assert_eq!(r.year, Some(2023));
        assert_eq!(r.venue.as_deref(), Some("J Primatol"));
        assert_eq!(r.authors.len(), 2);
        assert_eq!(r.source.as_deref(), Some("pubmed"));
    }

    #[test]
    fn untitled_summary_dropped() {
        assert!(summary_to_record("1", &json!({"pubdate": "2020"}), None).is_none());
    }

    #[test]
    fn bioc_url_strips_prefix() {
        assert_eq!(
            bioc_url("PMC7654321"),
            "https://www.ncbi.nlm.nih.gov/research/bionlp/RESTful/pmcoa.cgi/BioC_json/7654321/unicode"
        );
        assert!(bioc_url("7654321").ends_with("/7654321/unicode"));
    }

    #[test]
    #[ignore = "network test, hits the live NCBI API"]
    fn live_search() {
        let client = PubMedClient::new(None, None);
        let query = SearchQuery::new("rhesus macaque immunology", 5);
        let records = client.search(&query).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.pmid.is_some()));
    }
}
