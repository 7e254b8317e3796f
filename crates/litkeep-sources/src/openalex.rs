//! OpenAlex works API client.
//!
//! OpenAlex serves abstracts as inverted indexes; they are decoded back
//! to plaintext during mapping.

use anyhow::Context;
use litkeep_core::http::get_with_retry;
use litkeep_core::ratelimit::TokenBucket;
use serde::Deserialize;
use serde_json::{Map, Value};

use litkeep_registry::identifiers::normalize_doi;
use litkeep_registry::{Author, DiscoveryMethod, Record};

use crate::{SearchProvider, SearchQuery};

const WORKS_URL: &str = "https://api.openalex.org/works";

/// Concepts kept per work when mapping to fields of study.
const MAX_CONCEPTS: usize = 5;

pub struct OpenAlexClient {
    mailto: Option<String>,
    limiter: TokenBucket,
}

impl OpenAlexClient {
    /// A mailto address moves requests into the polite pool.
    pub fn new(mailto: Option<String>) -> Self {
        Self {
            mailto,
            limiter: TokenBucket::new(10.0),
        }
    }

    fn get(&self, params: &[(&str, String)]) -> anyhow::Result<String> {
        let mut params: Vec<(&str, String)> = params.to_vec();
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        let url = reqwest::Url::parse_with_params(
            WORKS_URL,
            params.iter().map(|(k, v)| (*k, v.as_str())),
        )
        .context("invalid OpenAlex request URL")?;
        self.limiter.acquire();
        Ok(get_with_retry(url.as_str(), &[])?)
    }
}

impl SearchProvider for OpenAlexClient {
    fn name(&self) -> &'static str {
        "openalex"
    }

    fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<Record>> {
        log::info!(
            "OpenAlex search: query={:?} max_results={}",
            query.query,
            query.max_results
        );

        let mut filters = vec!["type:article".to_string()];
        if let Some((from, to)) = query.year_range {
            filters.push(format!("publication_year:{from}-{to}"));
        }
        if let Some(min) = query.min_citations {
            if min > 0 {
                filters.push(format!("cited_by_count:>{min}"));
            }
        }

        let mut records = Vec::new();
        let mut page = 1usize;
        loop {
            let body = self.get(&[
                ("search", query.query.clone()),
                ("filter", filters.join(",")),
                ("per-page", query.max_results.min(200).to_string()),
                ("page", page.to_string()),
            ])?;
            let parsed: WorksPage =
                serde_json::from_str(&body).context("invalid OpenAlex response")?;
            if parsed.results.is_empty() {
                break;
            }
            for work in parsed.results {
                if records.len() >= query.max_results {
                    break;
                }
                if let Some(record) = work_to_record(
                    work,
                    DiscoveryMethod::KeywordSearch,
                    Some(query.query.clone()),
                ) {
                    records.push(record);
                }
            }
            if records.len() >= query.max_results {
                break;
            }
            page += 1;
        }

        log::info!("OpenAlex search returned {} records", records.len());
        Ok(records)
    }
}

/// Decode an inverted index to plaintext.
///
/// Input maps words to position arrays; output is the words joined in
/// position order.
pub fn decode_inverted_index(index: &Map<String, Value>) -> String {
    if index.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(usize, &str)> = Vec::new();
    for (word, positions) in index {
        if let Some(arr) = positions.as_array() {
            for pos in arr {
                if let Some(p) = pos.as_u64() {
                    pairs.push((p as usize, word.as_str()));
                }
            }
        }
    }
    pairs.sort_by_key(|(pos, _)| *pos);
    let words: Vec<&str> = pairs.into_iter().map(|(_, w)| w).collect();
    words.join(" ")
}

// === Wire structs ===

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpenAlexWork {
    id: String,
    title: Option<String>,
    doi: Option<String>,
    ids: WorkIds,
    publication_year: Option<i32>,
    cited_by_count: Option<u64>,
    abstract_inverted_index: Option<Map<String, Value>>,
    open_access: OpenAccess,
    primary_location: Option<WorkLocation>,
    authorships: Vec<Authorship>,
    concepts: Vec<Concept>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkIds {
    pmid: Option<String>,
    pmcid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpenAccess {
    is_oa: bool,
    oa_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkLocation {
    source: Option<LocationSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocationSource {
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Authorship {
    author: Option<AuthorRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorRef {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Concept {
    display_name: Option<String>,
}

/// Extract the short ID from a full OpenAlex URL.
fn short_id(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn work_to_record(
    work: OpenAlexWork,
    method: DiscoveryMethod,
    query: Option<String>,
) -> Option<Record> {
    if work.id.is_empty() {
        return None;
    }
    let title = work.title.filter(|t| !t.trim().is_empty())?;

    let mut record = Record::new(format!("oalex:{}", short_id(&work.id)), title);
    record.doi = work.doi.as_deref().and_then(normalize_doi);
    // pmid/pmcid arrive as resolver URLs
    record.pmid = work.ids.pmid.as_deref().map(|s| short_id(s).to_string());
    record.pmcid = work.ids.pmcid.as_deref().map(|s| short_id(s).to_string());

    record.authors = work
        .authorships
        .into_iter()
        .filter_map(|a| a.author)
        .filter_map(|a| {
            let name = a.display_name?;
            Some(Author {
                author_id: a.id.as_deref().map(|id| format!("oalex:{}", short_id(id))),
                name,
            })
        })
        .collect();
    record.year = work.publication_year;
    record.citation_count = work.cited_by_count;
    record.abstract_text = work
        .abstract_inverted_index
        .as_ref()
        .map(|idx| decode_inverted_index(idx))
        .filter(|t| !t.is_empty());

    record.journal = work
        .primary_location
        .and_then(|l| l.source)
        .and_then(|s| s.display_name);
    record.venue = record.journal.clone();

    record.fields_of_study = work
        .concepts
        .into_iter()
        .take(MAX_CONCEPTS)
        .filter_map(|c| c.display_name)
        .collect();

    record.is_open_access = Some(work.open_access.is_oa);
    record.oa_pdf_url = work.open_access.oa_url;

    record.source = Some("openalex".to_string());
    record.discovery_method = method;
    record.discovery_query = query;
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_empty_index() {
        let index = json!({});
        assert_eq!(decode_inverted_index(index.as_object().unwrap()), "");
    }

    #[test]
    fn decode_repeated_word() {
        let index = json!({"the": [0, 2], "cat": [1], "sat": [3]});
        assert_eq!(
            decode_inverted_index(index.as_object().unwrap()),
            "the cat the sat"
        );
    }

    #[test]
    fn decode_out_of_order_positions() {
        // JSON object iteration order is not position order
        let index = json!({"world": [1], "Hello": [0]});
        assert_eq!(decode_inverted_index(index.as_object().unwrap()), "Hello world");
    }

    #[test]
    fn maps_work() {
        let work: OpenAlexWork = serde_json::from_value(json!({
            "id": "https://openalex.org/W123",
            "title": "A Work",
            "doi": "https://doi.org/10.1000/xyz",
            "ids": {
                "pmid": "https://pubmed.ncbi.nlm.nih.gov/555",
                "pmcid": "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC99"
            },
            "publication_year": 2022,
            "cited_by_count": 7,
            "abstract_inverted_index": {"Hello": [0], "world": [1]},
            "open_access": {"is_oa": true, "oa_url": "https://example.org/w.pdf"},
            "primary_location": {"source": {"display_name": "eLife"}},
            "authorships": [
                {"author": {"id": "https://openalex.org/A1", "display_name": "A. Author"}}
            ],
            "concepts": [{"display_name": "Biology"}, {"display_name": "Genetics"}]
        }))
        .unwrap();

        let r = work_to_record(work, DiscoveryMethod::KeywordSearch, None).unwrap();
        assert_eq!(r.record_id, "oalex:W123");
        assert_eq!(r.doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(r.pmid.as_deref(), Some("555"));
        assert_eq!(r.pmcid.as_deref(), Some("PMC99"));
        assert_eq!(r.abstract_text.as_deref(), Some("Hello world"));
        assert_eq!(r.journal.as_deref(), Some("eLife"));
        assert_eq!(r.authors[0].author_id.as_deref(), Some("oalex:A1"));
        assert_eq!(r.fields_of_study, vec!["Biology", "Genetics"]);
        assert_eq!(r.source.as_deref(), Some("openalex"));
    }

    #[test]
    fn untitled_work_dropped() {
        let work: OpenAlexWork =
            serde_json::from_value(json!({"id": "https://openalex.org/W1"})).unwrap();
        assert!(work_to_record(work, DiscoveryMethod::KeywordSearch, None).is_none());
    }

    #[test]
    #[ignore = "network test, hits the live OpenAlex API"]
    fn live_search() {
        let client = OpenAlexClient::new(None);
        let query = SearchQuery::new("macaque connectome", 5);
        let records = client.search(&query).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.record_id.starts_with("oalex:")));
    }
}
