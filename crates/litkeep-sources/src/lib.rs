//! litkeep-sources - Upstream literature source clients
//!
//! Narrow capability traits for the orchestration layer, plus the
//! concrete clients (Semantic Scholar, PubMed, OpenAlex, Unpaywall).
//! Every client goes through the shared HTTP facade with bounded retry
//! and owns a token bucket matched to its upstream's rate limit.

pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;
pub mod unpaywall;

use litkeep_registry::Record;

pub use openalex::OpenAlexClient;
pub use pubmed::PubMedClient;
pub use semantic_scholar::SemanticScholarClient;
pub use unpaywall::UnpaywallClient;

/// Keyword search request shared by all search-capable sources.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub year_range: Option<(i32, i32)>,
    pub min_citations: Option<u64>,
    pub fields_of_study: Vec<String>,
    pub max_results: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            ..Default::default()
        }
    }
}

/// Keyword search over one upstream source.
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<Record>>;
}

/// Citation-graph traversal from a known record.
pub trait CitationProvider: Send + Sync {
    /// Records citing `record_id` (forward edges).
    fn citations(&self, record_id: &str, max_results: usize) -> anyhow::Result<Vec<Record>>;
    /// Records referenced by `record_id` (backward edges).
    fn references(&self, record_id: &str, max_results: usize) -> anyhow::Result<Vec<Record>>;
}

/// Algorithmic "more like these" suggestions.
pub trait RecommendationProvider: Send + Sync {
    fn recommendations(
        &self,
        record_ids: &[String],
        max_results: usize,
    ) -> anyhow::Result<Vec<Record>>;
}

/// Best known open-access location for a DOI.
#[derive(Debug, Clone)]
pub struct OaLocation {
    pub is_oa: bool,
    pub pdf_url: Option<String>,
    pub landing_page_url: Option<String>,
    /// "publisher" or "repository".
    pub host_type: Option<String>,
    pub license: Option<String>,
    pub version: Option<String>,
}

pub trait OaLocator: Send + Sync {
    /// `Ok(None)` means the DOI is unknown to the locator, not an error.
    fn best_oa_location(&self, doi: &str) -> anyhow::Result<Option<OaLocation>>;
}
