//! Pipeline configuration types and project layout.
//!
//! Every struct has serde derives plus a `Default` the CLI layer can
//! overlay TOML values onto.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::retrieve::{PdfSource, TextSource};

/// On-disk layout of a corpus project directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn records(&self) -> PathBuf {
        self.project_dir.join("records.jsonl")
    }

    pub fn attempts(&self) -> PathBuf {
        self.project_dir.join("attempts.jsonl")
    }

    pub fn manual_list(&self) -> PathBuf {
        self.project_dir.join("manual_retrieval.md")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.project_dir.join("fulltext").join("pdf")
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.project_dir.join("fulltext").join("xml")
    }

    pub fn searches_dir(&self) -> PathBuf {
        self.project_dir.join("searches")
    }

    pub fn expansions_dir(&self) -> PathBuf {
        self.project_dir.join("expansions")
    }

    /// Artifact path stored in the registry: relative to the project
    /// dir so the project stays relocatable.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// Keyword search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub year_range: Option<(i32, i32)>,
    pub min_citations: u64,
    pub max_results: usize,
    pub fields_of_study: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            year_range: None,
            min_citations: 0,
            max_results: 100,
            fields_of_study: Vec::new(),
        }
    }
}

/// Dedup tuning, passed through to the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    pub title_threshold: f64,
    pub ambiguity_band: f64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        let d = litkeep_registry::DedupConfig::default();
        Self {
            title_threshold: d.title_threshold,
            ambiguity_band: d.ambiguity_band,
        }
    }
}

impl From<DedupSettings> for litkeep_registry::DedupConfig {
    fn from(s: DedupSettings) -> Self {
        Self {
            title_threshold: s.title_threshold,
            ambiguity_band: s.ambiguity_band,
        }
    }
}

/// Retrieval run settings. Chains are data: order and membership are
/// configurable without touching the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub pdf_chain: Vec<PdfSource>,
    pub text_chain: Vec<TextSource>,
    pub concurrency: usize,
    pub inbox_dir: String,
    pub processed_dir: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pdf_chain: vec![
                PdfSource::SemanticScholar,
                PdfSource::Unpaywall,
                PdfSource::Biorxiv,
                PdfSource::Arxiv,
            ],
            text_chain: vec![TextSource::PmcBioc],
            concurrency: 5,
            inbox_dir: "fulltext/inbox".to_string(),
            processed_dir: "fulltext/processed".to_string(),
        }
    }
}

/// Citation expansion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    pub depth: usize,
    pub max_candidates: usize,
    pub seed_tag: String,
    /// Seeds carried into the next depth level.
    pub next_depth_seeds: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            max_candidates: 500,
            seed_tag: "seed".to_string(),
            next_depth_seeds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chains() {
        let config = RetrievalConfig::default();
        assert_eq!(config.pdf_chain.len(), 4);
        assert_eq!(config.pdf_chain[0], PdfSource::SemanticScholar);
        assert_eq!(config.text_chain, vec![TextSource::PmcBioc]);
        assert_eq!(config.concurrency, 5);
    }

    #[test]
    fn paths_are_project_relative() {
        let paths = ProjectPaths::new("/data/corpus");
        assert_eq!(
            paths.relative(&paths.pdf_dir().join("a.pdf")),
            "fulltext/pdf/a.pdf"
        );
    }

    #[test]
    fn retrieval_config_deserializes_chains_by_name() {
        let toml_like = serde_json::json!({
            "pdf_chain": ["unpaywall", "arxiv"],
            "concurrency": 2
        });
        let config: RetrievalConfig = serde_json::from_value(toml_like).unwrap();
        assert_eq!(config.pdf_chain, vec![PdfSource::Unpaywall, PdfSource::Arxiv]);
        assert_eq!(config.concurrency, 2);
        // Unspecified fields keep their defaults
        assert_eq!(config.text_chain, vec![TextSource::PmcBioc]);
    }
}
