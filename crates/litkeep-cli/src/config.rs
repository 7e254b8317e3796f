//! Configuration loading from litkeep.toml plus environment overlays.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use litkeep_pipeline::{DedupSettings, ExpandConfig, RetrievalConfig, SearchConfig};

/// Global configuration for litkeep.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub apis: ApiConfig,
    pub search: SearchConfig,
    pub dedup: DedupSettings,
    pub retrieval: RetrievalConfig,
    pub expand: ExpandConfig,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    /// Corpus project directory; everything lives under it.
    pub dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub s2_api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub ncbi_api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub ncbi_email: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub unpaywall_email: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub openalex_mailto: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            s2_api_key: std::env::var("S2_API_KEY").ok(),
            ncbi_api_key: std::env::var("NCBI_API_KEY").ok(),
            ncbi_email: std::env::var("NCBI_EMAIL").ok(),
            unpaywall_email: std::env::var("UNPAYWALL_EMAIL").ok(),
            // Falls back to the Unpaywall contact email when unset
            openalex_mailto: std::env::var("OPENALEX_MAILTO")
                .or_else(|_| std::env::var("UNPAYWALL_EMAIL"))
                .ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Deserialize a string that may contain an environment variable
/// reference like ${VAR}.
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to the environment variable value.
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration for a project directory.
    ///
    /// Search order:
    /// 1. {project_dir}/litkeep.toml
    /// 2. ~/.config/litkeep/config.toml
    ///
    /// If no config file is found, returns defaults rooted at the
    /// project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let local = project_dir.join("litkeep.toml");
        if local.exists() {
            let mut config = Self::from_file(&local)?;
            config.project.dir = project_dir.to_path_buf();
            return Ok(config);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "litkeep") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                let mut config = Self::from_file(&user_config)?;
                config.project.dir = project_dir.to_path_buf();
                return Ok(config);
            }
        }

        log::debug!("no config file found, using defaults");
        Ok(Self {
            project: ProjectConfig {
                dir: project_dir.to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Template written by `litkeep init`.
pub fn default_toml(name: &str) -> String {
    format!(
        r#"[project]
name = "{name}"

[apis]
# Secrets can reference environment variables:
# s2_api_key = "${{S2_API_KEY}}"
# ncbi_api_key = "${{NCBI_API_KEY}}"
# ncbi_email = "you@example.org"
# unpaywall_email = "you@example.org"

[search]
# year_range = [2015, 2025]
min_citations = 0
max_results = 100
fields_of_study = []

[dedup]
title_threshold = 0.92
ambiguity_band = 0.05

[retrieval]
pdf_chain = ["semantic_scholar", "unpaywall", "biorxiv", "arxiv"]
text_chain = ["pmc_bioc"]
concurrency = 5
inbox_dir = "fulltext/inbox"
processed_dir = "fulltext/processed"

[expand]
depth = 1
max_candidates = 500
seed_tag = "seed"
next_depth_seeds = 10

[http]
timeout_secs = 30
max_retries = 3
"#
    )
}
