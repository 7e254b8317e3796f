//! litkeep-pipeline - Corpus operations
//!
//! The operations that move a corpus project forward: multi-source
//! search, citation expansion, full-text retrieval, manual PDF ingest,
//! ranking, and reporting. Each operation takes the registry plus
//! narrow capability handles so tests can substitute canned
//! implementations for the network.

pub mod config;
pub mod expand;
pub mod ingest;
pub mod rank;
pub mod report;
pub mod retrieve;
pub mod search;

pub use config::{DedupSettings, ExpandConfig, ProjectPaths, RetrievalConfig, SearchConfig};
pub use expand::{ExpandDeps, ExpandOptions, ExpandStrategy, ExpandSummary, run_expand};
pub use ingest::{IngestOptions, IngestSummary, MatchError, run_ingest};
pub use rank::{RankOptions, RankedRecord, run_rank};
pub use report::{CorpusStats, ReportFormat, build_stats, render};
pub use retrieve::{
    PdfSource, PmcidResolver, RetrieveDeps, RetrieveOptions, RetrieveSummary, TextSource,
    run_retrieve,
};
pub use search::{SearchOptions, SearchSummary, run_search};
