//! litkeep-registry - Canonical literature registry
//!
//! The append-only record store, cross-source deduplication, identifier
//! normalization, the retrieval attempt log, and the manual-attention
//! document. All registry mutation flows through [`store::Registry`].

pub mod attempt_log;
pub mod dedup;
pub mod error;
pub mod identifiers;
pub mod manual_list;
pub mod model;
pub mod store;

pub use attempt_log::{AttemptLog, AttemptOutcome, AttemptRecord};
pub use dedup::{DedupConfig, DedupDecision, DedupIndex, merge_records};
pub use error::StoreError;
pub use manual_list::write_manual_list;
pub use model::{
    ArtifactSource, Author, DiscoveryMethod, Record, RetrievalStatus, status_for_artifacts,
};
pub use store::{ArtifactUpdate, Filter, Registry, UpsertOutcome};
