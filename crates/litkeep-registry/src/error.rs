//! Structured registry errors.
//!
//! Data-integrity violations are rejected before any write; callers
//! branch on the variant (reject vs. surface vs. abort).

use crate::model::RetrievalStatus;

#[derive(Debug)]
pub enum StoreError {
    /// A status change not permitted by the retrieval state machine.
    IllegalTransition {
        record_id: String,
        from: RetrievalStatus,
        to: RetrievalStatus,
    },
    /// Two records would share an identifier in the same namespace.
    DuplicateIdentifier {
        namespace: &'static str,
        value: String,
        existing: String,
    },
    /// Record id not present in the registry.
    UnknownRecord(String),
    /// Candidate failed validation before write.
    Invalid { record_id: String, reason: String },
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalTransition {
                record_id,
                from,
                to,
            } => write!(f, "{record_id}: illegal status transition {from} -> {to}"),
            Self::DuplicateIdentifier {
                namespace,
                value,
                existing,
            } => write!(f, "duplicate {namespace} {value:?} (held by {existing})"),
            Self::UnknownRecord(id) => write!(f, "unknown record {id}"),
            Self::Invalid { record_id, reason } => write!(f, "invalid record {record_id}: {reason}"),
            Self::Io(e) => write!(f, "registry IO: {e}"),
            Self::Json(e) => write!(f, "registry line: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl StoreError {
    /// True for reject-before-write violations (as opposed to I/O).
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. }
                | Self::DuplicateIdentifier { .. }
                | Self::Invalid { .. }
        )
    }
}
