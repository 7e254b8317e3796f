//! Canonical record schema and the retrieval status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::identifiers::{normalize_doi, sanitize_for_filename};

/// How a record entered the registry. Immutable once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    KeywordSearch,
    CitationForward,
    CitationBackward,
    Recommendation,
    Manual,
}

impl DiscoveryMethod {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "keyword_search" => Some(Self::KeywordSearch),
            "citation_forward" => Some(Self::CitationForward),
            "citation_backward" => Some(Self::CitationBackward),
            "recommendation" => Some(Self::Recommendation),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeywordSearch => "keyword_search",
            Self::CitationForward => "citation_forward",
            Self::CitationBackward => "citation_backward",
            Self::Recommendation => "recommendation",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval state machine. `needs_manual` is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    NotAttempted,
    Retrieved,
    Partial,
    Failed,
    ManualPending,
    ManualRetrieved,
}

impl RetrievalStatus {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "not_attempted" => Some(Self::NotAttempted),
            "retrieved" => Some(Self::Retrieved),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "manual_pending" => Some(Self::ManualPending),
            "manual_retrieved" => Some(Self::ManualRetrieved),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Retrieved => "retrieved",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::ManualPending => "manual_pending",
            Self::ManualRetrieved => "manual_retrieved",
        }
    }

    /// Terminal states are never re-attempted by the state machine.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Retrieved | Self::ManualRetrieved)
    }

    /// Records awaiting human follow-up.
    pub fn needs_manual(self) -> bool {
        matches!(self, Self::Failed | Self::ManualPending)
    }

    /// Whether `self -> to` is a legal state machine edge.
    ///
    /// Same-state updates (e.g. a re-run that fails again) are handled
    /// as no-ops by the store, not as transitions.
    pub fn can_transition(self, to: RetrievalStatus) -> bool {
        use RetrievalStatus::*;
        matches!(
            (self, to),
            (NotAttempted, Retrieved | Partial | Failed)
                | (Failed, ManualPending | Retrieved | Partial | ManualRetrieved)
                | (ManualPending, ManualRetrieved)
                | (Retrieved, Retrieved | Partial)
                | (Partial, Retrieved | Partial)
        )
    }
}

impl std::fmt::Display for RetrievalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status implied by which artifacts are present after a retrieval run.
pub fn status_for_artifacts(has_pdf: bool, has_structured: bool) -> RetrievalStatus {
    match (has_pdf, has_structured) {
        (true, true) => RetrievalStatus::Retrieved,
        (true, false) | (false, true) => RetrievalStatus::Partial,
        (false, false) => RetrievalStatus::Failed,
    }
}

/// Which upstream produced an acquired artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    SemanticScholar,
    Unpaywall,
    PmcBioc,
    Biorxiv,
    Arxiv,
    Manual,
}

impl ArtifactSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SemanticScholar => "semantic_scholar",
            Self::Unpaywall => "unpaywall",
            Self::PmcBioc => "pmc_bioc",
            Self::Biorxiv => "biorxiv",
            Self::Arxiv => "arxiv",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// One literature work's canonical entry. One JSON object per registry
/// line; optional fields are omitted from serialization when unset so
/// lines stay short and diffable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,

    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influential_citation_count: Option<u64>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields_of_study: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oa_pdf_url: Option<String>,

    // Discovery provenance — immutable once the record is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub discovery_method: DiscoveryMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_connections: Option<u32>,

    pub status: RetrievalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txt_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_source: Option<ArtifactSource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl Record {
    pub fn new(record_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            doi: None,
            pmid: None,
            pmcid: None,
            arxiv_id: None,
            title: title.into(),
            authors: Vec::new(),
            year: None,
            venue: None,
            journal: None,
            citation_count: None,
            influential_citation_count: None,
            abstract_text: None,
            fields_of_study: Vec::new(),
            is_open_access: None,
            oa_pdf_url: None,
            source: None,
            discovery_method: DiscoveryMethod::KeywordSearch,
            discovery_query: None,
            discovered_at: Some(Utc::now()),
            seed_record_id: None,
            seed_connections: None,
            status: RetrievalStatus::NotAttempted,
            pdf_path: None,
            xml_path: None,
            txt_path: None,
            artifact_source: None,
            tags: Vec::new(),
            notes: String::new(),
        }
    }

    /// Derived, never stored: true iff the record awaits human action.
    pub fn needs_manual(&self) -> bool {
        self.status.needs_manual()
    }

    pub fn has_pdf(&self) -> bool {
        self.pdf_path.is_some()
    }

    pub fn has_structured(&self) -> bool {
        self.xml_path.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Canonical filename suggested for manual drops of this record.
    pub fn suggested_filename(&self) -> String {
        let identifier = self
            .doi
            .clone()
            .unwrap_or_else(|| self.record_id.replace(':', "_"));
        format!("{}.pdf", sanitize_for_filename(&identifier))
    }

    /// Reject-before-write validation: schema basics plus the invariant
    /// that status is consistent with artifact presence.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |reason: &str| {
            Err(StoreError::Invalid {
                record_id: self.record_id.clone(),
                reason: reason.to_string(),
            })
        };
        if self.record_id.trim().is_empty() {
            return invalid("empty record_id");
        }
        if self.title.trim().is_empty() {
            return invalid("empty title");
        }
        if let Some(doi) = &self.doi {
            if normalize_doi(doi).is_none() {
                return invalid("malformed DOI");
            }
        }
        let artifacts = (self.has_pdf(), self.has_structured());
        let consistent = match self.status {
            RetrievalStatus::NotAttempted
            | RetrievalStatus::Failed
            | RetrievalStatus::ManualPending => artifacts == (false, false),
            RetrievalStatus::Partial => artifacts == (true, false) || artifacts == (false, true),
            RetrievalStatus::Retrieved => artifacts == (true, true),
            RetrievalStatus::ManualRetrieved => artifacts != (false, false),
        };
        if !consistent {
            return invalid("status inconsistent with artifact presence");
        }
        if self.txt_path.is_some() && artifacts == (false, false) {
            return invalid("extracted text without any source artifact");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: RetrievalStatus, pdf: bool, xml: bool) -> Record {
        let mut r = Record::new("s2:1", "A title");
        r.status = status;
        r.pdf_path = pdf.then(|| "fulltext/pdf/a.pdf".to_string());
        r.xml_path = xml.then(|| "fulltext/xml/a.json".to_string());
        r
    }

    #[test]
    fn legal_transitions() {
        use RetrievalStatus::*;
        assert!(NotAttempted.can_transition(Retrieved));
        assert!(NotAttempted.can_transition(Partial));
        assert!(NotAttempted.can_transition(Failed));
        assert!(Failed.can_transition(ManualPending));
        assert!(Failed.can_transition(Retrieved));
        assert!(Failed.can_transition(Partial));
        assert!(ManualPending.can_transition(ManualRetrieved));
        assert!(Partial.can_transition(Retrieved));
    }

    #[test]
    fn illegal_transitions() {
        use RetrievalStatus::*;
        assert!(!Retrieved.can_transition(Failed));
        assert!(!Retrieved.can_transition(NotAttempted));
        assert!(!ManualRetrieved.can_transition(Retrieved));
        assert!(!NotAttempted.can_transition(ManualPending));
        assert!(!NotAttempted.can_transition(ManualRetrieved));
        assert!(!ManualPending.can_transition(Failed));
    }

    #[test]
    fn needs_manual_derived_from_status() {
        use RetrievalStatus::*;
        for (status, expected) in [
            (NotAttempted, false),
            (Retrieved, false),
            (Partial, false),
            (Failed, true),
            (ManualPending, true),
            (ManualRetrieved, false),
        ] {
            assert_eq!(status.needs_manual(), expected, "{status}");
        }
    }

    #[test]
    fn artifact_status_mapping() {
        assert_eq!(status_for_artifacts(true, true), RetrievalStatus::Retrieved);
        assert_eq!(status_for_artifacts(true, false), RetrievalStatus::Partial);
        assert_eq!(status_for_artifacts(false, true), RetrievalStatus::Partial);
        assert_eq!(status_for_artifacts(false, false), RetrievalStatus::Failed);
    }

    #[test]
    fn validate_consistency() {
        assert!(record(RetrievalStatus::NotAttempted, false, false).validate().is_ok());
        assert!(record(RetrievalStatus::Partial, true, false).validate().is_ok());
        assert!(record(RetrievalStatus::Retrieved, true, true).validate().is_ok());
        // Status claims retrieved but no artifacts present
        assert!(record(RetrievalStatus::Retrieved, false, false).validate().is_err());
        // Failed with a PDF on disk is contradictory
        assert!(record(RetrievalStatus::Failed, true, false).validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_doi() {
        let mut r = record(RetrievalStatus::NotAttempted, false, false);
        r.doi = Some("not-a-doi".to_string());
        assert!(r.validate().is_err());
    }

    #[test]
    fn suggested_filename_from_doi() {
        let mut r = Record::new("s2:abc", "T");
        r.doi = Some("10.1038/s41586-023-1".to_string());
        assert_eq!(r.suggested_filename(), "10.1038_s41586-023-1.pdf");
    }

    #[test]
    fn suggested_filename_falls_back_to_id() {
        let r = Record::new("s2:abc", "T");
        assert_eq!(r.suggested_filename(), "s2_abc.pdf");
    }

    #[test]
    fn serde_roundtrip_omits_unset() {
        let r = Record::new("pmid:123", "A study");
        let line = serde_json::to_string(&r).unwrap();
        assert!(!line.contains("\"doi\""));
        assert!(!line.contains("needs_manual"));
        let back: Record = serde_json::from_str(&line).unwrap();
        assert_eq!(back.record_id, "pmid:123");
        assert_eq!(back.status, RetrievalStatus::NotAttempted);
    }
}
