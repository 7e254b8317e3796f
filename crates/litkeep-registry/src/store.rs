//! The canonical registry store.
//!
//! One JSON record per line. New records are appended; field updates
//! rewrite the file through a tmp-and-rename, preserving the
//! line-for-line order of untouched records. All mutation goes through
//! `&mut self`, so writes are serialized by construction; reads work
//! against the in-memory snapshot loaded at open.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::dedup::{DedupConfig, DedupDecision, DedupIndex, merge_records};
use crate::error::StoreError;
use crate::identifiers::normalize_doi;
use crate::model::{ArtifactSource, DiscoveryMethod, Record, RetrievalStatus};

/// Result of [`Registry::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(String),
    Merged(String),
    /// Near-miss dedup: nothing written, surfaced for manual review.
    Ambiguous {
        candidate_id: String,
        closest: String,
        ratio: f64,
    },
}

/// Query filter. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// Record must carry at least one of these tags.
    pub tags: Vec<String>,
    pub status: Option<RetrievalStatus>,
    pub discovery_method: Option<DiscoveryMethod>,
    pub needs_manual: Option<bool>,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        if !self.tags.is_empty() && !self.tags.iter().any(|t| record.has_tag(t)) {
            return false;
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(method) = self.discovery_method {
            if record.discovery_method != method {
                return false;
            }
        }
        if let Some(needs) = self.needs_manual {
            if record.needs_manual() != needs {
                return false;
            }
        }
        true
    }
}

/// Artifact changes applied together with a status update. Paths are
/// only ever added — acquired artifacts are never revoked.
#[derive(Debug, Clone, Default)]
pub struct ArtifactUpdate {
    pub pdf_path: Option<String>,
    pub xml_path: Option<String>,
    pub txt_path: Option<String>,
    pub artifact_source: Option<ArtifactSource>,
}

impl ArtifactUpdate {
    pub fn is_empty(&self) -> bool {
        self.pdf_path.is_none()
            && self.xml_path.is_none()
            && self.txt_path.is_none()
            && self.artifact_source.is_none()
    }
}

pub struct Registry {
    path: PathBuf,
    records: Vec<Record>,
    positions: FxHashMap<String, usize>,
    by_pmcid: FxHashMap<String, String>,
    index: DedupIndex,
}

impl Registry {
    /// Open (or start) a registry at `path`. A missing file is an
    /// empty registry; it is created on first write.
    pub fn open(path: &Path, config: DedupConfig) -> Result<Self, StoreError> {
        let mut registry = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            positions: FxHashMap::default(),
            by_pmcid: FxHashMap::default(),
            index: DedupIndex::new(config),
        };
        if path.exists() {
            let reader = BufReader::new(fs::File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: Record = serde_json::from_str(&line)?;
                registry.admit(record);
            }
            log::debug!("registry: {} records loaded", registry.records.len());
        }
        Ok(registry)
    }

    fn admit(&mut self, record: Record) {
        self.index.add(&record);
        if let Some(pmcid) = &record.pmcid {
            self.by_pmcid
                .entry(pmcid.clone())
                .or_insert_with(|| record.record_id.clone());
        }
        self.positions
            .insert(record.record_id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, record_id: &str) -> Option<&Record> {
        self.positions.get(record_id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.positions.contains_key(record_id)
    }

    /// All records, lazily, in insertion order (the order is meaningful
    /// for report stability).
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Filtered view, insertion order preserved.
    pub fn query<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    /// Owned copy for worker threads (reads stay concurrent while the
    /// single writer applies outcomes afterwards).
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Dedup decision for a candidate without writing anything.
    pub fn decide(&self, candidate: &Record) -> DedupDecision {
        self.index.decide(candidate)
    }

    /// Ingest a candidate: create a new record or enrich an existing
    /// one. Safe to call repeatedly with the same candidate — the
    /// second call is a no-op beyond field enrichment.
    pub fn upsert(&mut self, mut candidate: Record) -> Result<UpsertOutcome, StoreError> {
        if let Some(doi) = candidate.doi.as_deref().and_then(normalize_doi) {
            candidate.doi = Some(doi);
        } else {
            candidate.doi = None;
        }
        candidate.validate()?;

        match self.index.decide(&candidate) {
            DedupDecision::NewRecord => {
                self.check_identifier_ownership(&candidate, None)?;
                self.append_line(&candidate)?;
                let id = candidate.record_id.clone();
                self.admit(candidate);
                Ok(UpsertOutcome::Created(id))
            }
            DedupDecision::MergeInto(id) => {
                self.check_identifier_ownership(&candidate, Some(&id))?;
                let pos = *self
                    .positions
                    .get(&id)
                    .ok_or_else(|| StoreError::UnknownRecord(id.clone()))?;
                let merged = merge_records(&self.records[pos], &candidate);
                merged.validate()?;
                if merged != self.records[pos] {
                    self.index.add(&merged);
                    if let Some(pmcid) = &merged.pmcid {
                        self.by_pmcid
                            .entry(pmcid.clone())
                            .or_insert_with(|| merged.record_id.clone());
                    }
                    self.records[pos] = merged;
                    self.rewrite()?;
                }
                Ok(UpsertOutcome::Merged(id))
            }
            DedupDecision::Ambiguous { closest, ratio } => Ok(UpsertOutcome::Ambiguous {
                candidate_id: candidate.record_id.clone(),
                closest,
                ratio,
            }),
        }
    }

    /// Reject-before-write: no identifier of `candidate` may already
    /// belong to a record other than `target`.
    fn check_identifier_ownership(
        &self,
        candidate: &Record,
        target: Option<&str>,
    ) -> Result<(), StoreError> {
        let conflicts = |owner: &String| target != Some(owner.as_str());
        if let Some(pmcid) = &candidate.pmcid {
            if let Some(owner) = self.by_pmcid.get(pmcid) {
                if conflicts(owner) {
                    return Err(StoreError::DuplicateIdentifier {
                        namespace: "pmcid",
                        value: pmcid.clone(),
                        existing: owner.clone(),
                    });
                }
            }
        }
        // DOI and PMID collisions normally resolve to MergeInto via the
        // cascade; a conflict here means the candidate's identifiers
        // span two different existing records.
        if let Some(doi) = candidate.doi.as_deref() {
            if let Some(owner) = self.index.owner_of_doi(doi) {
                let owner = owner.to_string();
                if conflicts(&owner) {
                    return Err(StoreError::DuplicateIdentifier {
                        namespace: "doi",
                        value: doi.to_string(),
                        existing: owner,
                    });
                }
            }
        }
        if let Some(pmid) = &candidate.pmid {
            if let Some(owner) = self.index.owner_of_pmid(pmid) {
                let owner = owner.to_string();
                if conflicts(&owner) {
                    return Err(StoreError::DuplicateIdentifier {
                        namespace: "pmid",
                        value: pmid.clone(),
                        existing: owner,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a status transition, enforcing the state machine. Illegal
    /// transitions are rejected and leave the record unchanged.
    /// A same-status update with no artifact changes is a no-op.
    pub fn update_status(
        &mut self,
        record_id: &str,
        to: RetrievalStatus,
        update: ArtifactUpdate,
    ) -> Result<(), StoreError> {
        let pos = *self
            .positions
            .get(record_id)
            .ok_or_else(|| StoreError::UnknownRecord(record_id.to_string()))?;
        let from = self.records[pos].status;

        if from == to && update.is_empty() {
            return Ok(());
        }
        if from != to && !from.can_transition(to) {
            return Err(StoreError::IllegalTransition {
                record_id: record_id.to_string(),
                from,
                to,
            });
        }

        let mut updated = self.records[pos].clone();
        if let Some(p) = update.pdf_path {
            updated.pdf_path = Some(p);
        }
        if let Some(p) = update.xml_path {
            updated.xml_path = Some(p);
        }
        if let Some(p) = update.txt_path {
            updated.txt_path = Some(p);
        }
        if update.artifact_source.is_some() {
            updated.artifact_source = update.artifact_source;
        }
        updated.status = to;
        updated.validate()?;

        self.records[pos] = updated;
        self.rewrite()
    }

    /// Add a tag to a record (field update, not a transition).
    /// Returns false if the tag was already present.
    pub fn add_tag(&mut self, record_id: &str, tag: &str) -> Result<bool, StoreError> {
        let pos = *self
            .positions
            .get(record_id)
            .ok_or_else(|| StoreError::UnknownRecord(record_id.to_string()))?;
        if self.records[pos].has_tag(tag) {
            return Ok(false);
        }
        self.records[pos].tags.push(tag.to_string());
        self.rewrite()?;
        Ok(true)
    }

    fn append_line(&self, record: &Record) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Full rewrite through tmp-and-rename; untouched records keep
    /// their original line positions.
    fn rewrite(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for record in &self.records {
                let line = serde_json::to_string(record)?;
                writeln!(file, "{line}")?;
            }
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
