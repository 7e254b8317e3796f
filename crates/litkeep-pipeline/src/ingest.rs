//! Manual PDF ingestion.
//!
//! Matches PDFs dropped into the inbox against records awaiting manual
//! retrieval. The matching cascade tries, in order: the record's
//! canonical suggested filename, a DOI embedded in the filename, the
//! PDF metadata title, and the first page of extracted text. A file
//! that matches nothing confidently is reported with its best score,
//! never guessed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use strsim::normalized_levenshtein;

use litkeep_registry::identifiers::{extract_doi_from_string, normalize_title};
use litkeep_registry::{
    ArtifactSource, ArtifactUpdate, AttemptLog, AttemptOutcome, AttemptRecord, Record, Registry,
    RetrievalStatus, write_manual_list,
};

use crate::config::{ProjectPaths, RetrievalConfig};

/// Metadata-title similarity floor.
const TITLE_THRESHOLD: f64 = 0.85;
/// First-page windowed similarity floor.
const FIRST_PAGE_THRESHOLD: f64 = 0.90;
/// First-page text is capped before windowed matching.
const FIRST_PAGE_SCAN_CHARS: usize = 2000;

/// Two inbox files resolving to the same record in one run.
#[derive(Debug)]
pub enum MatchError {
    DoubleClaim { filename: String, record_id: String },
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DoubleClaim {
                filename,
                record_id,
            } => write!(f, "{filename}: record {record_id} already claimed this run"),
        }
    }
}

impl std::error::Error for MatchError {}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchMethod {
    SuggestedFilename,
    DoiInFilename,
    PdfMetadataTitle { score: f64 },
    FirstPageText { score: f64 },
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuggestedFilename => write!(f, "suggested filename"),
            Self::DoiInFilename => write!(f, "DOI in filename"),
            Self::PdfMetadataTitle { score } => write!(f, "metadata title (score {score:.2})"),
            Self::FirstPageText { score } => write!(f, "first-page text (score {score:.2})"),
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Matched {
        record_id: String,
        method: MatchMethod,
    },
    Unmatched {
        best_score: f64,
    },
    Rejected(MatchError),
}

#[derive(Debug)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub scanned: usize,
    pub ingested: usize,
    pub unmatched: usize,
    pub double_claims: usize,
    pub still_pending: usize,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub dry_run: bool,
}

/// What the cascade sees of one inbox file. Extraction is separated
/// from matching so the cascade stays pure.
struct FileFacts {
    filename: String,
    metadata_title: Option<String>,
    first_page: Option<String>,
}

/// Run the matching cascade for one file against the candidate set.
fn match_file(facts: &FileFacts, candidates: &[&Record]) -> (Option<(String, MatchMethod)>, f64) {
    // 1. Exact canonical filename
    for record in candidates {
        if record.suggested_filename() == facts.filename {
            return (
                Some((record.record_id.clone(), MatchMethod::SuggestedFilename)),
                1.0,
            );
        }
    }

    // 2. DOI embedded in the filename
    if let Some(doi) = extract_doi_from_string(&facts.filename) {
        for record in candidates {
            if record.doi.as_deref() == Some(doi.as_str()) {
                return (
                    Some((record.record_id.clone(), MatchMethod::DoiInFilename)),
                    1.0,
                );
            }
        }
    }

    let mut best_score = 0.0_f64;

    // 3. PDF metadata title, fuzzy
    if let Some(title) = facts.metadata_title.as_deref() {
        let normalized = normalize_title(title);
        let mut best: Option<&Record> = None;
        for record in candidates {
            let score = normalized_levenshtein(&normalized, &normalize_title(&record.title));
            if score > best_score {
                best_score = score;
                best = Some(record);
            }
        }
        if best_score >= TITLE_THRESHOLD {
            if let Some(record) = best {
                return (
                    Some((
                        record.record_id.clone(),
                        MatchMethod::PdfMetadataTitle { score: best_score },
                    )),
                    best_score,
                );
            }
        }
    }

    // 4. First-page text
    if let Some(page) = facts.first_page.as_deref() {
        let text: String = normalize_title(page)
            .chars()
            .take(FIRST_PAGE_SCAN_CHARS)
            .collect();
        let mut best: Option<&Record> = None;
        for record in candidates {
            let title = normalize_title(&record.title);
            if title.is_empty() {
                continue;
            }
            if text.contains(&title) {
                return (
                    Some((
                        record.record_id.clone(),
                        MatchMethod::FirstPageText { score: 1.0 },
                    )),
                    1.0,
                );
            }
            let score = windowed_similarity(&title, &text);
            if score > best_score {
                best_score = score;
                best = Some(record);
            }
        }
        if best_score >= FIRST_PAGE_THRESHOLD {
            if let Some(record) = best {
                return (
                    Some((
                        record.record_id.clone(),
                        MatchMethod::FirstPageText { score: best_score },
                    )),
                    best_score,
                );
            }
        }
    }

    (None, best_score)
}

/// Best similarity of `needle` against same-length windows of
/// `haystack`, a partial-ratio stand-in.
fn windowed_similarity(needle: &str, haystack: &str) -> f64 {
    let needle_chars: Vec<char> = needle.chars().collect();
    let hay_chars: Vec<char> = haystack.chars().collect();
    if needle_chars.is_empty() || hay_chars.len() < needle_chars.len() {
        return normalized_levenshtein(needle, haystack);
    }
    let window = needle_chars.len();
    let step = (window / 4).max(1);
    let mut best = 0.0_f64;
    let mut start = 0;
    while start + window <= hay_chars.len() {
        let slice: String = hay_chars[start..start + window].iter().collect();
        best = best.max(normalized_levenshtein(needle, &slice));
        start += step;
    }
    best
}

/// PDF literal strings are either UTF-16BE with a BOM or (loosely)
/// Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

fn read_pdf_title(path: &Path) -> Option<String> {
    let doc = lopdf::Document::load(path).ok()?;
    let info = doc.trailer.get(b"Info").ok()?;
    let info = match info {
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let title = match info.as_dict().ok()?.get(b"Title").ok()? {
        lopdf::Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => return None,
    };
    let title = title.trim().to_string();
    // Junk like "untitled" or a bare filename is shorter than any
    // real article title worth fuzzy-matching
    (title.len() > 5).then_some(title)
}

fn read_first_page_text(path: &Path) -> Option<String> {
    let doc = lopdf::Document::load(path).ok()?;
    let text = doc.extract_text(&[1]).ok()?;
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Scan the inbox and resolve manually downloaded PDFs into the
/// registry.
pub fn run_ingest(
    registry: &mut Registry,
    attempt_log: &AttemptLog,
    config: &RetrievalConfig,
    paths: &ProjectPaths,
    options: IngestOptions,
) -> Result<IngestSummary> {
    let inbox = paths.project_dir.join(&config.inbox_dir);
    let processed = paths.project_dir.join(&config.processed_dir);
    fs::create_dir_all(&inbox)?;
    if !options.dry_run {
        fs::create_dir_all(&processed)?;
    }

    let pattern = inbox.join("*.pdf");
    let mut pdfs: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .context("invalid inbox glob pattern")?
        .filter_map(|p| p.ok())
        .collect();
    pdfs.sort();

    let mut summary = IngestSummary {
        scanned: pdfs.len(),
        ..Default::default()
    };
    if pdfs.is_empty() {
        log::info!("no PDFs in inbox {}", inbox.display());
        summary.still_pending = registry.records().filter(|r| r.needs_manual()).count();
        return Ok(summary);
    }
    log::info!("scanning inbox: {} PDFs", pdfs.len());

    let candidates: Vec<Record> = registry
        .records()
        .filter(|r| r.needs_manual())
        .cloned()
        .collect();
    let candidate_refs: Vec<&Record> = candidates.iter().collect();
    let mut claimed: FxHashSet<String> = FxHashSet::default();

    for pdf_path in pdfs {
        let filename = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let facts = FileFacts {
            filename: filename.clone(),
            metadata_title: read_pdf_title(&pdf_path),
            first_page: read_first_page_text(&pdf_path),
        };

        let (matched, best_score) = match_file(&facts, &candidate_refs);
        let Some((record_id, method)) = matched else {
            log::info!("  {filename}: unmatched (best score {best_score:.2})");
            summary.unmatched += 1;
            summary.files.push(FileReport {
                filename,
                outcome: FileOutcome::Unmatched { best_score },
            });
            continue;
        };

        if !claimed.insert(record_id.clone()) {
            let err = MatchError::DoubleClaim {
                filename: filename.clone(),
                record_id,
            };
            log::error!("  {err}");
            summary.double_claims += 1;
            summary.files.push(FileReport {
                filename,
                outcome: FileOutcome::Rejected(err),
            });
            continue;
        }

        log::info!("  {filename}: matched {record_id} via {method}");
        if options.dry_run {
            summary.ingested += 1;
            summary.files.push(FileReport {
                filename,
                outcome: FileOutcome::Matched { record_id, method },
            });
            continue;
        }

        ingest_one(
            registry,
            attempt_log,
            paths,
            &processed,
            &pdf_path,
            &record_id,
        )
        .with_context(|| format!("failed to ingest {filename}"))?;
        summary.ingested += 1;
        summary.files.push(FileReport {
            filename,
            outcome: FileOutcome::Matched { record_id, method },
        });
    }

    if !options.dry_run {
        let manual: Vec<&Record> = registry.records().filter(|r| r.needs_manual()).collect();
        summary.still_pending = manual.len();
        write_manual_list(&manual, &paths.manual_list())?;
    } else {
        summary.still_pending = candidates.len().saturating_sub(summary.ingested);
    }

    log::info!(
        "ingest complete: {} ingested, {} unmatched, {} double claims, {} still pending",
        summary.ingested,
        summary.unmatched,
        summary.double_claims,
        summary.still_pending
    );
    Ok(summary)
}

fn ingest_one(
    registry: &mut Registry,
    attempt_log: &AttemptLog,
    paths: &ProjectPaths,
    processed: &Path,
    pdf_path: &Path,
    record_id: &str,
) -> Result<()> {
    let record = registry
        .get(record_id)
        .with_context(|| format!("record {record_id} missing"))?;
    let dest_name = record.suggested_filename();
    let doi = record.doi.clone();

    let pdf_dir = paths.pdf_dir();
    fs::create_dir_all(&pdf_dir)?;
    let dest = pdf_dir.join(&dest_name);
    fs::copy(pdf_path, &dest)?;
    let rel = paths.relative(&dest);

    registry.update_status(
        record_id,
        RetrievalStatus::ManualRetrieved,
        ArtifactUpdate {
            pdf_path: Some(rel.clone()),
            artifact_source: Some(ArtifactSource::Manual),
            ..Default::default()
        },
    )?;

    let mut attempt = AttemptRecord::new(record_id, "pdf", "manual", AttemptOutcome::Success);
    attempt.doi = doi;
    attempt.artifact_path = Some(rel);
    attempt.bytes = fs::metadata(&dest).map(|m| m.len()).ok();
    attempt.content_type = Some("application/pdf".to_string());
    attempt_log.append(&attempt)?;

    let original_name = pdf_path.file_name().unwrap_or_default();
    fs::rename(pdf_path, processed.join(original_name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use litkeep_registry::DedupConfig;
    use tempfile::TempDir;

    fn manual_record(id: &str, title: &str, doi: Option<&str>) -> Record {
        let mut r = Record::new(id, title);
        r.doi = doi.map(String::from);
        r.status = RetrievalStatus::Failed;
        r
    }

    fn facts(filename: &str) -> FileFacts {
        FileFacts {
            filename: filename.to_string(),
            metadata_title: None,
            first_page: None,
        }
    }

    #[test]
    fn cascade_prefers_suggested_filename() {
        let a = manual_record("s2:a", "Alpha study", Some("10.1000/alpha"));
        let b = manual_record("s2:b", "Beta study", Some("10.1000/beta"));
        let candidates = vec![&a, &b];

        let (matched, _) = match_file(&facts("10.1000_alpha.pdf"), &candidates);
        let (id, method) = matched.unwrap();
        assert_eq!(id, "s2:a");
        assert_eq!(method, MatchMethod::SuggestedFilename);
    }

    #[test]
    fn cascade_extracts_doi_from_noisy_filename() {
        let a = manual_record("s2:a", "Alpha study", Some("10.1000/alpha"));
        let candidates = vec![&a];

        let (matched, _) = match_file(&facts("download-10.1000_alpha (3).pdf"), &candidates);
        let (id, method) = matched.unwrap();
        assert_eq!(id, "s2:a");
        assert_eq!(method, MatchMethod::DoiInFilename);
    }

    #[test]
    fn cascade_falls_through_to_metadata_title() {
        let a = manual_record(
            "s2:a",
            "Hierarchical organization of cortical networks",
            None,
        );
        let candidates = vec![&a];
        let f = FileFacts {
            filename: "random-download.pdf".to_string(),
            metadata_title: Some("Hierarchical organization of cortical networks".to_string()),
            first_page: None,
        };
        let (matched, score) = match_file(&f, &candidates);
        let (id, _) = matched.unwrap();
        assert_eq!(id, "s2:a");
        assert!(score >= TITLE_THRESHOLD);
    }

    #[test]
    fn weak_title_match_is_not_claimed() {
        let a = manual_record("s2:a", "Completely different subject matter", None);
        let candidates = vec![&a];
        let f = FileFacts {
            filename: "random.pdf".to_string(),
            metadata_title: Some("Macaque visual cortex connectivity atlas".to_string()),
            first_page: None,
        };
        let (matched, best) = match_file(&f, &candidates);
        assert!(matched.is_none());
        assert!(best < TITLE_THRESHOLD);
    }

    #[test]
    fn first_page_substring_matches_exactly() {
        let a = manual_record("s2:a", "A connectome of the macaque brain", None);
        let candidates = vec![&a];
        let f = FileFacts {
            filename: "scan.pdf".to_string(),
            metadata_title: None,
            first_page: Some(
                "Research Article\nA Connectome of the Macaque Brain\nJ. Doe et al.".to_string(),
            ),
        };
        let (matched, score) = match_file(&f, &candidates);
        assert_eq!(matched.unwrap().0, "s2:a");
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ingest_run_matches_by_filename_and_transitions() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let mut registry = Registry::open(&paths.records(), DedupConfig::default()).unwrap();
        let log = AttemptLog::new(&paths.attempts());
        let config = RetrievalConfig::default();

        registry
            .upsert(manual_record("s2:a", "Alpha study", Some("10.1000/alpha")))
            .unwrap();
        registry
            .update_status("s2:a", RetrievalStatus::Failed, ArtifactUpdate::default())
            .unwrap();

        let inbox = dir.path().join(&config.inbox_dir);
        fs::create_dir_all(&inbox).unwrap();
        fs::write(inbox.join("10.1000_alpha.pdf"), b"%PDF-1.4 fake").unwrap();

        let summary = run_ingest(
            &mut registry,
            &log,
            &config,
            &paths,
            IngestOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.ingested, 1);
        assert_eq!(summary.still_pending, 0);

        let r = registry.get("s2:a").unwrap();
        assert_eq!(r.status, RetrievalStatus::ManualRetrieved);
        assert_eq!(r.artifact_source, Some(ArtifactSource::Manual));
        assert!(paths.pdf_dir().join("10.1000_alpha.pdf").exists());
        // Original moved out of the inbox
        assert!(!inbox.join("10.1000_alpha.pdf").exists());
        assert!(dir
            .path()
            .join(&config.processed_dir)
            .join("10.1000_alpha.pdf")
            .exists());

        let attempts = log.read_all().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].source, "manual");
        assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
    }

    #[test]
    fn second_file_for_same_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let mut registry = Registry::open(&paths.records(), DedupConfig::default()).unwrap();
        let log = AttemptLog::new(&paths.attempts());
        let config = RetrievalConfig::default();

        registry
            .upsert(manual_record("s2:a", "Alpha study", Some("10.1000/alpha")))
            .unwrap();
        registry
            .update_status("s2:a", RetrievalStatus::Failed, ArtifactUpdate::default())
            .unwrap();

        let inbox = dir.path().join(&config.inbox_dir);
        fs::create_dir_all(&inbox).unwrap();
        // Both names resolve to the same record
        fs::write(inbox.join("10.1000_alpha.pdf"), b"%PDF-1.4 a").unwrap();
        fs::write(inbox.join("copy-10.1000_alpha.pdf"), b"%PDF-1.4 b").unwrap();

        let summary = run_ingest(
            &mut registry,
            &log,
            &config,
            &paths,
            IngestOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.ingested, 1);
        assert_eq!(summary.double_claims, 1);
        // The rejected file stays in the inbox for the user to sort out
        assert!(inbox.join("copy-10.1000_alpha.pdf").exists());
    }

    #[test]
    fn dry_run_reports_without_mutation() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let mut registry = Registry::open(&paths.records(), DedupConfig::default()).unwrap();
        let log = AttemptLog::new(&paths.attempts());
        let config = RetrievalConfig::default();

        registry
            .upsert(manual_record("s2:a", "Alpha study", Some("10.1000/alpha")))
            .unwrap();
        registry
            .update_status("s2:a", RetrievalStatus::Failed, ArtifactUpdate::default())
            .unwrap();

        let inbox = dir.path().join(&config.inbox_dir);
        fs::create_dir_all(&inbox).unwrap();
        fs::write(inbox.join("10.1000_alpha.pdf"), b"%PDF-1.4 a").unwrap();

        let summary = run_ingest(
            &mut registry,
            &log,
            &config,
            &paths,
            IngestOptions { dry_run: true },
        )
        .unwrap();

        assert_eq!(summary.ingested, 1);
        assert!(inbox.join("10.1000_alpha.pdf").exists());
        assert_eq!(registry.get("s2:a").unwrap().status, RetrievalStatus::Failed);
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn utf16_metadata_title_decodes() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "A title".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "A title");
        assert_eq!(decode_pdf_string(b"Plain"), "Plain");
    }
}
