//! Full-text retrieval state machine.
//!
//! Each record runs two independent acquisition tracks (PDF and
//! structured text). A track walks its configured source chain in
//! order and stops at the first verified artifact; a PDF success never
//! short-circuits the text track. Every attempt lands in the append-only
//! attempt log, and the final status is a pure function of which
//! artifacts are present afterwards.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use litkeep_core::http::{FetchResponse, Fetcher};
use litkeep_core::progress::ProgressContext;
use litkeep_core::shutdown;
use litkeep_core::work_queue::WorkQueue;
use serde::{Deserialize, Serialize};

use litkeep_registry::identifiers::sanitize_for_filename;
use litkeep_registry::{
    ArtifactSource, ArtifactUpdate, AttemptLog, AttemptOutcome, AttemptRecord, Record, Registry,
    RetrievalStatus, status_for_artifacts, write_manual_list,
};
use litkeep_sources::OaLocator;
use litkeep_sources::pubmed;

use crate::config::{ProjectPaths, RetrievalConfig};

/// PDF track sources. Chain order and membership are configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfSource {
    /// Open-access URL already present on the record.
    SemanticScholar,
    Unpaywall,
    /// Preprints with a 10.1101/ DOI.
    Biorxiv,
    Arxiv,
}

impl PdfSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SemanticScholar => "semantic_scholar",
            Self::Unpaywall => "unpaywall",
            Self::Biorxiv => "biorxiv",
            Self::Arxiv => "arxiv",
        }
    }

    fn artifact_source(self) -> ArtifactSource {
        match self {
            Self::SemanticScholar => ArtifactSource::SemanticScholar,
            Self::Unpaywall => ArtifactSource::Unpaywall,
            Self::Biorxiv => ArtifactSource::Biorxiv,
            Self::Arxiv => ArtifactSource::Arxiv,
        }
    }
}

/// Structured-text track sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    PmcBioc,
}

impl TextSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PmcBioc => "pmc_bioc",
        }
    }
}

/// PMID to PMCID mapping, needed when a record has a PMID but no PMCID.
pub trait PmcidResolver: Send + Sync {
    fn pmid_to_pmcid(&self, pmid: &str) -> Result<Option<String>>;
}

impl PmcidResolver for litkeep_sources::PubMedClient {
    fn pmid_to_pmcid(&self, pmid: &str) -> Result<Option<String>> {
        litkeep_sources::PubMedClient::pmid_to_pmcid(self, pmid)
    }
}

/// Capability handles the state machine works through. Tests substitute
/// canned implementations.
pub struct RetrieveDeps<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub oa_locator: Option<&'a dyn OaLocator>,
    pub pmcid_resolver: Option<&'a dyn PmcidResolver>,
    /// One spinner line per in-flight record when attached to a TTY.
    pub progress: Option<&'a ProgressContext>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Only process records carrying this tag.
    pub tag: Option<String>,
    pub retry_failed: bool,
    pub retry_manual_pending: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetrieveSummary {
    pub processed: usize,
    pub retrieved: usize,
    pub partial: usize,
    pub failed: usize,
    pub paywall_hits: usize,
    pub manual_pending: usize,
}

struct TrackResult {
    path: String,
    source: ArtifactSource,
}

struct RecordOutcome {
    record_id: String,
    pdf: Option<TrackResult>,
    xml: Option<TrackResult>,
    attempts: Vec<AttemptRecord>,
}

/// PDF payloads must carry the magic signature.
fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Structured text must parse as JSON or well-formed XML.
fn is_structured_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if serde_json::from_slice::<serde_json::Value>(bytes).is_ok() {
        return true;
    }
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'<') {
        return false;
    }
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Eof) => return true,
            Ok(_) => buf.clear(),
            Err(_) => return false,
        }
    }
}

fn write_artifact(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<std::path::PathBuf> {
    fs::create_dir_all(dir)?;
    let dest = dir.join(filename);
    fs::write(&dest, bytes)?;
    Ok(dest)
}

fn attempt(
    record: &Record,
    format: &str,
    source: &str,
    url: Option<&str>,
    outcome: AttemptOutcome,
) -> AttemptRecord {
    let mut a = AttemptRecord::new(&record.record_id, format, source, outcome);
    a.doi = record.doi.clone();
    a.url = url.map(String::from);
    a
}

/// Resolve the fetch URL for one PDF source, or `None` when the record
/// lacks the identifier the source needs.
fn resolve_pdf_url(
    source: PdfSource,
    record: &Record,
    deps: &RetrieveDeps<'_>,
) -> Result<Option<String>> {
    match source {
        PdfSource::SemanticScholar => Ok(record.oa_pdf_url.clone()),
        PdfSource::Unpaywall => {
            let (Some(doi), Some(locator)) = (record.doi.as_deref(), deps.oa_locator) else {
                return Ok(None);
            };
            Ok(locator.best_oa_location(doi)?.and_then(|loc| loc.pdf_url))
        }
        PdfSource::Biorxiv => Ok(record
            .doi
            .as_deref()
            .filter(|doi| doi.starts_with("10.1101/"))
            .map(|doi| format!("https://www.biorxiv.org/content/{doi}v1.full.pdf"))),
        PdfSource::Arxiv => Ok(record
            .arxiv_id
            .as_deref()
            .map(|id| format!("https://arxiv.org/pdf/{id}"))),
    }
}

fn classify_pdf(resp: &FetchResponse) -> AttemptOutcome {
    if resp.looks_like_html() {
        AttemptOutcome::Paywall
    } else if is_pdf(&resp.bytes) {
        AttemptOutcome::Success
    } else {
        AttemptOutcome::Failure
    }
}

fn run_pdf_track(
    record: &Record,
    deps: &RetrieveDeps<'_>,
    config: &RetrievalConfig,
    paths: &ProjectPaths,
    attempts: &mut Vec<AttemptRecord>,
) -> Option<TrackResult> {
    for &source in &config.pdf_chain {
        let url = match resolve_pdf_url(source, record, deps) {
            Ok(Some(url)) => url,
            Ok(None) => continue,
            Err(e) => {
                let mut a = attempt(record, "pdf", source.as_str(), None, AttemptOutcome::Failure);
                a.error = Some(format!("URL resolution failed: {e}"));
                attempts.push(a);
                continue;
            }
        };

        match deps.fetcher.fetch(&url) {
            Ok(resp) => {
                let outcome = classify_pdf(&resp);
                let mut a = attempt(record, "pdf", source.as_str(), Some(&url), outcome);
                a.content_type = resp.content_type.clone();
                match outcome {
                    AttemptOutcome::Success => {
                        let filename = record.suggested_filename();
                        match write_artifact(&paths.pdf_dir(), &filename, &resp.bytes) {
                            Ok(dest) => {
                                let rel = paths.relative(&dest);
                                a.artifact_path = Some(rel.clone());
                                a.bytes = Some(resp.bytes.len() as u64);
                                attempts.push(a);
                                return Some(TrackResult {
                                    path: rel,
                                    source: source.artifact_source(),
                                });
                            }
                            Err(e) => {
                                a.outcome = AttemptOutcome::Failure;
                                a.error = Some(format!("write failed: {e}"));
                                attempts.push(a);
                            }
                        }
                    }
                    AttemptOutcome::Paywall => {
                        a.error = Some("HTML response where PDF expected".to_string());
                        attempts.push(a);
                    }
                    AttemptOutcome::Failure => {
                        a.error = Some("payload is not a PDF".to_string());
                        attempts.push(a);
                    }
                }
            }
            Err(e) => {
                let mut a = attempt(record, "pdf", source.as_str(), Some(&url), AttemptOutcome::Failure);
                a.error = Some(e.to_string());
                attempts.push(a);
            }
        }
    }
    None
}

fn run_text_track(
    record: &Record,
    deps: &RetrieveDeps<'_>,
    config: &RetrievalConfig,
    paths: &ProjectPaths,
    attempts: &mut Vec<AttemptRecord>,
) -> Option<TrackResult> {
    for &source in &config.text_chain {
        match source {
            TextSource::PmcBioc => {
                let pmcid = record.pmcid.clone().or_else(|| {
                    let (Some(pmid), Some(resolver)) =
                        (record.pmid.as_deref(), deps.pmcid_resolver)
                    else {
                        return None;
                    };
                    resolver.pmid_to_pmcid(pmid).ok().flatten()
                });
                let Some(pmcid) = pmcid else { continue };

                let url = pubmed::bioc_url(&pmcid);
                match deps.fetcher.fetch(&url) {
                    Ok(resp) => {
                        let mut a = attempt(
                            record,
                            "text",
                            source.as_str(),
                            Some(&url),
                            AttemptOutcome::Failure,
                        );
                        a.content_type = resp.content_type.clone();
                        if resp.looks_like_html() {
                            a.outcome = AttemptOutcome::Paywall;
                            a.error = Some("HTML response where structured text expected".to_string());
                            attempts.push(a);
                        } else if !is_structured_text(&resp.bytes) {
                            a.error = Some("payload is not XML or JSON".to_string());
                            attempts.push(a);
                        } else {
                            let ext = if resp.bytes.trim_ascii_start().starts_with(b"<") {
                                "xml"
                            } else {
                                "json"
                            };
                            let filename = format!("{}.{ext}", sanitize_for_filename(&pmcid));
                            match write_artifact(&paths.xml_dir(), &filename, &resp.bytes) {
                                Ok(dest) => {
                                    let rel = paths.relative(&dest);
                                    a.outcome = AttemptOutcome::Success;
                                    a.artifact_path = Some(rel.clone());
                                    a.bytes = Some(resp.bytes.len() as u64);
                                    attempts.push(a);
                                    return Some(TrackResult {
                                        path: rel,
                                        source: ArtifactSource::PmcBioc,
                                    });
                                }
                                Err(e) => {
                                    a.error = Some(format!("write failed: {e}"));
                                    attempts.push(a);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let mut a = attempt(
                            record,
                            "text",
                            source.as_str(),
                            Some(&url),
                            AttemptOutcome::Failure,
                        );
                        a.error = Some(e.to_string());
                        attempts.push(a);
                    }
                }
            }
        }
    }
    None
}

/// Run both tracks for one record. Only missing artifacts are
/// attempted; acquired artifacts are never re-fetched.
fn process_record(
    record: &Record,
    deps: &RetrieveDeps<'_>,
    config: &RetrievalConfig,
    paths: &ProjectPaths,
) -> RecordOutcome {
    let mut attempts = Vec::new();
    let pdf = if record.has_pdf() {
        None
    } else {
        run_pdf_track(record, deps, config, paths, &mut attempts)
    };
    let xml = if record.has_structured() {
        None
    } else {
        run_text_track(record, deps, config, paths, &mut attempts)
    };
    RecordOutcome {
        record_id: record.record_id.clone(),
        pdf,
        xml,
        attempts,
    }
}

fn should_process(record: &Record, options: &RetrieveOptions) -> bool {
    if let Some(tag) = &options.tag {
        if !record.has_tag(tag) {
            return false;
        }
    }
    match record.status {
        RetrievalStatus::NotAttempted | RetrievalStatus::Partial => true,
        RetrievalStatus::Failed => options.retry_failed,
        RetrievalStatus::ManualPending => options.retry_manual_pending,
        RetrievalStatus::Retrieved | RetrievalStatus::ManualRetrieved => false,
    }
}

/// Run the retrieval state machine over the registry.
pub fn run_retrieve(
    registry: &mut Registry,
    attempt_log: &AttemptLog,
    deps: &RetrieveDeps<'_>,
    config: &RetrievalConfig,
    paths: &ProjectPaths,
    options: &RetrieveOptions,
) -> Result<RetrieveSummary> {
    let queue = WorkQueue::filtered(registry.snapshot(), |r| should_process(r, options));
    let mut summary = RetrieveSummary {
        processed: queue.total(),
        ..Default::default()
    };

    if options.dry_run {
        log::info!("dry run: would process {} records", queue.total());
        while let Some(record) = queue.claim() {
            let tracks = match (record.has_pdf(), record.has_structured()) {
                (false, false) => "pdf+text",
                (false, true) => "pdf",
                (true, false) => "text",
                (true, true) => continue,
            };
            log::info!("  {} [{}] {}", record.record_id, tracks, record.title);
        }
        summary.manual_pending = registry.records().filter(|r| r.needs_manual()).count();
        return Ok(summary);
    }

    log::info!(
        "retrieving full text for {} records with {} workers",
        queue.total(),
        config.concurrency
    );

    let outcomes: Mutex<Vec<RecordOutcome>> = Mutex::new(Vec::new());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.concurrency.max(1))
        .build()
        .context("failed to build retrieval thread pool")?;
    pool.scope(|s| {
        for _ in 0..config.concurrency.max(1) {
            s.spawn(|_| {
                while let Some(record) = queue.claim() {
                    if shutdown::shutdown_requested() {
                        break;
                    }
                    let pb = deps.progress.map(|p| p.task_line(&record.record_id));
                    if let Some(pb) = &pb {
                        pb.set_message(record.title.clone());
                    }
                    let outcome = process_record(record, deps, config, paths);
                    if let Some(pb) = pb {
                        pb.finish_and_clear();
                    }
                    outcomes
                        .lock()
                        .expect("retrieval outcomes poisoned")
                        .push(outcome);
                }
            });
        }
    });

    // Apply outcomes single-threaded: the registry is the one shared
    // mutable structure, workers only produced per-record results.
    let outcomes = outcomes.into_inner().expect("retrieval outcomes poisoned");
    for outcome in &outcomes {
        summary.paywall_hits += outcome
            .attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Paywall)
            .count();
        attempt_log.append_all(&outcome.attempts)?;
        apply_outcome(registry, outcome, &mut summary)?;
    }

    let manual: Vec<&Record> = registry.records().filter(|r| r.needs_manual()).collect();
    summary.manual_pending = manual.len();
    write_manual_list(&manual, &paths.manual_list())?;

    log::info!(
        "retrieval complete: {} retrieved, {} partial, {} failed, {} paywall hits, {} need manual attention",
        summary.retrieved,
        summary.partial,
        summary.failed,
        summary.paywall_hits,
        summary.manual_pending
    );
    Ok(summary)
}

fn apply_outcome(
    registry: &mut Registry,
    outcome: &RecordOutcome,
    summary: &mut RetrieveSummary,
) -> Result<()> {
    let current = registry
        .get(&outcome.record_id)
        .map(|r| (r.status, r.has_pdf(), r.has_structured()));
    let Some((status, had_pdf, had_xml)) = current else {
        log::warn!("{}: vanished from registry during run", outcome.record_id);
        return Ok(());
    };

    let has_pdf = had_pdf || outcome.pdf.is_some();
    let has_xml = had_xml || outcome.xml.is_some();
    let mut target = status_for_artifacts(has_pdf, has_xml);

    if status != target && !status.can_transition(target) {
        // A manual-pending record re-attempted at the user's request:
        // an automated success still resolves it, a failure leaves it
        // flagged for the human.
        if status == RetrievalStatus::ManualPending && (has_pdf || has_xml) {
            target = RetrievalStatus::ManualRetrieved;
        } else {
            log::debug!(
                "{}: keeping status {status} (no legal edge to {target})",
                outcome.record_id
            );
            return Ok(());
        }
    }

    let update = ArtifactUpdate {
        pdf_path: outcome.pdf.as_ref().map(|t| t.path.clone()),
        xml_path: outcome.xml.as_ref().map(|t| t.path.clone()),
        txt_path: None,
        artifact_source: outcome
            .pdf
            .as_ref()
            .or(outcome.xml.as_ref())
            .map(|t| t.source),
    };
    if status == target && update.is_empty() {
        if target == RetrievalStatus::Failed {
            summary.failed += 1;
        }
        return Ok(());
    }
    registry.update_status(&outcome.record_id, target, update)?;

    match target {
        RetrievalStatus::Retrieved | RetrievalStatus::ManualRetrieved => summary.retrieved += 1,
        RetrievalStatus::Partial => summary.partial += 1,
        RetrievalStatus::Failed => summary.failed += 1,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use litkeep_core::http::HttpError;
    use litkeep_registry::DedupConfig;
    use litkeep_sources::OaLocation;
    use rustc_hash::FxHashMap;
    use tempfile::TempDir;

    struct MockFetcher {
        responses: FxHashMap<String, FetchResponse>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                responses: FxHashMap::default(),
            }
        }

        fn with(mut self, url: &str, content_type: &str, body: &[u8]) -> Self {
            self.responses.insert(
                url.to_string(),
                FetchResponse {
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    bytes: body.to_vec(),
                },
            );
            self
        }
    }

    impl Fetcher for MockFetcher {
        fn fetch(&self, url: &str) -> Result<FetchResponse, HttpError> {
            self.responses.get(url).cloned().ok_or(HttpError::Status {
                status: 404,
                message: "not found".to_string(),
            })
        }
    }

    struct MockLocator {
        pdf_url: Option<String>,
    }

    impl OaLocator for MockLocator {
        fn best_oa_location(&self, _doi: &str) -> anyhow::Result<Option<OaLocation>> {
            Ok(Some(OaLocation {
                is_oa: self.pdf_url.is_some(),
                pdf_url: self.pdf_url.clone(),
                landing_page_url: None,
                host_type: None,
                license: None,
                version: None,
            }))
        }
    }

    fn setup(dir: &TempDir) -> (Registry, AttemptLog, ProjectPaths) {
        let paths = ProjectPaths::new(dir.path());
        let registry = Registry::open(&paths.records(), DedupConfig::default()).unwrap();
        let log = AttemptLog::new(&paths.attempts());
        (registry, log, paths)
    }

    fn record_with_urls(id: &str, oa_url: Option<&str>, pmcid: Option<&str>) -> Record {
        let mut r = Record::new(id, format!("Title for {id}"));
        r.doi = Some(format!("10.1000/{}", id.replace(':', "-")));
        r.oa_pdf_url = oa_url.map(String::from);
        r.pmcid = pmcid.map(String::from);
        r
    }

    fn single_thread_config() -> RetrievalConfig {
        RetrievalConfig {
            concurrency: 1,
            ..Default::default()
        }
    }

    #[test]
    fn paywall_then_pdf_success_text_failure_gives_partial() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        let record = record_with_urls("s2:a", Some("https://oa.example/a"), Some("PMC1"));
        registry.upsert(record).unwrap();

        // First PDF source answers HTML, second serves a real PDF;
        // the text chain carries a retry entry and 404s both times.
        let config = RetrievalConfig {
            concurrency: 1,
            text_chain: vec![TextSource::PmcBioc, TextSource::PmcBioc],
            ..Default::default()
        };
        let fetcher = MockFetcher::new()
            .with("https://oa.example/a", "text/html", b"<html>login</html>")
            .with("https://uw.example/a.pdf", "application/pdf", b"%PDF-1.5 body");
        let locator = MockLocator {
            pdf_url: Some("https://uw.example/a.pdf".to_string()),
        };
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: Some(&locator),
            pmcid_resolver: None,
            progress: None,
        };

        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &config,
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.partial, 1);
        assert_eq!(summary.paywall_hits, 1);

        let r = registry.get("s2:a").unwrap();
        assert_eq!(r.status, RetrievalStatus::Partial);
        assert!(r.pdf_path.is_some());
        assert!(r.xml_path.is_none());
        assert_eq!(r.artifact_source, Some(ArtifactSource::Unpaywall));

        let attempts = log.read_all().unwrap();
        let pdf: Vec<_> = attempts.iter().filter(|a| a.format == "pdf").collect();
        let text: Vec<_> = attempts.iter().filter(|a| a.format == "text").collect();
        assert_eq!(pdf.len(), 2);
        assert_eq!(pdf[0].outcome, AttemptOutcome::Paywall);
        assert_eq!(pdf[1].outcome, AttemptOutcome::Success);
        assert_eq!(text.len(), 2);
        assert!(text.iter().all(|a| a.outcome == AttemptOutcome::Failure));
    }

    #[test]
    fn paywall_never_yields_artifact() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), None))
            .unwrap();

        let fetcher = MockFetcher::new().with(
            "https://oa.example/a",
            "text/html",
            b"<!DOCTYPE html><html>paywall</html>",
        );
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };

        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        let r = registry.get("s2:a").unwrap();
        assert_eq!(r.status, RetrievalStatus::Failed);
        assert!(r.pdf_path.is_none());
        assert!(log
            .read_all()
            .unwrap()
            .iter()
            .all(|a| a.artifact_path.is_none()));
    }

    #[test]
    fn invalid_pdf_payload_is_failure_not_paywall() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), None))
            .unwrap();

        let fetcher =
            MockFetcher::new().with("https://oa.example/a", "application/pdf", b"garbage bytes");
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };
        run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        let attempts = log.read_all().unwrap();
        assert_eq!(attempts[0].outcome, AttemptOutcome::Failure);
        assert!(registry.get("s2:a").unwrap().pdf_path.is_none());
    }

    #[test]
    fn full_success_is_retrieved() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), Some("PMC9")))
            .unwrap();

        let fetcher = MockFetcher::new()
            .with("https://oa.example/a", "application/pdf", b"%PDF-1.7 x")
            .with(&pubmed::bioc_url("PMC9"), "application/json", br#"{"documents": []}"#);
        // Workers drive a task line per record; hidden off-TTY
        let progress = ProgressContext::new();
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: Some(&progress),
        };
        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.retrieved, 1);
        let r = registry.get("s2:a").unwrap();
        assert_eq!(r.status, RetrievalStatus::Retrieved);
        assert!(r.pdf_path.is_some());
        assert!(r.xml_path.is_some());
        // PDF chain hit first, so the recorded source is the PDF's
        assert_eq!(r.artifact_source, Some(ArtifactSource::SemanticScholar));
    }

    #[test]
    fn rerun_only_attempts_missing_track() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), Some("PMC9")))
            .unwrap();
        registry
            .update_status(
                "s2:a",
                RetrievalStatus::Partial,
                ArtifactUpdate {
                    pdf_path: Some("fulltext/pdf/a.pdf".to_string()),
                    artifact_source: Some(ArtifactSource::SemanticScholar),
                    ..Default::default()
                },
            )
            .unwrap();

        let fetcher = MockFetcher::new().with(
            &pubmed::bioc_url("PMC9"),
            "application/json",
            br#"{"documents": []}"#,
        );
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };
        run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        let attempts = log.read_all().unwrap();
        // No PDF attempt: that artifact already exists
        assert!(attempts.iter().all(|a| a.format == "text"));
        let r = registry.get("s2:a").unwrap();
        assert_eq!(r.status, RetrievalStatus::Retrieved);
        assert_eq!(r.pdf_path.as_deref(), Some("fulltext/pdf/a.pdf"));
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), None))
            .unwrap();

        let fetcher = MockFetcher::new();
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };
        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert!(log.read_all().unwrap().is_empty());
        assert_eq!(
            registry.get("s2:a").unwrap().status,
            RetrievalStatus::NotAttempted
        );
    }

    #[test]
    fn failed_records_skipped_without_retry_flag() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", Some("https://oa.example/a"), None))
            .unwrap();
        registry
            .update_status("s2:a", RetrievalStatus::Failed, ArtifactUpdate::default())
            .unwrap();

        let fetcher =
            MockFetcher::new().with("https://oa.example/a", "application/pdf", b"%PDF-1.5 x");
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };

        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(registry.get("s2:a").unwrap().status, RetrievalStatus::Failed);

        // With the flag the retry succeeds
        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions {
                retry_failed: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(summary.partial, 1);
        assert_eq!(registry.get("s2:a").unwrap().status, RetrievalStatus::Partial);
    }

    #[test]
    fn manual_list_regenerated_after_run() {
        let dir = TempDir::new().unwrap();
        let (mut registry, log, paths) = setup(&dir);
        registry
            .upsert(record_with_urls("s2:a", None, None))
            .unwrap();

        let fetcher = MockFetcher::new();
        let deps = RetrieveDeps {
            fetcher: &fetcher,
            oa_locator: None,
            pmcid_resolver: None,
            progress: None,
        };
        let summary = run_retrieve(
            &mut registry,
            &log,
            &deps,
            &single_thread_config(),
            &paths,
            &RetrieveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.manual_pending, 1);
        let doc = std::fs::read_to_string(paths.manual_list()).unwrap();
        assert!(doc.contains("Title for s2:a"));
    }

    #[test]
    fn structured_text_verification() {
        assert!(is_structured_text(br#"{"a": 1}"#));
        assert!(is_structured_text(b"<doc><p>hi</p></doc>"));
        assert!(!is_structured_text(b"plain prose, no markup"));
        assert!(!is_structured_text(b"<doc><unclosed></doc>"));
        assert!(!is_structured_text(b""));
    }

    #[test]
    fn pdf_magic_verification() {
        assert!(is_pdf(b"%PDF-1.4 rest"));
        assert!(!is_pdf(b"<html>"));
        assert!(!is_pdf(b""));
    }
}
