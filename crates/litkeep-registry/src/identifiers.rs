//! Identifier and title normalization.
//!
//! Pure functions, deterministic, no I/O — dedup must be reproducible
//! across runs.

use std::sync::LazyLock;

use regex::Regex;

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(10\.\d{4,9}[/_][^\s]+)").expect("invalid DOI regex"));

static FILE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(pdf|xml|txt|html)$").expect("invalid extension regex"));

/// Canonicalize a DOI: strip resolver URL prefixes, trim, lowercase.
///
/// Returns `None` for empty or malformed input — callers treat that as
/// "no identifier", never as an error.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    if doi.is_empty() {
        return None;
    }
    let lower = doi.to_ascii_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
    ] {
        if lower.starts_with(prefix) {
            doi = &doi[prefix.len()..];
            break;
        }
    }
    let doi = doi.trim().to_lowercase();
    if !doi.starts_with("10.") || !doi.contains('/') {
        return None;
    }
    Some(doi)
}

/// Normalize a title for comparison only (never for display):
/// lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turn an identifier (DOI, record id) into a safe filename component.
pub fn sanitize_for_filename(identifier: &str) -> String {
    identifier
        .replace('/', "_")
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\'))
        .collect()
}

/// Try to pull a DOI out of an arbitrary string (typically a filename).
///
/// Handles sanitized DOIs where `/` was replaced by `_`, and strips
/// trailing file extensions and punctuation.
pub fn extract_doi_from_string(s: &str) -> Option<String> {
    let m = DOI_RE.find(s)?;
    let mut doi = FILE_EXT_RE.replace(m.as_str(), "").into_owned();
    doi = doi.trim_end_matches(['.', ',', ';']).to_string();
    if !doi.contains('/') && doi.contains('_') {
        // First underscore is the sanitized prefix/suffix separator
        doi = doi.replacen('_', "/", 1);
    }
    normalize_doi(&doi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_plain() {
        assert_eq!(
            normalize_doi("10.1038/s41586-023-06424-7").as_deref(),
            Some("10.1038/s41586-023-06424-7")
        );
    }

    #[test]
    fn doi_strips_resolver_prefixes() {
        for url in [
            "https://doi.org/10.1038/NATURE.2020.1",
            "http://doi.org/10.1038/nature.2020.1",
            "https://dx.doi.org/10.1038/Nature.2020.1",
            "http://dx.doi.org/10.1038/nature.2020.1",
        ] {
            assert_eq!(normalize_doi(url).as_deref(), Some("10.1038/nature.2020.1"));
        }
    }

    #[test]
    fn doi_case_folds() {
        assert_eq!(
            normalize_doi("  10.1002/ADVS.202000 ").as_deref(),
            Some("10.1002/advs.202000")
        );
    }

    #[test]
    fn doi_malformed_is_none() {
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("   "), None);
        assert_eq!(normalize_doi("not a doi"), None);
        assert_eq!(normalize_doi("11.1234/x"), None);
    }

    #[test]
    fn title_normalization() {
        assert_eq!(
            normalize_title("  The Quick,  Brown Fox: a study!  "),
            "the quick brown fox a study"
        );
        assert_eq!(normalize_title("Foo Bar  study"), "foo bar study");
    }

    #[test]
    fn filename_sanitization() {
        assert_eq!(
            sanitize_for_filename("10.1038/s41586-023-1"),
            "10.1038_s41586-023-1"
        );
        assert_eq!(sanitize_for_filename("a<b>c:d\"e|f?g*h\\i"), "abcdefghi");
    }

    #[test]
    fn extract_doi_from_filename() {
        assert_eq!(
            extract_doi_from_string("10.1038_s41586-023-06424-7.pdf").as_deref(),
            Some("10.1038/s41586-023-06424-7")
        );
        assert_eq!(
            extract_doi_from_string("paper 10.1101/2024.01.01.573355.PDF").as_deref(),
            Some("10.1101/2024.01.01.573355")
        );
        assert_eq!(extract_doi_from_string("some random file.pdf"), None);
    }

    #[test]
    fn extract_doi_strips_trailing_punctuation() {
        assert_eq!(
            extract_doi_from_string("see 10.1000/xyz123;").as_deref(),
            Some("10.1000/xyz123")
        );
    }
}
