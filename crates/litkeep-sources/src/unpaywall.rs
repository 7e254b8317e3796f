//! Unpaywall open-access lookup by DOI.

use anyhow::Context;
use litkeep_core::http::{HttpError, get_with_retry};
use litkeep_core::ratelimit::TokenBucket;
use serde::Deserialize;

use crate::{OaLocation, OaLocator};

const BASE_URL: &str = "https://api.unpaywall.org/v2/";

pub struct UnpaywallClient {
    email: String,
    limiter: TokenBucket,
}

impl UnpaywallClient {
    /// Unpaywall requires a contact email on every request.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            limiter: TokenBucket::new(10.0),
        }
    }
}

impl OaLocator for UnpaywallClient {
    fn best_oa_location(&self, doi: &str) -> anyhow::Result<Option<OaLocation>> {
        if doi.is_empty() || self.email.is_empty() {
            return Ok(None);
        }
        let url = reqwest::Url::parse_with_params(
            &format!("{BASE_URL}{doi}"),
            [("email", self.email.as_str())],
        )
        .context("invalid Unpaywall request URL")?;

        self.limiter.acquire();
        log::debug!("Unpaywall lookup: {doi}");
        let body = match get_with_retry(url.as_str(), &[]) {
            Ok(body) => body,
            // Unknown DOI, not an error
            Err(HttpError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e).context("Unpaywall request failed"),
        };

        let parsed: UnpaywallResponse =
            serde_json::from_str(&body).context("invalid Unpaywall JSON")?;
        let best = parsed.best_oa_location.unwrap_or_default();
        Ok(Some(OaLocation {
            is_oa: parsed.is_oa,
            pdf_url: best.url_for_pdf,
            landing_page_url: best.url_for_landing_page,
            host_type: best.host_type,
            license: best.license,
            version: best.version,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UnpaywallResponse {
    is_oa: bool,
    best_oa_location: Option<BestOaLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BestOaLocation {
    url_for_pdf: Option<String>,
    url_for_landing_page: Option<String>,
    host_type: Option<String>,
    license: Option<String>,
    version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_pdf_parses() {
        let body = r#"{
            "is_oa": true,
            "best_oa_location": {
                "url_for_pdf": "https://example.org/a.pdf",
                "url_for_landing_page": "https://example.org/a",
                "host_type": "repository",
                "license": "cc-by",
                "version": "publishedVersion"
            }
        }"#;
        let parsed: UnpaywallResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.is_oa);
        let best = parsed.best_oa_location.unwrap();
        assert_eq!(best.url_for_pdf.as_deref(), Some("https://example.org/a.pdf"));
        assert_eq!(best.host_type.as_deref(), Some("repository"));
    }

    #[test]
    fn closed_access_response_parses() {
        let parsed: UnpaywallResponse =
            serde_json::from_str(r#"{"is_oa": false, "best_oa_location": null}"#).unwrap();
        assert!(!parsed.is_oa);
        assert!(parsed.best_oa_location.is_none());
    }

    #[test]
    #[ignore = "network test, hits the live Unpaywall API"]
    fn live_lookup() {
        let client = UnpaywallClient::new("test@example.org");
        let result = client
            .best_oa_location("10.1371/journal.pone.0000308")
            .unwrap();
        let location = result.unwrap();
        assert!(location.is_oa);
    }
}
