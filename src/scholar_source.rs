//! Scholar Source (C1): a single HTTP fetch of a profile or author-search page.

use rand::seq::IndexedRandom;
use reqwest::Client;
use std::time::Duration;

use crate::error::ScholarSourceError;
use crate::utils::constants::{SCHOLAR_USER_AGENTS, SCHOLARLY_API_USER_AGENT_TEMPLATE};

const SCHOLAR_PROFILE_BASE: &str = "https://scholar.google.com/citations";

#[derive(Debug, Clone)]
pub enum FetchKind {
    ProfilePage {
        scholar_id: String,
        cstart: u32,
        pagesize: u32,
    },
    AuthorSearch { query: String, start: u32 },
}

/// Result of one fetch attempt. Transport failures never escape as an `Err` —
/// they become `error` here so C2/C4 can classify and retry uniformly.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub requested_url: String,
    pub status_code: Option<u16>,
    pub final_url: Option<String>,
    pub body: String,
    pub error: Option<String>,
}

impl FetchResult {
    #[must_use]
    pub fn is_ok_transport(&self) -> bool {
        self.error.is_none() && self.status_code.is_some()
    }
}

/// Stateless Scholar HTTP client. Cheap to clone (wraps a shared `reqwest::Client`).
#[derive(Clone)]
pub struct ScholarSource {
    client: Client,
    base_url: String,
}

impl ScholarSource {
    pub fn new(timeout: Duration) -> Result<Self, ScholarSourceError> {
        Self::with_base_url(timeout, SCHOLAR_PROFILE_BASE)
    }

    /// Same as [`Self::new`] but pointed at a different origin, for tests
    /// that stand up a local server in place of `scholar.google.com`.
    pub fn with_base_url(timeout: Duration, base_url: impl Into<String>) -> Result<Self, ScholarSourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScholarSourceError::Network(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn requested_url(&self, kind: &FetchKind) -> String {
        let base_url = &self.base_url;
        match kind {
            FetchKind::ProfilePage {
                scholar_id,
                cstart,
                pagesize,
            } => format!(
                "{base_url}?user={scholar_id}&cstart={cstart}&pagesize={pagesize}&hl=en"
            ),
            FetchKind::AuthorSearch { query, start } => format!(
                "{base_url}?view_op=search_authors&mauthors={}&start={start}",
                urlencoding::encode(query)
            ),
        }
    }

    fn pick_user_agent() -> &'static str {
        SCHOLAR_USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(SCHOLAR_USER_AGENTS[0])
    }

    /// Perform one fetch. Never returns `Err`: network/transport failures are
    /// folded into `FetchResult.error` so the caller can classify uniformly.
    pub async fn fetch(&self, kind: FetchKind) -> FetchResult {
        let requested_url = self.requested_url(&kind);
        let request = self
            .client
            .get(&requested_url)
            .header("User-Agent", Self::pick_user_agent())
            .header("Accept-Language", "en-US,en;q=0.9");

        match request.send().await {
            Ok(response) => {
                let status_code = Some(response.status().as_u16());
                let final_url = Some(response.url().to_string());
                match response.text().await {
                    Ok(body) => FetchResult {
                        requested_url,
                        status_code,
                        final_url,
                        body,
                        error: None,
                    },
                    Err(e) => FetchResult {
                        requested_url,
                        status_code,
                        final_url,
                        body: String::new(),
                        error: Some(classify_transport_error(&e)),
                    },
                }
            }
            Err(e) => FetchResult {
                requested_url,
                status_code: None,
                final_url: None,
                body: String::new(),
                error: Some(classify_transport_error(&e)),
            },
        }
    }
}

/// Build a contact-mail user agent for external scholarly APIs (arXiv, OpenAlex),
/// per §4.1's "MUST set a contact-mail user-agent for external scholarly APIs".
#[must_use]
pub fn scholarly_api_user_agent(mailto: &str) -> String {
    SCHOLARLY_API_USER_AGENT_TEMPLATE.replace("{mailto}", mailto)
}

fn classify_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "network_timeout".to_string()
    } else if error.is_connect() {
        "network_dns_resolution_failed".to_string()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_url_includes_scholar_id_and_cursor() {
        let source = ScholarSource::new(Duration::from_secs(5)).expect("client builds");
        let url = source.requested_url(&FetchKind::ProfilePage {
            scholar_id: "abc123XYZ_-9".into(),
            cstart: 20,
            pagesize: 20,
        });
        assert!(url.contains("user=abc123XYZ_-9"));
        assert!(url.contains("cstart=20"));
    }

    #[test]
    fn author_search_url_encodes_query() {
        let source = ScholarSource::new(Duration::from_secs(5)).expect("client builds");
        let url = source.requested_url(&FetchKind::AuthorSearch {
            query: "jane doe".into(),
            start: 0,
        });
        assert!(url.contains("mauthors=jane%20doe") || url.contains("mauthors=jane+doe"));
    }

    #[test]
    fn scholarly_user_agent_embeds_mailto() {
        let ua = scholarly_api_user_agent("ops@example.com");
        assert!(ua.contains("ops@example.com"));
    }
}
