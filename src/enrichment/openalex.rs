//! OpenAlex work lookup + title-match scoring (C9), grounded in
//! `openalex/types.py` (response shape) and `openalex/matching.py`
//! (`find_best_match`).

use reqwest::Client;
use serde::Deserialize;

use crate::error::OpenAlexError;
use crate::scholar_source::scholarly_api_user_agent;

const OPENALEX_WORKS_URL: &str = "https://api.openalex.org/works";

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexIds {
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexOpenAccess {
    #[serde(default)]
    pub is_oa: bool,
    pub oa_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexAuthor {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexAuthorship {
    pub author: OpenAlexAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexWork {
    pub id: String,
    #[serde(default)]
    pub ids: Option<OpenAlexIds>,
    pub title: Option<String>,
    pub publication_year: Option<i64>,
    #[serde(default)]
    pub cited_by_count: i64,
    pub open_access: Option<OpenAlexOpenAccess>,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
}

impl OpenAlexWork {
    /// The `https://doi.org/` / `https://pubmed.ncbi.nlm.nih.gov/` prefixes
    /// OpenAlex embeds in its id fields are stripped to bare identifier values.
    #[must_use]
    pub fn doi(&self) -> Option<String> {
        self.ids
            .as_ref()
            .and_then(|ids| ids.doi.as_deref())
            .map(strip_id_prefix)
    }

    #[must_use]
    pub fn pmid(&self) -> Option<String> {
        self.ids
            .as_ref()
            .and_then(|ids| ids.pmid.as_deref())
            .map(strip_id_prefix)
    }

    #[must_use]
    pub fn pmcid(&self) -> Option<String> {
        self.ids
            .as_ref()
            .and_then(|ids| ids.pmcid.as_deref())
            .map(strip_id_prefix)
    }

    #[must_use]
    pub fn open_access_url(&self) -> Option<&str> {
        self.open_access
            .as_ref()
            .filter(|oa| oa.is_oa)
            .and_then(|oa| oa.oa_url.as_deref())
    }

    #[must_use]
    pub fn author_surnames(&self) -> Vec<String> {
        self.authorships
            .iter()
            .filter_map(|a| a.author.display_name.as_deref())
            .filter_map(|name| name.split_whitespace().last())
            .map(str::to_lowercase)
            .collect()
    }
}

fn strip_id_prefix(value: &str) -> String {
    value
        .rsplit('/')
        .next()
        .unwrap_or(value)
        .to_ascii_uppercase()
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

pub struct OpenAlexClient {
    client: Client,
    mailto: Option<String>,
    api_key: Option<String>,
}

impl OpenAlexClient {
    #[must_use]
    pub fn new(timeout: std::time::Duration, mailto: Option<String>, api_key: Option<String>) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            client,
            mailto,
            api_key,
        }
    }

    /// Search works matching a `title.search` filter built from up to a
    /// batch's worth of pipe-joined sanitized titles.
    pub async fn search_by_title(&self, search_terms: &str) -> Result<Vec<OpenAlexWork>, OpenAlexError> {
        let user_agent = scholarly_api_user_agent(self.mailto.as_deref().unwrap_or("anonymous@example.com"));
        let filter = format!("title.search:{search_terms}");
        let mut request = self
            .client
            .get(OPENALEX_WORKS_URL)
            .query(&[("filter", filter.as_str())])
            .header("User-Agent", user_agent);
        if let Some(mailto) = &self.mailto {
            request = request.query(&[("mailto", mailto.as_str())]);
        }
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("api_key", api_key.as_str())]);
        }

        let response = request.send().await.map_err(|e| OpenAlexError::Request(e.to_string()))?;
        match response.status().as_u16() {
            429 => Err(OpenAlexError::RateLimited),
            403 => Err(OpenAlexError::BudgetExhausted),
            _ => {
                let parsed: WorksResponse = response
                    .json()
                    .await
                    .map_err(|e| OpenAlexError::Request(e.to_string()))?;
                Ok(parsed.results)
            }
        }
    }
}

/// Sanitize a title for inclusion in a `title.search` pipe-joined filter:
/// strips non-word characters and collapses whitespace, matching the
/// treatment every title in the batch receives before joining.
#[must_use]
pub fn sanitize_title_for_search(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_strips_url_prefix() {
        let work = OpenAlexWork {
            id: "W1".to_string(),
            ids: Some(OpenAlexIds {
                doi: Some("https://doi.org/10.1234/abc".to_string()),
                pmid: None,
                pmcid: None,
            }),
            title: None,
            publication_year: None,
            cited_by_count: 0,
            open_access: None,
            authorships: vec![],
        };
        assert_eq!(work.doi().as_deref(), Some("10.1234/ABC"));
    }

    #[test]
    fn open_access_url_requires_is_oa() {
        let work = OpenAlexWork {
            id: "W1".to_string(),
            ids: None,
            title: None,
            publication_year: None,
            cited_by_count: 0,
            open_access: Some(OpenAlexOpenAccess {
                is_oa: false,
                oa_url: Some("https://example.com/paper.pdf".to_string()),
            }),
            authorships: vec![],
        };
        assert_eq!(work.open_access_url(), None);
    }

    #[test]
    fn author_surnames_lowercased() {
        let work = OpenAlexWork {
            id: "W1".to_string(),
            ids: None,
            title: None,
            publication_year: None,
            cited_by_count: 0,
            open_access: None,
            authorships: vec![OpenAlexAuthorship {
                author: OpenAlexAuthor {
                    id: None,
                    display_name: Some("Grace Hopper".to_string()),
                },
            }],
        };
        assert_eq!(work.author_surnames(), vec!["hopper".to_string()]);
    }

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize_title_for_search("Deep  Learning: A Survey!"), "Deep Learning A Survey");
    }
}
