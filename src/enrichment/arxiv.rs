//! arXiv identifier-discovery fallback (C9), grounded in
//! `arxiv/gateway.py` + `arxiv/parser.py` + `arxiv/client.py`.
//!
//! The Atom feed is parsed with plain regexes rather than a full XML parser:
//! the only fields this gateway needs are each entry's id and title, and no
//! XML crate travels with this stack.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use unicode_normalization::UnicodeNormalization;

use crate::error::ArxivError;
use crate::scholar_source::scholarly_api_user_agent;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

static MOJIBAKE_HINT: LazyLock<Regex> = LazyLock::new(|| Regex::new("[ÃÂâ]").expect("valid regex"));
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static ENTRY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<entry>(.*?)</entry>").expect("valid regex"));
static TAG_TEXT: LazyLock<Regex> = LazyLock::new(|| build_tag_regex());
static ARXIV_ABS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"arxiv\.org/abs/([a-zA-Z0-9./-]+?)(?:v\d+)?$").expect("valid regex"));

fn build_tag_regex() -> Regex {
    Regex::new(r"(?is)<(id|title)>(.*?)</\1>").expect("valid regex")
}

#[derive(Debug, Clone, Default)]
pub struct ArxivEntry {
    pub entry_id_url: String,
    pub arxiv_id: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArxivFeed {
    pub entries: Vec<ArxivEntry>,
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Strip the `http://arxiv.org/abs/` prefix and any version suffix.
#[must_use]
pub fn normalize_arxiv_id(entry_id_url: &str) -> Option<String> {
    ARXIV_ABS_ID
        .captures(entry_id_url.trim())
        .map(|caps| caps[1].to_string())
}

pub fn parse_arxiv_feed(payload: &str) -> Result<ArxivFeed, ArxivError> {
    let mut entries = Vec::new();
    for block in ENTRY_BLOCK.captures_iter(payload) {
        let body = &block[1];
        let mut entry_id_url = None;
        let mut title = None;
        for tag in TAG_TEXT.captures_iter(body) {
            let text = decode_entities(tag[2].trim());
            match &tag[1].to_lowercase()[..] {
                "id" if entry_id_url.is_none() => entry_id_url = Some(text),
                "title" if title.is_none() => title = Some(text),
                _ => {}
            }
        }
        let Some(entry_id_url) = entry_id_url else {
            return Err(ArxivError::Parse("entry missing <id>".to_string()));
        };
        let Some(title) = title else {
            return Err(ArxivError::Parse("entry missing <title>".to_string()));
        };
        entries.push(ArxivEntry {
            arxiv_id: normalize_arxiv_id(&entry_id_url),
            entry_id_url,
            title,
        });
    }
    Ok(ArxivFeed { entries })
}

fn repair_mojibake(value: &str) -> String {
    if !MOJIBAKE_HINT.is_match(value) {
        return value.to_string();
    }
    let latin1: Option<Vec<u8>> = value.chars().map(|c| u8::try_from(c as u32).ok()).collect();
    match latin1.and_then(|bytes| String::from_utf8(bytes).ok()) {
        Some(repaired) if MOJIBAKE_HINT.find_iter(&repaired).count() < MOJIBAKE_HINT.find_iter(value).count() => {
            repaired
        }
        _ => value.to_string(),
    }
}

fn normalize_query_title(value: &str) -> String {
    let repaired = repair_mojibake(value.trim());
    let nfkc: String = repaired.nfkc().collect();
    let stripped = MOJIBAKE_HINT.replace_all(&nfkc, " ");
    let stripped = NON_ALNUM.replace_all(&stripped, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Build an arXiv search query from a title and optional author surname.
#[must_use]
pub fn build_arxiv_query(title: &str, author_surname: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    let clean_title = normalize_query_title(title);
    if !clean_title.is_empty() {
        parts.push(format!("ti:\"{clean_title}\""));
    }
    if let Some(author_surname) = author_surname {
        let clean_author = normalize_query_title(author_surname);
        if !clean_author.is_empty() {
            parts.push(format!("au:\"{clean_author}\""));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Minimal arXiv search client. Rate-limiting is the caller's responsibility
/// (via [`crate::cache::RemoteServiceGate`]) — this issues exactly one request.
pub struct ArxivClient {
    client: Client,
    mailto: String,
}

impl ArxivClient {
    #[must_use]
    pub fn new(timeout: Duration, mailto: String) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, mailto }
    }

    pub async fn search(&self, query: &str, max_results: u32) -> Result<ArxivFeed, ArxivError> {
        let user_agent = scholarly_api_user_agent(&self.mailto);
        let response = self
            .client
            .get(ARXIV_API_URL)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", &max_results.to_string()),
            ])
            .header("User-Agent", user_agent)
            .send()
            .await
            .map_err(|e| ArxivError::Request(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(ArxivError::RateLimited);
        }
        let body = response.text().await.map_err(|e| ArxivError::Request(e.to_string()))?;
        parse_arxiv_feed(&body)
    }
}

/// Surname token from a scholar's display label, lowercased.
#[must_use]
pub fn author_surname(scholar_label: Option<&str>) -> Option<String> {
    scholar_label
        .and_then(|label| label.split_whitespace().last())
        .map(str::to_lowercase)
}

/// First entry's arXiv id, if any.
#[must_use]
pub fn first_discovered_id(feed: &ArxivFeed) -> Option<String> {
    feed.entries.iter().find_map(|entry| entry.arxiv_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"
    <feed xmlns="http://www.w3.org/2005/Atom">
      <entry>
        <id>http://arxiv.org/abs/2301.12345v2</id>
        <title>Deep Learning for Widgets</title>
      </entry>
      <entry>
        <id>http://arxiv.org/abs/1999.00001</id>
        <title>Older Work</title>
      </entry>
    </feed>"#;

    #[test]
    fn parses_entries_and_normalizes_ids() {
        let feed = parse_arxiv_feed(SAMPLE_FEED).expect("parses");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].arxiv_id.as_deref(), Some("2301.12345"));
        assert_eq!(feed.entries[1].arxiv_id.as_deref(), Some("1999.00001"));
    }

    #[test]
    fn first_discovered_id_returns_first_entry() {
        let feed = parse_arxiv_feed(SAMPLE_FEED).expect("parses");
        assert_eq!(first_discovered_id(&feed), Some("2301.12345".to_string()));
    }

    #[test]
    fn build_query_combines_title_and_author() {
        let query = build_arxiv_query("Deep Learning: A Survey!", Some("Smith")).unwrap();
        assert_eq!(query, "ti:\"Deep Learning A Survey\" AND au:\"smith\"");
    }

    #[test]
    fn build_query_without_author() {
        let query = build_arxiv_query("A Title", None).unwrap();
        assert_eq!(query, "ti:\"A Title\"");
    }

    #[test]
    fn author_surname_takes_last_token() {
        assert_eq!(author_surname(Some("Ada Lovelace")), Some("lovelace".to_string()));
        assert_eq!(author_surname(None), None);
    }
}
