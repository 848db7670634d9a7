//! Author-search page parsing (C2).

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::error::LayoutInvariantError;
use crate::scholar_source::FetchResult;

use super::markers;
use super::profile::ParseState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSearchCandidate {
    pub scholar_id: String,
    pub display_name: String,
    pub affiliation: Option<String>,
    pub email_domain: Option<String>,
    pub cited_by_count: Option<i64>,
    pub interests: Vec<String>,
    pub profile_url: String,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAuthorSearchPage {
    pub state: ParseState,
    pub state_reason: String,
    pub candidates: Vec<AuthorSearchCandidate>,
}

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static USER_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]user=([^&]+)").expect("valid regex"));
static CITED_BY_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

fn text_without_scripts(body: &str) -> String {
    SCRIPT_BLOCK.replace_all(body, "").to_lowercase()
}

fn no_results_keyword_hit(body_lower: &str) -> bool {
    markers::NO_RESULTS_KEYWORDS
        .iter()
        .any(|kw| body_lower.contains(&kw.to_lowercase()))
}

pub fn parse_author_search_page(fetch: &FetchResult) -> Result<ParsedAuthorSearchPage, LayoutInvariantError> {
    if let Some(error) = &fetch.error {
        if fetch.status_code.is_none() {
            return Ok(ParsedAuthorSearchPage {
                state: ParseState::NetworkError,
                state_reason: super::profile::classify_network_error(error).to_string(),
                candidates: Vec::new(),
            });
        }
    }

    let body_no_scripts = text_without_scripts(&fetch.body);

    if fetch.status_code == Some(429)
        || markers::RATE_LIMIT_BANNERS.iter().any(|b| body_no_scripts.contains(b))
    {
        return Ok(ParsedAuthorSearchPage {
            state: ParseState::BlockedOrCaptcha,
            state_reason: "blocked_http_429_rate_limited".to_string(),
            candidates: Vec::new(),
        });
    }

    let document = Html::parse_document(&fetch.body);

    if no_results_keyword_hit(&body_no_scripts) && document.select(&markers::AUTHOR_CANDIDATE).next().is_none() {
        return Ok(ParsedAuthorSearchPage {
            state: ParseState::NoResults,
            state_reason: "no_results_keyword_detected".to_string(),
            candidates: Vec::new(),
        });
    }

    let mut candidates = Vec::new();
    for card in document.select(&markers::AUTHOR_CANDIDATE) {
        let Some(name_el) = card.select(&markers::AUTHOR_NAME).next() else {
            continue;
        };
        let display_name = name_el.text().collect::<String>().trim().to_string();
        let href = name_el.value().attr("href").unwrap_or_default();
        let Some(caps) = USER_PARAM.captures(href) else {
            continue;
        };
        let scholar_id = caps[1].to_string();

        let affiliation = card
            .select(&markers::AUTHOR_AFFILIATION)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        let email_domain = card
            .select(&markers::AUTHOR_EMAIL)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|text| text.split("at ").nth(1).map(|s| s.trim().to_string()));

        let cited_by_count = card
            .select(&markers::AUTHOR_CITED_BY)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|text| CITED_BY_DIGITS.find(&text).and_then(|m| m.as_str().parse::<i64>().ok()));

        let interests = card
            .select(&markers::AUTHOR_INTEREST)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let profile_image_url = card
            .select(&markers::AUTHOR_IMAGE)
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(|src| {
                if src.starts_with("http") {
                    src.to_string()
                } else {
                    format!("https://scholar.google.com{src}")
                }
            });

        candidates.push(AuthorSearchCandidate {
            profile_url: format!("https://scholar.google.com/citations?hl=en&user={scholar_id}"),
            scholar_id,
            display_name,
            affiliation,
            email_domain,
            cited_by_count,
            interests,
            profile_image_url,
        });
    }

    Ok(ParsedAuthorSearchPage {
        state: ParseState::Ok,
        state_reason: "author_candidates_extracted".to_string(),
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(body: &str) -> FetchResult {
        FetchResult {
            requested_url: "https://scholar.google.com/citations?view_op=search_authors&mauthors=ada".to_string(),
            status_code: Some(200),
            final_url: Some("https://scholar.google.com/citations?view_op=search_authors&mauthors=ada".to_string()),
            body: body.to_string(),
            error: None,
        }
    }

    #[test]
    fn extracts_candidates_with_image() {
        let html = r#"
        <html><body>
          <div class="gsc_1usr">
            <img src="/citations/images/avatar_scholar_256.png" />
            <a class="gs_ai_name" href="/citations?hl=en&amp;user=abcDEF123456">Ada Lovelace</a>
            <div class="gs_ai_aff">Analytical Engine Lab</div>
            <div class="gs_ai_eml">Verified email at computing.example</div>
            <div class="gs_ai_cby">Cited by 128</div>
            <a class="gs_ai_one_int">Algorithms</a>
            <a class="gs_ai_one_int">Mathematics</a>
          </div>
        </body></html>"#;
        let parsed = parse_author_search_page(&fetch(html)).expect("parses");
        assert_eq!(parsed.state, ParseState::Ok);
        assert_eq!(parsed.candidates.len(), 1);
        let candidate = &parsed.candidates[0];
        assert_eq!(candidate.scholar_id, "abcDEF123456");
        assert_eq!(candidate.display_name, "Ada Lovelace");
        assert_eq!(candidate.affiliation.as_deref(), Some("Analytical Engine Lab"));
        assert_eq!(candidate.email_domain.as_deref(), Some("computing.example"));
        assert_eq!(candidate.cited_by_count, Some(128));
        assert_eq!(candidate.interests, vec!["Algorithms", "Mathematics"]);
    }

    #[test]
    fn detects_no_results_keyword() {
        let parsed = parse_author_search_page(&fetch(
            "<html><body>Your search didn't match any user profiles.</body></html>",
        ))
        .expect("parses");
        assert_eq!(parsed.state, ParseState::NoResults);
        assert_eq!(parsed.state_reason, "no_results_keyword_detected");
        assert!(parsed.candidates.is_empty());
    }

    #[test]
    fn classifies_http_429_as_blocked() {
        let fetch_result = FetchResult {
            requested_url: "https://scholar.google.com/citations?view_op=search_authors&mauthors=ada".to_string(),
            status_code: Some(429),
            final_url: Some("https://scholar.google.com/citations?view_op=search_authors&mauthors=ada".to_string()),
            body: "<html><body>Too many requests</body></html>".to_string(),
            error: None,
        };
        let parsed = parse_author_search_page(&fetch_result).expect("parses");
        assert_eq!(parsed.state, ParseState::BlockedOrCaptcha);
        assert_eq!(parsed.state_reason, "blocked_http_429_rate_limited");
    }
}
