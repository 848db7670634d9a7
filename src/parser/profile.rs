//! Profile page parsing (C2).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::error::LayoutInvariantError;
use crate::scholar_source::FetchResult;
use crate::utils::constants::SCHOLAR_SIGNIN_HOSTS;

use super::markers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseState {
    Ok,
    NoResults,
    BlockedOrCaptcha,
    NetworkError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationCandidate {
    pub title: String,
    pub title_url: Option<String>,
    pub cluster_id: Option<String>,
    pub year: Option<i64>,
    pub citation_count: i64,
    pub authors_text: Option<String>,
    pub venue_text: Option<String>,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProfilePage {
    pub state: ParseState,
    pub state_reason: String,
    pub profile_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub publications: Vec<PublicationCandidate>,
    pub marker_counts: HashMap<String, usize>,
    pub warnings: Vec<String>,
    pub has_show_more_button: bool,
    pub articles_range: Option<String>,
}

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static ARTICLES_RANGE_NUMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\D+(\d+)").expect("valid regex"));
static CITATION_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d,]+").expect("valid regex"));
static CITATION_FOR_VIEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"citation_for_view=([^&:]+):([^&]+)").expect("valid regex"));

fn text_without_scripts(body: &str) -> String {
    SCRIPT_BLOCK.replace_all(body, "").to_lowercase()
}

pub(crate) fn classify_network_error(error: &str) -> &'static str {
    let lower = error.to_lowercase();
    if lower.contains("name resolution") || lower.contains("dns") {
        "network_dns_resolution_failed"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "network_timeout"
    } else if lower.contains("tls") || lower.contains("certificate") {
        "network_tls_error"
    } else {
        "network_error"
    }
}

fn is_signin_redirect(final_url: Option<&str>) -> bool {
    let Some(final_url) = final_url else { return false };
    let Ok(parsed) = url::Url::parse(final_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    SCHOLAR_SIGNIN_HOSTS.iter().any(|signin| host == *signin)
}

fn is_rate_limited(status_code: Option<u16>, body_lower: &str) -> bool {
    status_code == Some(429) || markers::RATE_LIMIT_BANNERS.iter().any(|b| body_lower.contains(b))
}

fn no_results_keyword_hit(body_lower: &str) -> bool {
    markers::NO_RESULTS_KEYWORDS
        .iter()
        .any(|kw| body_lower.contains(&kw.to_lowercase()))
}

/// Parse a profile-page `FetchResult`. Returns `Err` only for a fatal layout
/// invariant; every other outcome, including Scholar-side blocking and
/// transport failure, is represented as a successfully-returned page state.
pub fn parse_profile_page(fetch: &FetchResult) -> Result<ParsedProfilePage, LayoutInvariantError> {
    if let Some(error) = &fetch.error {
        if fetch.status_code.is_none() {
            return Ok(ParsedProfilePage {
                state: ParseState::NetworkError,
                state_reason: classify_network_error(error).to_string(),
                profile_name: None,
                profile_image_url: None,
                publications: Vec::new(),
                marker_counts: HashMap::new(),
                warnings: Vec::new(),
                has_show_more_button: false,
                articles_range: None,
            });
        }
    }

    let body_no_scripts = text_without_scripts(&fetch.body);

    if is_rate_limited(fetch.status_code, &body_no_scripts) {
        return Ok(blocked_page("blocked_http_429_rate_limited"));
    }
    if is_signin_redirect(fetch.final_url.as_deref()) {
        return Ok(blocked_page("blocked_accounts_redirect"));
    }

    let document = Html::parse_document(&fetch.body);

    if no_results_keyword_hit(&body_no_scripts) && document.select(&markers::PUBLICATION_ROW).next().is_none() {
        return Ok(ParsedProfilePage {
            state: ParseState::NoResults,
            state_reason: "no_results_keyword_detected".to_string(),
            profile_name: None,
            profile_image_url: None,
            publications: Vec::new(),
            marker_counts: marker_counts(&document),
            warnings: Vec::new(),
            has_show_more_button: false,
            articles_range: None,
        });
    }

    if document.select(&markers::PROFILE_CONTAINER).next().is_none() {
        return Err(LayoutInvariantError::new(
            "layout_markers_missing",
            "required profile container marker #gsc_prf_in not found",
        ));
    }

    let profile_name = document
        .select(&markers::PROFILE_CONTAINER)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let profile_image_url = document
        .select(&markers::PROFILE_IMAGE)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(str::to_string);

    let has_show_more_button = document
        .select(&markers::SHOW_MORE_BUTTON)
        .next()
        .is_some_and(|el| el.value().attr("disabled").is_none());

    let articles_range = document
        .select(&markers::ARTICLES_RANGE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let mut publications = Vec::new();
    for row in document.select(&markers::PUBLICATION_ROW) {
        publications.push(parse_publication_row(&row)?);
    }

    let mut warnings = Vec::new();
    if !has_show_more_button {
        if let Some(range) = &articles_range {
            if let Some(caps) = ARTICLES_RANGE_NUMS.captures(range) {
                let low: i64 = caps[1].parse().unwrap_or(0);
                let high: i64 = caps[2].parse().unwrap_or(0);
                let expected = (high - low + 1).max(0) as usize;
                if expected != publications.len() {
                    warnings.push("possible_partial_page_show_more_present".to_string());
                }
            }
        }
    }

    let (state, state_reason) = if publications.is_empty() {
        (ParseState::Ok, "no_rows_with_known_markers".to_string())
    } else {
        (ParseState::Ok, "publications_extracted".to_string())
    };

    Ok(ParsedProfilePage {
        state,
        state_reason,
        profile_name,
        profile_image_url,
        publications,
        marker_counts: marker_counts(&document),
        warnings,
        has_show_more_button,
        articles_range,
    })
}

fn parse_publication_row(row: &scraper::ElementRef) -> Result<PublicationCandidate, LayoutInvariantError> {
    let title_el = row.select(&markers::TITLE_ANCHOR).next().ok_or_else(|| {
        LayoutInvariantError::new("layout_markers_missing", "publication row missing title anchor")
    })?;
    let title = title_el.text().collect::<String>().trim().to_string();
    let title_url = title_el.value().attr("href").map(str::to_string);
    let cluster_id = title_url.as_deref().and_then(|href| {
        CITATION_FOR_VIEW
            .captures(href)
            .map(|caps| format!("cfv:{}:{}", &caps[1], &caps[2]))
    });

    let mut gray_lines = row.select(&markers::AUTHOR_VENUE_LINE);
    let authors_text = gray_lines
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());
    let venue_text = gray_lines
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let citation_count = match row.select(&markers::CITATION_ANCHOR).next() {
        Some(anchor) => {
            let raw = anchor.text().collect::<String>();
            let digits = CITATION_DIGITS
                .find(&raw)
                .map(|m| m.as_str().replace(',', ""));
            match digits {
                Some(d) if !d.is_empty() => d.parse::<i64>().map_err(|_| {
                    LayoutInvariantError::new(
                        "layout_row_citation_unparseable",
                        format!("unparseable citation count markup: {raw:?}"),
                    )
                })?,
                _ => {
                    return Err(LayoutInvariantError::new(
                        "layout_row_citation_unparseable",
                        format!("unparseable citation count markup: {raw:?}"),
                    ));
                }
            }
        }
        None => 0,
    };

    let year = row
        .select(&markers::YEAR_SPAN)
        .next()
        .map(|el| el.text().collect::<String>())
        .and_then(|text| text.trim().parse::<i64>().ok());

    // Direct [PDF] links in row markup are intentionally ignored; PDF
    // discovery is delegated to the enrichment pipeline (C9).
    let pdf_url = None;

    Ok(PublicationCandidate {
        title,
        title_url,
        cluster_id,
        year,
        citation_count,
        authors_text,
        venue_text,
        pdf_url,
    })
}

fn blocked_page(reason: &str) -> ParsedProfilePage {
    ParsedProfilePage {
        state: ParseState::BlockedOrCaptcha,
        state_reason: reason.to_string(),
        profile_name: None,
        profile_image_url: None,
        publications: Vec::new(),
        marker_counts: HashMap::new(),
        warnings: Vec::new(),
        has_show_more_button: false,
        articles_range: None,
    }
}

fn marker_counts(document: &Html) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    counts.insert("gsc_prf_in".to_string(), document.select(&markers::PROFILE_CONTAINER).count());
    counts.insert("gsc_a_tr".to_string(), document.select(&markers::PUBLICATION_ROW).count());
    counts.insert("gsc_bpf_more".to_string(), document.select(&markers::SHOW_MORE_BUTTON).count());
    counts.insert("gsc_a_nn".to_string(), document.select(&markers::ARTICLES_RANGE).count());
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(body: &str) -> FetchResult {
        FetchResult {
            requested_url: "https://scholar.google.com/citations?user=abcDEF123456".to_string(),
            status_code: Some(200),
            final_url: Some("https://scholar.google.com/citations?user=abcDEF123456".to_string()),
            body: body.to_string(),
            error: None,
        }
    }

    #[test]
    fn extracts_cluster_id_and_handles_missing_optional_metadata() {
        let html = r#"
        <html>
          <div id="gsc_prf_in">Test Author</div>
          <span id="gsc_a_nn">Articles 1-1</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view=abc:def123">A Test Paper</a>
                <div class="gs_gray">A Person</div>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">7</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h"></span></td>
            </tr>
          </tbody></table>
        </html>"#;
        let parsed = parse_profile_page(&fetch(html)).expect("parses");
        assert_eq!(parsed.state, ParseState::Ok);
        assert_eq!(parsed.state_reason, "publications_extracted");
        assert_eq!(parsed.publications.len(), 1);
        let publication = &parsed.publications[0];
        assert_eq!(publication.cluster_id.as_deref(), Some("cfv:abc:def123"));
        assert_eq!(publication.year, None);
        assert_eq!(publication.venue_text, None);
        assert_eq!(publication.citation_count, 7);
    }

    #[test]
    fn parses_comma_formatted_citation_counts() {
        let html = r#"
        <html>
          <div id="gsc_prf_in">Citation Formatting Test</div>
          <span id="gsc_a_nn">Articles 1-1</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view=abc:def123">Paper</a>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">Cited by 1,234</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2024</span></td>
            </tr>
          </tbody></table>
        </html>"#;
        let parsed = parse_profile_page(&fetch(html)).expect("parses");
        assert_eq!(parsed.publications[0].citation_count, 1234);
        assert_eq!(parsed.publications[0].year, Some(2024));
    }

    #[test]
    fn fails_fast_when_citation_markup_unparseable() {
        let html = r#"
        <html>
          <div id="gsc_prf_in">Drift</div>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view=abc:def777">Paper</a>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">Cited by none</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2025</span></td>
            </tr>
          </tbody></table>
        </html>"#;
        let err = parse_profile_page(&fetch(html)).expect_err("should be a layout error");
        assert_eq!(err.code, "layout_row_citation_unparseable");
    }

    #[test]
    fn detects_layout_change_when_markers_absent() {
        let err = parse_profile_page(&fetch("<html><body><h1>Unexpected page</h1></body></html>"))
            .expect_err("should be a layout error");
        assert_eq!(err.code, "layout_markers_missing");
    }

    #[test]
    fn classifies_network_error_without_status() {
        let fetch_result = FetchResult {
            requested_url: "https://scholar.google.com/citations?user=x".to_string(),
            status_code: None,
            final_url: None,
            body: String::new(),
            error: Some("timed out".to_string()),
        };
        let parsed = parse_profile_page(&fetch_result).expect("parses");
        assert_eq!(parsed.state, ParseState::NetworkError);
        assert_eq!(parsed.state_reason, "network_timeout");
    }

    #[test]
    fn ignores_no_results_keyword_inside_script_blocks() {
        let html = r#"
        <html>
          <script>const message = "didn't match any articles";</script>
          <div id="gsc_prf_in">Scripted Author</div>
          <table><tbody id="gsc_a_b"></tbody></table>
        </html>"#;
        let parsed = parse_profile_page(&fetch(html)).expect("parses");
        assert_eq!(parsed.state, ParseState::Ok);
        assert_eq!(parsed.state_reason, "no_rows_with_known_markers");
    }

    #[test]
    fn treats_disabled_show_more_button_as_absent() {
        let html = r#"
        <html>
          <div id="gsc_prf_in">Disabled Show More</div>
          <span id="gsc_a_nn">Articles 1-1</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view=abc:def">Paper</a>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">1</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2024</span></td>
            </tr>
          </tbody></table>
          <button id="gsc_bpf_more" disabled>Show more</button>
        </html>"#;
        let parsed = parse_profile_page(&fetch(html)).expect("parses");
        assert!(!parsed.has_show_more_button);
    }

    #[test]
    fn classifies_accounts_redirect_as_blocked() {
        let fetch_result = FetchResult {
            requested_url: "https://scholar.google.com/citations?user=AAAAAAAAAAAA".to_string(),
            status_code: Some(200),
            final_url: Some("https://accounts.google.com/v3/signin/identifier".to_string()),
            body: "<html><body>Sign in</body></html>".to_string(),
            error: None,
        };
        let parsed = parse_profile_page(&fetch_result).expect("parses");
        assert_eq!(parsed.state, ParseState::BlockedOrCaptcha);
        assert_eq!(parsed.state_reason, "blocked_accounts_redirect");
    }
}
