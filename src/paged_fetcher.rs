//! Paged Fetcher (C4): drives one scholar's pagination through the source and
//! parser, with retries, backoff, cursor advance, and stop conditions.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::error::FetchPageError;
use crate::fingerprint::initial_page_fingerprint;
use crate::parser::{parse_profile_page, ParseState, ParsedProfilePage, PublicationCandidate};
use crate::scholar_source::{FetchKind, FetchResult, ScholarSource};

/// One fetch attempt, kept for debug context on failure.
#[derive(Debug, Clone)]
pub struct PageAttempt {
    pub cstart: u32,
    pub attempt_number: u32,
    pub state: Option<ParseState>,
    pub state_reason: Option<String>,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    MaxPagesReached,
    PaginationCursorStalled,
    PageState(String),
    RunCanceled,
}

impl StopReason {
    #[must_use]
    pub fn as_tag(&self) -> String {
        match self {
            Self::Exhausted => "exhausted".to_string(),
            Self::MaxPagesReached => "max_pages_reached".to_string(),
            Self::PaginationCursorStalled => "pagination_cursor_stalled".to_string(),
            Self::PageState(reason) => format!("page_state_{reason}"),
            Self::RunCanceled => "run_canceled".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PagedParseResult {
    pub attempt_log: Vec<PageAttempt>,
    pub pages_fetched: u32,
    pub publications: Vec<PublicationCandidate>,
    pub continuation_cstart: Option<u32>,
    pub has_more_remaining: bool,
    pub pagination_truncated_reason: Option<String>,
    pub skipped_no_change: bool,
    pub first_page_fingerprint: Option<String>,
    pub first_page_state: Option<ParseState>,
    pub first_page_state_reason: Option<String>,
    pub profile_name: Option<String>,
    pub profile_image_url: Option<String>,
}

pub struct PagingPolicy {
    pub page_size: u32,
    pub max_pages: u32,
    pub network_error_retries: u32,
    pub retry_backoff_seconds: u64,
    pub rate_limit_retries: u32,
    pub rate_limit_backoff_seconds: u64,
    pub request_delay_seconds: u32,
}

fn next_cstart(page: &ParsedProfilePage, current: u32) -> u32 {
    if let Some(range) = &page.articles_range {
        if let Some((_, high)) = parse_articles_range(range) {
            return high;
        }
    }
    current + page.publications.len() as u32
}

fn parse_articles_range(range: &str) -> Option<(u32, u32)> {
    let digits: Vec<u32> = range
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match digits.as_slice() {
        [low, high, ..] => Some((*low, *high)),
        _ => None,
    }
}

async fn fetch_with_retries(
    source: &ScholarSource,
    scholar_id: &str,
    cstart: u32,
    page_size: u32,
    policy: &PagingPolicy,
    attempt_log: &mut Vec<PageAttempt>,
) -> Result<(FetchResult, ParsedProfilePage), FetchPageError> {
    let mut network_attempt = 0u32;
    let mut rate_limit_attempt = 0u32;

    loop {
        let attempt_number = network_attempt + rate_limit_attempt + 1;
        let fetch = source
            .fetch(FetchKind::ProfilePage {
                scholar_id: scholar_id.to_string(),
                cstart,
                pagesize: page_size,
            })
            .await;
        let parsed = parse_profile_page(&fetch)?;

        attempt_log.push(PageAttempt {
            cstart,
            attempt_number,
            state: Some(parsed.state),
            state_reason: Some(parsed.state_reason.clone()),
            status_code: fetch.status_code,
        });

        match parsed.state {
            ParseState::NetworkError if network_attempt < policy.network_error_retries => {
                network_attempt += 1;
                let backoff = policy.retry_backoff_seconds * 2u64.pow(network_attempt.saturating_sub(1));
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }
            ParseState::BlockedOrCaptcha
                if parsed.state_reason == "blocked_http_429_rate_limited"
                    && rate_limit_attempt < policy.rate_limit_retries =>
            {
                rate_limit_attempt += 1;
                let backoff = policy.rate_limit_backoff_seconds * u64::from(rate_limit_attempt);
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }
            _ => return Ok((fetch, parsed)),
        }
    }
}

/// Drive one scholar's pagination starting at `start_cstart`, honoring
/// cooperative cancellation between pages and a previously-seen fingerprint
/// for the zero-change short-circuit.
pub async fn fetch_paged(
    pool: &SqlitePool,
    source: &ScholarSource,
    run_id: i64,
    scholar_id: &str,
    start_cstart: u32,
    previous_fingerprint: Option<&str>,
    policy: &PagingPolicy,
) -> Result<PagedParseResult, FetchPageError> {
    let mut attempt_log = Vec::new();
    let (_, first_page) = fetch_with_retries(
        source,
        scholar_id,
        start_cstart,
        policy.page_size,
        policy,
        &mut attempt_log,
    )
    .await?;

    let first_page_fingerprint = initial_page_fingerprint(&first_page);

    if start_cstart == 0 {
        if let (Some(previous), Some(current)) = (previous_fingerprint, first_page_fingerprint.as_deref()) {
            if previous == current
                && matches!(first_page.state, ParseState::Ok | ParseState::NoResults)
            {
                return Ok(PagedParseResult {
                    attempt_log,
                    pages_fetched: 1,
                    publications: Vec::new(),
                    continuation_cstart: None,
                    has_more_remaining: false,
                    pagination_truncated_reason: None,
                    skipped_no_change: true,
                    first_page_fingerprint,
                    first_page_state: Some(first_page.state),
                    profile_name: first_page.profile_name,
                    profile_image_url: first_page.profile_image_url,
                    first_page_state_reason: Some(first_page.state_reason),
                });
            }
        }
    }

    if !matches!(first_page.state, ParseState::Ok | ParseState::NoResults) {
        let continuation_cstart = matches!(first_page.state, ParseState::NetworkError).then_some(start_cstart);
        return Ok(PagedParseResult {
            attempt_log,
            pages_fetched: 1,
            publications: Vec::new(),
            continuation_cstart,
            has_more_remaining: continuation_cstart.is_some(),
            pagination_truncated_reason: Some(format!("page_state_{}", first_page.state_reason)),
            skipped_no_change: false,
            first_page_fingerprint,
            first_page_state: Some(first_page.state),
            profile_name: first_page.profile_name,
            profile_image_url: first_page.profile_image_url,
            first_page_state_reason: Some(first_page.state_reason.clone()),
        });
    }

    let first_state = first_page.state;
    let first_state_reason = first_page.state_reason.clone();
    let profile_name = first_page.profile_name.clone();
    let profile_image_url = first_page.profile_image_url.clone();
    let mut publications = first_page.publications;
    let mut pages_fetched = 1u32;
    let mut cursor = start_cstart;
    let mut has_show_more = first_page.has_show_more_button;
    let mut stop: Option<StopReason> = None;
    let mut last_page = first_page;

    loop {
        if !has_show_more {
            stop = Some(StopReason::Exhausted);
            break;
        }
        if pages_fetched >= policy.max_pages {
            stop = Some(StopReason::MaxPagesReached);
            break;
        }

        let candidate_cursor = next_cstart(&last_page, cursor);
        if candidate_cursor <= cursor {
            stop = Some(StopReason::PaginationCursorStalled);
            break;
        }

        if crate::db::runs::is_cancel_requested(pool, run_id).await.map_err(|e| {
            FetchPageError::Source(crate::error::ScholarSourceError::Network(e.to_string()))
        })? {
            cursor = candidate_cursor.min(cursor);
            stop = Some(StopReason::RunCanceled);
            break;
        }

        tokio::time::sleep(Duration::from_secs(u64::from(policy.request_delay_seconds))).await;

        let (_, page) = fetch_with_retries(
            source,
            scholar_id,
            candidate_cursor,
            policy.page_size,
            policy,
            &mut attempt_log,
        )
        .await?;

        if !matches!(page.state, ParseState::Ok | ParseState::NoResults) {
            cursor = candidate_cursor;
            stop = Some(StopReason::PageState(page.state_reason.clone()));
            break;
        }

        pages_fetched += 1;
        cursor = candidate_cursor;
        has_show_more = page.has_show_more_button;
        publications.extend(page.publications.clone());
        last_page = page;
    }

    let stop = stop.unwrap_or(StopReason::Exhausted);
    let has_more_remaining = !matches!(stop, StopReason::Exhausted);
    let continuation_cstart = has_more_remaining.then_some(cursor);

    Ok(PagedParseResult {
        attempt_log,
        pages_fetched,
        publications,
        continuation_cstart,
        has_more_remaining,
        pagination_truncated_reason: has_more_remaining.then(|| stop.as_tag()),
        skipped_no_change: false,
        first_page_fingerprint,
        first_page_state: Some(first_state),
        first_page_state_reason: Some(first_state_reason),
        profile_name,
        profile_image_url,
    })
}

/// Freshness check helper exposed for the run engine (§4.5 step 2 wording):
/// true when the run should persist this scholar's new fingerprint.
#[must_use]
pub fn should_persist_fingerprint(result: &PagedParseResult) -> bool {
    !result.skipped_no_change && result.pagination_truncated_reason.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_cstart_parses_articles_range() {
        let page = ParsedProfilePage {
            state: ParseState::Ok,
            state_reason: "publications_extracted".to_string(),
            profile_name: None,
            profile_image_url: None,
            publications: Vec::new(),
            marker_counts: Default::default(),
            warnings: Vec::new(),
            has_show_more_button: true,
            articles_range: Some("Articles 1-20".to_string()),
        };
        assert_eq!(next_cstart(&page, 0), 20);
    }

    #[test]
    fn next_cstart_falls_back_to_publication_count() {
        let page = ParsedProfilePage {
            state: ParseState::Ok,
            state_reason: "publications_extracted".to_string(),
            profile_name: None,
            profile_image_url: None,
            publications: vec![],
            marker_counts: Default::default(),
            warnings: Vec::new(),
            has_show_more_button: true,
            articles_range: None,
        };
        assert_eq!(next_cstart(&page, 20), 20);
    }

    #[test]
    fn stop_reason_tags() {
        assert_eq!(StopReason::MaxPagesReached.as_tag(), "max_pages_reached");
        assert_eq!(
            StopReason::PageState("network_timeout".to_string()).as_tag(),
            "page_state_network_timeout"
        );
    }
}
