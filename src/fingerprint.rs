//! Fingerprint & Dedup (C3): title canonicalization, SHA-256 fingerprints,
//! and intra-run fuzzy dedup.
//!
//! Grounded in `fingerprints.py`'s noise-stripping pipeline and resolution
//! order; this is the crate's single canonical upsert path (§11 Open
//! Question 1 resolution) — both the run engine and any future import
//! surface go through [`resolve_and_upsert_publication`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use unicode_normalization::UnicodeNormalization;

use crate::db::publications::{self, NewPublicationFields};
use crate::parser::{ParseState, ParsedProfilePage, PublicationCandidate};
use crate::utils::constants::{CANONICAL_DEDUP_THRESHOLD, INITIAL_PAGE_FINGERPRINT_MAX_PUBLICATIONS};

static MOJIBAKE_HINT: LazyLock<Regex> = LazyLock::new(|| Regex::new("[ÃÂâ]").expect("valid regex"));
static MOJIBAKE_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new("[ÃÂâ€œ”€™]").expect("valid regex"));
static SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static TITLE_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]").expect("valid regex"));
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

static NOISE_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[,.\s]+doi\s*:\s*\S+.*$").expect("valid regex"));
static NOISE_ARXIV: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[,.\s]+arxiv\b.*$").expect("valid regex"));
static NOISE_PREPRINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[,\s]+(?:preprint|extended\s+version|technical\s+report|working\s+paper)\b.*$")
        .expect("valid regex")
});
static NOISE_TRAILING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[,(]\s*\d{4}\s*[),]?\s*$").expect("valid regex"));
static NOISE_TRAILING_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[,(]\s*(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{4}\s*[),]?\s*$")
        .expect("valid regex")
});
static NOISE_TRAILING_PUBLICATION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[,.\s]+(?:conference\s+paper|journal\s+article)\s*$").expect("valid regex")
});
static NOISE_IN_PROCEEDINGS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+in:\s+proceedings\b.*$").expect("valid regex"));
static NOISE_VENUE_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w{3}\.\s+[A-Z][a-z].*$").expect("valid regex"));
static NOISE_LEADING_DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\s+\d{1,2}(?:\s*[-\x{2013}]\s*\d{1,2})?\)?[,.\s:;-]+")
        .expect("valid regex")
});
static NOISE_LEADING_AUTHOR_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:and|&)\s+[a-z.\s]{1,40}:\s*").expect("valid regex"));

fn repair_mojibake(value: &str) -> String {
    if !MOJIBAKE_HINT.is_match(value) {
        return value.to_string();
    }
    let latin1_bytes: Option<Vec<u8>> = value.chars().map(|c| u8::try_from(c as u32).ok()).collect();
    let Some(bytes) = latin1_bytes else {
        return value.to_string();
    };
    let Ok(repaired) = String::from_utf8(bytes) else {
        return value.to_string();
    };
    if mojibake_score(&repaired) < mojibake_score(value) {
        repaired
    } else {
        value.to_string()
    }
}

fn mojibake_score(value: &str) -> usize {
    MOJIBAKE_HINT.find_iter(value).count()
}

fn normalized_text(value: &str) -> String {
    let repaired = repair_mojibake(value.trim());
    let nfkc: String = repaired.nfkc().collect();
    let cleaned = MOJIBAKE_CHAR.replace_all(&nfkc, " ");
    SPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Lowercase + strip all non-alphanumerics. Used for equality joins only.
#[must_use]
pub fn normalize_title(value: &str) -> String {
    let lowered = normalized_text(value).to_lowercase();
    TITLE_ALNUM.replace_all(&lowered, "").to_string()
}

fn strip_leading_noise_prefixes(value: &str) -> String {
    let mut stripped = value.to_string();
    loop {
        let mut next = NOISE_LEADING_DATE_PREFIX.replace(&stripped, "").trim().to_string();
        next = NOISE_LEADING_AUTHOR_FRAGMENT.replace(&next, "").trim().to_string();
        if next == stripped {
            return stripped;
        }
        stripped = next;
    }
}

fn strip_noise_suffixes(value: &str) -> String {
    let t = strip_leading_noise_prefixes(value.trim());
    let t = NOISE_DOI.replace(&t, "").to_string();
    let t = NOISE_ARXIV.replace(&t, "").to_string();
    let t = NOISE_PREPRINT.replace(&t, "").to_string();
    let t = NOISE_TRAILING_YEAR.replace(&t, "").to_string();
    let t = NOISE_TRAILING_MONTH_YEAR.replace(&t, "").to_string();
    let t = NOISE_TRAILING_PUBLICATION_TYPE.replace(&t, "").to_string();
    let t = NOISE_IN_PROCEEDINGS_SUFFIX.replace(&t, "").to_string();
    t.trim().to_string()
}

fn canonical_title_text(title: &str) -> String {
    let t = normalized_text(title);
    let t = strip_noise_suffixes(&t);
    NOISE_VENUE_SENTENCE.replace(&t, "").trim().to_string()
}

fn stripped_title_for_canonical(title: &str) -> String {
    canonical_title_text(title).to_lowercase().trim().to_string()
}

/// Strip Scholar-specific noise suffixes/prefixes, then normalize. Used for
/// the near-duplicate hash.
#[must_use]
pub fn canonical_title(title: &str) -> String {
    normalize_title(&canonical_title_text(title))
}

fn canonical_title_tokens(title: &str) -> HashSet<String> {
    WORD.find_iter(&stripped_title_for_canonical(title))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn first_author_last_name(authors_text: Option<&str>) -> String {
    let Some(authors_text) = authors_text else {
        return String::new();
    };
    let first_author = authors_text.split(',').next().unwrap_or("").trim().to_lowercase();
    WORD.find_iter(&first_author)
        .last()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn first_venue_word(venue_text: Option<&str>) -> String {
    let Some(venue_text) = venue_text else {
        return String::new();
    };
    WORD.find_iter(&venue_text.to_lowercase())
        .next()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of `"{normalize_title}|{year}|{first_author_lastname}|{first_venue_word}"`.
/// Globally unique per publication.
#[must_use]
pub fn publication_fingerprint(candidate: &PublicationCandidate) -> String {
    let canonical = format!(
        "{}|{}|{}|{}",
        normalize_title(&candidate.title),
        candidate.year.map(|y| y.to_string()).unwrap_or_default(),
        first_author_last_name(candidate.authors_text.as_deref()),
        first_venue_word(candidate.venue_text.as_deref()),
    );
    sha256_hex(&canonical)
}

/// SHA-256 of `normalize_title(canonical_title(title))`.
#[must_use]
pub fn canonical_title_hash(title: &str) -> String {
    sha256_hex(&normalize_title(&canonical_title(title)))
}

/// SHA-256 over a canonical JSON snapshot of a scholar's first page. `None`
/// unless `state ∈ {OK, NO_RESULTS}`.
#[must_use]
pub fn initial_page_fingerprint(page: &ParsedProfilePage) -> Option<String> {
    if !matches!(page.state, ParseState::Ok | ParseState::NoResults) {
        return None;
    }
    let rows: Vec<_> = page
        .publications
        .iter()
        .take(INITIAL_PAGE_FINGERPRINT_MAX_PUBLICATIONS)
        .map(|p| {
            json!({
                "cluster_id": p.cluster_id.clone().unwrap_or_default(),
                "title_normalized": normalize_title(&p.title),
                "year": p.year,
                "citation_count": p.citation_count,
            })
        })
        .collect();

    let payload = json!({
        "state": format!("{:?}", page.state),
        "articles_range": page.articles_range.clone().unwrap_or_default(),
        "has_show_more_button": page.has_show_more_button,
        "profile_name": page.profile_name.clone().unwrap_or_default(),
        "publications": rows,
    });
    Some(sha256_hex(&payload.to_string()))
}

/// Looser helper for ad hoc title comparisons outside the intra-run dedup
/// path (e.g. enrichment match tie-breaking). Does not seed or mutate dedup
/// state; takes its own threshold, distinct from the fixed intra-run constant.
#[must_use]
pub fn fuzzy_titles_match(title_a: &str, title_b: &str, threshold: f64) -> bool {
    let tokens_a: HashSet<String> = WORD.find_iter(&title_a.to_lowercase()).map(|m| m.as_str().to_string()).collect();
    let tokens_b: HashSet<String> = WORD.find_iter(&title_b.to_lowercase()).map(|m| m.as_str().to_string()).collect();
    jaccard(&tokens_a, &tokens_b) >= threshold
}

/// Mutable cross-page dedup state for one scholar's run, seeded from
/// previously-accepted canonical titles.
#[derive(Debug, Default, Clone)]
pub struct DedupState {
    seen_exact: HashSet<String>,
    seen_tokens: Vec<HashSet<String>>,
}

impl DedupState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn identity(candidate: &PublicationCandidate) -> String {
        if let Some(cluster_id) = &candidate.cluster_id {
            return format!("cluster:{cluster_id}");
        }
        format!(
            "fallback|{}|{}|{}",
            canonical_title(&candidate.title),
            candidate.year.map(|y| y.to_string()).unwrap_or_default(),
            first_author_last_name(candidate.authors_text.as_deref()),
        )
    }

    /// Filter candidates against exact identity and 0.82-threshold fuzzy
    /// token-overlap dedup, carried across pages within one scholar's run.
    pub fn dedupe(&mut self, candidates: Vec<PublicationCandidate>) -> Vec<PublicationCandidate> {
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let identity = Self::identity(&candidate);
            if self.seen_exact.contains(&identity) {
                continue;
            }
            let tokens = canonical_title_tokens(&candidate.title);
            if self
                .seen_tokens
                .iter()
                .any(|existing| jaccard(&tokens, existing) >= CANONICAL_DEDUP_THRESHOLD)
            {
                continue;
            }
            self.seen_exact.insert(identity);
            self.seen_tokens.push(tokens);
            out.push(candidate);
        }
        out
    }
}

/// Resolve a candidate against the shared publication store and upsert it.
/// The single canonical upsert path (§11 Open Question 1): resolution order
/// is cluster_id → fingerprint_sha256 → canonical_title_hash → create new.
pub async fn resolve_and_upsert_publication(
    pool: &SqlitePool,
    candidate: &PublicationCandidate,
) -> Result<(i64, bool), sqlx::Error> {
    let fingerprint = publication_fingerprint(candidate);
    let title_hash = canonical_title_hash(&candidate.title);
    let title_normalized = normalize_title(&candidate.title);

    if let Some(existing) = publications::resolve_existing(
        pool,
        candidate.cluster_id.as_deref(),
        &fingerprint,
        &title_hash,
    )
    .await?
    {
        publications::update_on_match(
            pool,
            existing.id,
            candidate.cluster_id.as_deref(),
            &candidate.title,
            &title_normalized,
            candidate.year,
            candidate.citation_count,
            candidate.authors_text.as_deref(),
            candidate.venue_text.as_deref(),
            candidate.title_url.as_deref(),
        )
        .await?;
        return Ok((existing.id, false));
    }

    let id = publications::insert(
        pool,
        NewPublicationFields {
            cluster_id: candidate.cluster_id.as_deref(),
            fingerprint_sha256: &fingerprint,
            canonical_title_hash: &title_hash,
            title_raw: &candidate.title,
            title_normalized: &title_normalized,
            year: candidate.year,
            citation_count: candidate.citation_count,
            author_text: candidate.authors_text.as_deref(),
            venue_text: candidate.venue_text.as_deref(),
            pub_url: candidate.title_url.as_deref(),
        },
    )
    .await?;
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str) -> PublicationCandidate {
        PublicationCandidate {
            title: title.to_string(),
            title_url: None,
            cluster_id: None,
            year: Some(2020),
            citation_count: 5,
            authors_text: Some("Smith, J.".to_string()),
            venue_text: Some("Journal of Testing".to_string()),
            pdf_url: None,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let c = candidate("A Paper About Things");
        assert_eq!(publication_fingerprint(&c), publication_fingerprint(&c));
    }

    #[test]
    fn normalize_title_strips_non_alphanumerics() {
        assert_eq!(normalize_title("Hello, World!"), "helloworld");
    }

    #[test]
    fn canonical_title_strips_doi_suffix() {
        let stripped = canonical_title("Deep Learning Survey, doi: 10.1000/xyz123");
        assert!(!stripped.contains("doi"));
    }

    #[test]
    fn canonical_title_strips_trailing_year() {
        let stripped = canonical_title_text("A Great Paper (2021)");
        assert!(!stripped.contains("2021"));
    }

    #[test]
    fn fuzzy_titles_match_respects_threshold() {
        assert!(fuzzy_titles_match(
            "Deep Learning for Vision",
            "Deep Learning for Vision Tasks",
            0.5,
        ));
        assert!(!fuzzy_titles_match("Apples", "Oranges", 0.85));
    }

    #[test]
    fn dedup_state_drops_fuzzy_duplicate_across_pages() {
        let mut state = DedupState::new();
        let first = state.dedupe(vec![candidate("A Very Specific Research Title About Widgets")]);
        assert_eq!(first.len(), 1);
        let second = state.dedupe(vec![candidate("A Very Specific Research Title About Widgets Extra")]);
        assert!(second.is_empty(), "near-duplicate title should be dropped");
    }

    #[test]
    fn dedup_state_keeps_distinct_titles() {
        let mut state = DedupState::new();
        let first = state.dedupe(vec![candidate("Completely Different Topic One")]);
        let second = state.dedupe(vec![candidate("Totally Unrelated Subject Two")]);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn initial_page_fingerprint_none_for_blocked_state() {
        let page = ParsedProfilePage {
            state: ParseState::BlockedOrCaptcha,
            state_reason: "blocked_http_429_rate_limited".to_string(),
            profile_name: None,
            profile_image_url: None,
            publications: Vec::new(),
            marker_counts: Default::default(),
            warnings: Vec::new(),
            has_show_more_button: false,
            articles_range: None,
        };
        assert!(initial_page_fingerprint(&page).is_none());
    }
}
