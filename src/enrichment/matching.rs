//! Title-similarity matching against OpenAlex candidates (C9), grounded in
//! `openalex/matching.py`'s `find_best_match`.
//!
//! The original scores candidates with `rapidfuzz`; no fuzzy-matching crate
//! travels with this stack, so candidates are scored with a token-overlap
//! ratio (Dice coefficient over word-token sets) on the same 0-100 scale.

use std::collections::HashSet;

use crate::enrichment::openalex::OpenAlexWork;
use crate::fingerprint::canonical_title;
use crate::utils::constants::ENRICHMENT_MATCH_MIN_RATIO;

const TIEBREAK_MARGIN: f64 = 5.0;

fn tokens(title: &str) -> HashSet<String> {
    canonical_title(title)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Dice-coefficient similarity between two titles, scaled to 0-100.
#[must_use]
pub fn title_similarity_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 100.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    (2.0 * intersection as f64 / (tokens_a.len() + tokens_b.len()) as f64) * 100.0
}

#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub title: String,
    pub year: Option<i64>,
    pub author_surnames: Vec<String>,
}

fn author_overlap_count(target: &[String], candidate: &[String]) -> usize {
    let candidate_set: HashSet<&String> = candidate.iter().collect();
    target.iter().filter(|s| candidate_set.contains(s)).count()
}

/// Find the best-matching candidate whose title-similarity ratio clears
/// [`MIN_MATCH_RATIO`]. When the top two scores are within
/// [`TIEBREAK_MARGIN`] of each other, prefer the candidate whose year is
/// within ±1 of the target's, then the one with more overlapping authors.
#[must_use]
pub fn find_best_match<'a>(target: &MatchTarget, candidates: &'a [OpenAlexWork]) -> Option<&'a OpenAlexWork> {
    let mut scored: Vec<(f64, &OpenAlexWork)> = candidates
        .iter()
        .filter_map(|work| {
            let title = work.title.as_deref()?;
            let ratio = title_similarity_ratio(&target.title, title);
            (ratio >= ENRICHMENT_MATCH_MIN_RATIO).then_some((ratio, work))
        })
        .collect();

    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let best_score = scored[0].0;
    let mut tied: Vec<&OpenAlexWork> = scored
        .iter()
        .take_while(|(score, _)| best_score - score < TIEBREAK_MARGIN)
        .map(|(_, work)| *work)
        .collect();

    if tied.len() == 1 {
        return Some(tied[0]);
    }

    tied.sort_by(|a, b| {
        let year_rank = |w: &OpenAlexWork| match (target.year, w.publication_year) {
            (Some(t), Some(y)) if (t - y).abs() <= 1 => 0,
            _ => 1,
        };
        let author_rank = |w: &OpenAlexWork| std::cmp::Reverse(author_overlap_count(&target.author_surnames, &w.author_surnames()));
        (year_rank(a), author_rank(a)).cmp(&(year_rank(b), author_rank(b)))
    });
    tied.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::openalex::{OpenAlexAuthor, OpenAlexAuthorship};

    fn work(title: &str, year: Option<i64>, authors: &[&str]) -> OpenAlexWork {
        OpenAlexWork {
            id: "W".to_string(),
            ids: None,
            title: Some(title.to_string()),
            publication_year: year,
            cited_by_count: 0,
            open_access: None,
            authorships: authors
                .iter()
                .map(|name| OpenAlexAuthorship {
                    author: OpenAlexAuthor {
                        id: None,
                        display_name: Some((*name).to_string()),
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn exact_title_scores_one_hundred() {
        assert_eq!(title_similarity_ratio("Deep Learning", "Deep Learning"), 100.0);
    }

    #[test]
    fn unrelated_titles_score_low() {
        assert!(title_similarity_ratio("Deep Learning", "Quantum Cryptography") < 50.0);
    }

    #[test]
    fn no_match_below_threshold() {
        let target = MatchTarget {
            title: "Deep Learning for Widgets".to_string(),
            year: Some(2020),
            author_surnames: vec!["smith".to_string()],
        };
        let candidates = vec![work("Completely Unrelated Title About Birds", Some(2020), &["Smith"])];
        assert!(find_best_match(&target, &candidates).is_none());
    }

    #[test]
    fn tiebreak_prefers_matching_year_and_author() {
        let target = MatchTarget {
            title: "Widgets and Gadgets Research".to_string(),
            year: Some(2020),
            author_surnames: vec!["smith".to_string()],
        };
        let candidates = vec![
            work("Widgets and Gadgets Research", Some(2015), &["Jones"]),
            work("Widgets and Gadgets Research", Some(2021), &["Smith"]),
        ];
        let best = find_best_match(&target, &candidates).unwrap();
        assert_eq!(best.publication_year, Some(2021));
    }
}
