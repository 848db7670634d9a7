//! CSS selectors for the DOM markers the parser depends on.
//!
//! Grounded in the original implementation's fixture-driven test suite: any
//! rename of these markers on Scholar's side is, by design, a
//! `layout_changed` failure rather than a silent empty-result.

use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect(concat!("BUG: invalid selector ", $css)));
    };
}

selector!(PROFILE_CONTAINER, "#gsc_prf_in");
selector!(PROFILE_IMAGE, "#gsc_prf_pup-img");
selector!(PUBLICATION_ROW, "tr.gsc_a_tr");
selector!(TITLE_ANCHOR, "a.gsc_a_at");
selector!(AUTHOR_VENUE_LINE, "div.gs_gray");
selector!(CITATION_CELL, "td.gsc_a_c");
selector!(CITATION_ANCHOR, "a.gsc_a_ac");
selector!(YEAR_CELL, "td.gsc_a_y");
selector!(YEAR_SPAN, "span.gsc_a_h");
selector!(SHOW_MORE_BUTTON, "#gsc_bpf_more");
selector!(ARTICLES_RANGE, "#gsc_a_nn");

selector!(AUTHOR_CANDIDATE, "div.gsc_1usr");
selector!(AUTHOR_NAME, "a.gs_ai_name");
selector!(AUTHOR_AFFILIATION, "div.gs_ai_aff");
selector!(AUTHOR_EMAIL, "div.gs_ai_eml");
selector!(AUTHOR_CITED_BY, "div.gs_ai_cby");
selector!(AUTHOR_INTEREST, "a.gs_ai_one_int");
selector!(AUTHOR_IMAGE, "img");
selector!(SINGLETON_REDIRECT, "#gs_1usr");

/// Hosts that indicate Scholar bounced the request to a sign-in flow.
pub use crate::utils::constants::SCHOLAR_SIGNIN_HOSTS;

/// Keyword phrases indicating "no results," checked against body text with
/// `<script>` contents excluded so embedded JS strings never trigger a false
/// positive (grounded in the profile-parser script-exclusion regression test).
pub const NO_RESULTS_KEYWORDS: &[&str] = &[
    "didn't match any articles",
    "didn't match any user profiles",
    "didn’t match any articles",
    "didn’t match any user profiles",
];

pub const RATE_LIMIT_BANNERS: &[&str] = &["too many requests", "unusual traffic"];
