//! `Publication` / `ScholarPublication` repository functions (C12), including
//! the resolution lookups C3's fingerprinter upserts through.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{DisplayIdentifier, Publication};

const COLUMNS: &str = "id, cluster_id, fingerprint_sha256, canonical_title_hash, doi, title_raw, \
    title_normalized, year, citation_count, author_text, venue_text, pub_url, pdf_url, \
    openalex_enriched, openalex_last_attempt_at";

/// Resolution order from §4.3: cluster_id, then fingerprint, then canonical hash.
pub async fn resolve_existing(
    pool: &SqlitePool,
    cluster_id: Option<&str>,
    fingerprint_sha256: &str,
    canonical_title_hash: &str,
) -> Result<Option<Publication>, sqlx::Error> {
    if let Some(cluster_id) = cluster_id {
        if let Some(p) = sqlx::query_as::<_, Publication>(&format!(
            "SELECT {COLUMNS} FROM publications WHERE cluster_id = ?"
        ))
        .bind(cluster_id)
        .fetch_optional(pool)
        .await?
        {
            return Ok(Some(p));
        }
    }

    if let Some(p) = sqlx::query_as::<_, Publication>(&format!(
        "SELECT {COLUMNS} FROM publications WHERE fingerprint_sha256 = ?"
    ))
    .bind(fingerprint_sha256)
    .fetch_optional(pool)
    .await?
    {
        return Ok(Some(p));
    }

    sqlx::query_as::<_, Publication>(&format!(
        "SELECT {COLUMNS} FROM publications WHERE canonical_title_hash = ? LIMIT 1"
    ))
    .bind(canonical_title_hash)
    .fetch_optional(pool)
    .await
}

pub struct NewPublicationFields<'a> {
    pub cluster_id: Option<&'a str>,
    pub fingerprint_sha256: &'a str,
    pub canonical_title_hash: &'a str,
    pub title_raw: &'a str,
    pub title_normalized: &'a str,
    pub year: Option<i64>,
    pub citation_count: i64,
    pub author_text: Option<&'a str>,
    pub venue_text: Option<&'a str>,
    pub pub_url: Option<&'a str>,
}

pub async fn insert(pool: &SqlitePool, fields: NewPublicationFields<'_>) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO publications (cluster_id, fingerprint_sha256, canonical_title_hash, \
         title_raw, title_normalized, year, citation_count, author_text, venue_text, pub_url) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(fields.cluster_id)
    .bind(fields.fingerprint_sha256)
    .bind(fields.canonical_title_hash)
    .bind(fields.title_raw)
    .bind(fields.title_normalized)
    .bind(fields.year)
    .bind(fields.citation_count)
    .bind(fields.author_text)
    .bind(fields.venue_text)
    .bind(fields.pub_url)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Update non-null fields on an existing match; `cluster_id` is never
/// downgraded (nil → value only, per §4.3).
#[allow(clippy::too_many_arguments)]
pub async fn update_on_match(
    pool: &SqlitePool,
    publication_id: i64,
    cluster_id: Option<&str>,
    title_raw: &str,
    title_normalized: &str,
    year: Option<i64>,
    citation_count: i64,
    author_text: Option<&str>,
    venue_text: Option<&str>,
    pub_url: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE publications SET \
           cluster_id = COALESCE(cluster_id, ?), \
           title_raw = ?, title_normalized = ?, \
           year = COALESCE(?, year), \
           citation_count = MAX(citation_count, ?), \
           author_text = COALESCE(?, author_text), \
           venue_text = COALESCE(?, venue_text), \
           pub_url = COALESCE(?, pub_url) \
         WHERE id = ?",
    )
    .bind(cluster_id)
    .bind(title_raw)
    .bind(title_normalized)
    .bind(year)
    .bind(citation_count)
    .bind(author_text)
    .bind(venue_text)
    .bind(pub_url)
    .bind(publication_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Attempt to create the scholar↔publication link. Returns `true` if this was
/// a new link (first observation), `false` if it already existed.
pub async fn insert_link_if_new(
    pool: &SqlitePool,
    scholar_profile_id: i64,
    publication_id: i64,
    run_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO scholar_publications \
         (scholar_profile_id, publication_id, first_seen_run_id) VALUES (?, ?, ?)",
    )
    .bind(scholar_profile_id)
    .bind(publication_id)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    FirstSeen,
    Title,
    Year,
    Citations,
    Scholar,
    PdfStatus,
}

impl SortKey {
    fn column(self) -> &'static str {
        match self {
            Self::FirstSeen => "link.created_at",
            Self::Title => "p.title_normalized",
            Self::Year => "p.year",
            Self::Citations => "p.citation_count",
            Self::Scholar => "link.scholar_profile_id",
            Self::PdfStatus => "p.pdf_url IS NULL",
        }
    }
}

/// Stable-under-concurrent-insert listing: when `snapshot_before` is set,
/// only links created at or before that instant are considered.
pub async fn list_for_scholar(
    pool: &SqlitePool,
    scholar_profile_id: i64,
    sort: SortKey,
    snapshot_before: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Publication>, sqlx::Error> {
    let snapshot_clause = if snapshot_before.is_some() {
        "AND link.created_at <= ?"
    } else {
        ""
    };
    let sql = format!(
        "SELECT p.{} FROM publications p \
         JOIN scholar_publications link ON link.publication_id = p.id \
         WHERE link.scholar_profile_id = ? {snapshot_clause} \
         ORDER BY {} LIMIT ? OFFSET ?",
        COLUMNS
            .split(", ")
            .collect::<Vec<_>>()
            .join(", p."),
        sort.column(),
    );
    let mut query = sqlx::query_as::<_, Publication>(&sql).bind(scholar_profile_id);
    if let Some(snapshot) = snapshot_before {
        query = query.bind(snapshot);
    }
    query.bind(limit).bind(offset).fetch_all(pool).await
}

pub async fn set_favorite(
    pool: &SqlitePool,
    scholar_profile_ids: &[i64],
    publication_id: i64,
    favorite: bool,
) -> Result<(), sqlx::Error> {
    for scholar_profile_id in scholar_profile_ids {
        sqlx::query(
            "UPDATE scholar_publications SET is_favorite = ? \
             WHERE scholar_profile_id = ? AND publication_id = ?",
        )
        .bind(favorite)
        .bind(scholar_profile_id)
        .bind(publication_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn mark_all_unread_as_read(pool: &SqlitePool, scholar_profile_ids: &[i64]) -> Result<u64, sqlx::Error> {
    let mut total = 0;
    for scholar_profile_id in scholar_profile_ids {
        let result = sqlx::query(
            "UPDATE scholar_publications SET is_read = 1 \
             WHERE scholar_profile_id = ? AND is_read = 0",
        )
        .bind(scholar_profile_id)
        .execute(pool)
        .await?;
        total += result.rows_affected();
    }
    Ok(total)
}

pub async fn mark_selected_as_read(
    pool: &SqlitePool,
    scholar_profile_ids: &[i64],
    publication_ids: &[i64],
) -> Result<u64, sqlx::Error> {
    let mut total = 0;
    for scholar_profile_id in scholar_profile_ids {
        for publication_id in publication_ids {
            let result = sqlx::query(
                "UPDATE scholar_publications SET is_read = 1 \
                 WHERE scholar_profile_id = ? AND publication_id = ?",
            )
            .bind(scholar_profile_id)
            .bind(publication_id)
            .execute(pool)
            .await?;
            total += result.rows_affected();
        }
    }
    Ok(total)
}

/// Highest-confidence identifier per publication, for UI display.
pub async fn display_identifier(
    pool: &SqlitePool,
    publication_id: i64,
) -> Result<Option<DisplayIdentifier>, sqlx::Error> {
    let row: Option<(String, String, f64, Option<String>)> = sqlx::query_as(
        "SELECT kind, value_raw, confidence_score, evidence_url FROM publication_identifiers \
         WHERE publication_id = ? ORDER BY confidence_score DESC LIMIT 1",
    )
    .bind(publication_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(kind, value, confidence_score, url)| {
        let label = match kind.as_str() {
            "doi" => format!("DOI: {value}"),
            "arxiv" => format!("arXiv: {value}"),
            "pmid" => format!("PMID: {value}"),
            "pmcid" => format!("PMCID: {value}"),
            _ => value.clone(),
        };
        DisplayIdentifier {
            kind,
            value,
            label,
            url,
            confidence_score,
        }
    }))
}

pub async fn get(pool: &SqlitePool, publication_id: i64) -> Result<Option<Publication>, sqlx::Error> {
    sqlx::query_as::<_, Publication>(&format!("SELECT {COLUMNS} FROM publications WHERE id = ?"))
        .bind(publication_id)
        .fetch_optional(pool)
        .await
}

/// Publications belonging to `user_id` that need enrichment, per §4.9's query.
pub async fn list_pending_enrichment(
    pool: &SqlitePool,
    user_id: i64,
    cooldown_threshold: DateTime<Utc>,
) -> Result<Vec<Publication>, sqlx::Error> {
    sqlx::query_as::<_, Publication>(&format!(
        "SELECT DISTINCT p.{} FROM publications p \
         JOIN scholar_publications link ON link.publication_id = p.id \
         JOIN scholar_profiles sp ON sp.id = link.scholar_profile_id \
         WHERE sp.user_id = ? AND p.openalex_enriched = 0 \
           AND (p.openalex_last_attempt_at IS NULL OR p.openalex_last_attempt_at < ?)",
        COLUMNS
            .split(", ")
            .collect::<Vec<_>>()
            .join(", p."),
    ))
    .bind(user_id)
    .bind(cooldown_threshold)
    .fetch_all(pool)
    .await
}

pub async fn mark_openalex_attempt(pool: &SqlitePool, publication_id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE publications SET openalex_last_attempt_at = ? WHERE id = ?")
        .bind(at)
        .bind(publication_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub struct OpenAlexMatchFields {
    pub year: Option<i64>,
    pub citation_count: Option<i64>,
    pub pdf_url: Option<String>,
}

pub async fn apply_openalex_match(
    pool: &SqlitePool,
    publication_id: i64,
    fields: OpenAlexMatchFields,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE publications SET \
           year = COALESCE(year, ?), \
           citation_count = COALESCE(?, citation_count), \
           pdf_url = COALESCE(?, pdf_url), \
           openalex_enriched = 1 \
         WHERE id = ?",
    )
    .bind(fields.year)
    .bind(fields.citation_count)
    .bind(fields.pdf_url)
    .bind(publication_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Identifier duplicate sweep (§4.12): migrate links from the higher-id
/// duplicate to the lower-id winner, then delete the duplicate. Each pair is
/// processed at most once per sweep.
pub async fn sweep_identifier_duplicates(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let pairs: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT a.publication_id AS winner, b.publication_id AS dup \
         FROM publication_identifiers a \
         JOIN publication_identifiers b \
           ON a.kind = b.kind AND a.value_normalized = b.value_normalized \
           AND a.publication_id < b.publication_id \
         GROUP BY winner, dup",
    )
    .fetch_all(pool)
    .await?;

    let mut merged = 0u64;
    let mut seen = std::collections::HashSet::new();
    for (winner, dup) in pairs {
        if !seen.insert(dup) {
            continue;
        }
        sqlx::query(
            "UPDATE OR IGNORE scholar_publications SET publication_id = ? WHERE publication_id = ?",
        )
        .bind(winner)
        .bind(dup)
        .execute(pool)
        .await?;
        sqlx::query("DELETE FROM scholar_publications WHERE publication_id = ?")
            .bind(dup)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM publications WHERE id = ?")
            .bind(dup)
            .execute(pool)
            .await?;
        merged += 1;
    }
    Ok(merged)
}
