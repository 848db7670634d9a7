//! `PublicationIdentifier` repository functions (§4.12).

use sqlx::SqlitePool;

use super::models::PublicationIdentifier;

const COLUMNS: &str = "id, publication_id, kind, value_raw, value_normalized, confidence_score, \
    source, evidence_url";

pub async fn list_for_publication(
    pool: &SqlitePool,
    publication_id: i64,
) -> Result<Vec<PublicationIdentifier>, sqlx::Error> {
    sqlx::query_as::<_, PublicationIdentifier>(&format!(
        "SELECT {COLUMNS} FROM publication_identifiers WHERE publication_id = ? \
         ORDER BY confidence_score DESC"
    ))
    .bind(publication_id)
    .fetch_all(pool)
    .await
}

/// Insert an identifier, or raise its confidence if a higher-confidence
/// source now corroborates an existing `(publication_id, kind, value)` triple.
pub async fn upsert(
    pool: &SqlitePool,
    publication_id: i64,
    kind: &str,
    value_raw: &str,
    value_normalized: &str,
    confidence_score: f64,
    source: &str,
    evidence_url: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO publication_identifiers \
           (publication_id, kind, value_raw, value_normalized, confidence_score, source, evidence_url) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (publication_id, kind, value_normalized) DO UPDATE SET \
           confidence_score = MAX(confidence_score, excluded.confidence_score), \
           source = CASE WHEN excluded.confidence_score > confidence_score THEN excluded.source ELSE source END, \
           evidence_url = COALESCE(excluded.evidence_url, evidence_url)",
    )
    .bind(publication_id)
    .bind(kind)
    .bind(value_raw)
    .bind(value_normalized)
    .bind(confidence_score)
    .bind(source)
    .bind(evidence_url)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_value(
    pool: &SqlitePool,
    kind: &str,
    value_normalized: &str,
) -> Result<Option<PublicationIdentifier>, sqlx::Error> {
    sqlx::query_as::<_, PublicationIdentifier>(&format!(
        "SELECT {COLUMNS} FROM publication_identifiers WHERE kind = ? AND value_normalized = ? LIMIT 1"
    ))
    .bind(kind)
    .bind(value_normalized)
    .fetch_optional(pool)
    .await
}

pub async fn delete_for_publication(pool: &SqlitePool, publication_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM publication_identifiers WHERE publication_id = ?")
        .bind(publication_id)
        .execute(pool)
        .await?;
    Ok(())
}
