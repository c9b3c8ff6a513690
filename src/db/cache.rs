//! Durable cache for external oracle replies.
//!
//! Keys canonicalize oracle, method, and arguments; values are the
//! normalized response JSON. Negative results (definitive empty replies,
//! permanent 4xx) are cached too, with a much shorter TTL, so a miss
//! today is re-asked tomorrow while a hit stays warm for a month.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// Successful responses stay cached for 30 days.
pub const POSITIVE_TTL_DAYS: i64 = 30;
/// Negative responses expire within 24 hours.
pub const NEGATIVE_TTL_HOURS: i64 = 24;

/// Whether an entry records a real answer or a definitive "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Positive,
    Negative,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// A cached oracle reply.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub kind: CacheKind,
    pub captured_at: NaiveDateTime,
}

/// Build a canonical cache key from oracle, method, and arguments.
///
/// Arguments are lowercased, whitespace-collapsed, and sorted so that
/// equivalent requests with different argument order or case hit the
/// same entry.
pub fn cache_key(oracle: &str, method: &str, args: &[&str]) -> String {
    let mut canonical: Vec<String> = args
        .iter()
        .map(|a| a.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    canonical.sort();
    format!("{}:{}:{}", oracle, method, canonical.join("|"))
}

/// Key→JSON store for oracle replies, backed by the embedded database.
#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a fresh entry. Expired entries read as a miss.
    pub async fn get(&self, key: &str) -> sqlx::Result<Option<CacheEntry>> {
        let row: Option<(String, String, NaiveDateTime)> = sqlx::query_as(
            "SELECT response_json, kind, captured_at FROM api_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((value, kind, captured_at)) = row else {
            return Ok(None);
        };
        let kind = match kind.as_str() {
            "negative" => CacheKind::Negative,
            _ => CacheKind::Positive,
        };
        if is_expired(kind, captured_at) {
            return Ok(None);
        }
        Ok(Some(CacheEntry {
            value,
            kind,
            captured_at,
        }))
    }

    /// Store (or refresh) an entry.
    pub async fn put(&self, key: &str, value: &str, kind: CacheKind) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_cache (cache_key, response_json, kind, captured_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                response_json = excluded.response_json,
                kind = excluded.kind,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete all expired entries; returns how many were removed.
    pub async fn evict_expired(&self) -> sqlx::Result<u64> {
        let now = Utc::now().naive_utc();
        let positive_cutoff = now - ChronoDuration::days(POSITIVE_TTL_DAYS);
        let negative_cutoff = now - ChronoDuration::hours(NEGATIVE_TTL_HOURS);

        let result = sqlx::query(
            r#"
            DELETE FROM api_cache
            WHERE (kind = 'positive' AND captured_at < ?)
               OR (kind = 'negative' AND captured_at < ?)
            "#,
        )
        .bind(positive_cutoff)
        .bind(negative_cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn is_expired(kind: CacheKind, captured_at: NaiveDateTime) -> bool {
    let age = Utc::now().naive_utc() - captured_at;
    match kind {
        CacheKind::Positive => age > ChronoDuration::days(POSITIVE_TTL_DAYS),
        CacheKind::Negative => age > ChronoDuration::hours(NEGATIVE_TTL_HOURS),
    }
}
