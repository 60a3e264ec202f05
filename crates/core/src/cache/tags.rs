//! Tag cache operations.
//!
//! Maps a lowercased tag to the list of link records fetched for it.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::{decode_records, encode_records, expires_at, is_expired, normalize_tag, unix_seconds};
use crate::Error;

/// Opaque link record; the cache never looks inside it.
pub type Link = serde_json::Value;

impl CacheDb {
    /// Get the cached links for a tag.
    ///
    /// The lookup is case-insensitive. Returns None if the tag was never
    /// cached or its entry has expired; an expired row is left in place.
    pub async fn load_tag<T: DeserializeOwned>(&self, tag: &str) -> Result<Option<Vec<T>>, Error> {
        self.load_tag_at(tag, Utc::now()).await
    }

    pub(crate) async fn load_tag_at<T: DeserializeOwned>(
        &self, tag: &str, now: DateTime<Utc>,
    ) -> Result<Option<Vec<T>>, Error> {
        let key = normalize_tag(tag);
        let lookup = key.clone();
        let row = self
            .with_conn(move |conn| -> Result<Option<(String, f64)>, Error> {
                let result = conn.query_row(
                    "SELECT links, expires_at FROM tag_cache WHERE tag = ?1",
                    params![lookup],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let Some((links, expires)) = row else {
            tracing::debug!(tag = %key, "tag cache miss");
            return Ok(None);
        };

        if is_expired(expires, now) {
            tracing::debug!(tag = %key, expires_at = expires, "tag cache entry expired");
            return Ok(None);
        }

        tracing::debug!(tag = %key, "tag cache hit");
        decode_records(&links).map(Some)
    }

    /// Insert or replace the cached links for a tag.
    ///
    /// The entry expires `ttl_days` days from now; a negative TTL writes an
    /// already-expired entry.
    pub async fn save_tag<T: Serialize>(&self, tag: &str, links: &[T], ttl_days: f64) -> Result<(), Error> {
        self.save_tag_at(tag, links, ttl_days, Utc::now()).await
    }

    pub(crate) async fn save_tag_at<T: Serialize>(
        &self, tag: &str, links: &[T], ttl_days: f64, now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let key = normalize_tag(tag);
        let expires = expires_at(now, ttl_days)?;
        let links_json = encode_records(links)?;

        tracing::debug!(tag = %key, links = links.len(), expires_at = expires, "saving tag cache entry");

        self.with_conn(move |conn| -> Result<(), Error> {
            conn.execute(
                "INSERT INTO tag_cache (tag, links, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tag) DO UPDATE SET
                    links = excluded.links,
                    expires_at = excluded.expires_at",
                params![key, links_json, expires],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete expired tag cache entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_tags(&self) -> Result<u64, Error> {
        let now = unix_seconds(Utc::now());
        self.with_conn(move |conn| -> Result<u64, Error> {
            let count = conn.execute("DELETE FROM tag_cache WHERE expires_at < ?1", params![now])?;
            Ok(count as u64)
        })
        .await
    }
}
