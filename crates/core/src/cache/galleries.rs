//! Gallery cache operations.
//!
//! Maps a gallery URL (exact match, no normalization) to the snippet records
//! extracted from it, along with the tag that led to the gallery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::{decode_records, encode_records, expires_at, is_expired, unix_seconds};
use crate::Error;

/// Opaque snippet record; the cache never looks inside it.
pub type Snippet = serde_json::Value;

/// Provenance and expiry of a cached gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryCacheMeta {
    /// Tag that produced this gallery, as given to `save_gallery`.
    pub tag: String,
    /// Unix seconds after which the entry reads as a miss.
    pub expires_at: f64,
}

impl GalleryCacheMeta {
    /// Whether `load_gallery` would currently treat this entry as absent.
    pub fn is_expired(&self) -> bool {
        is_expired(self.expires_at, Utc::now())
    }
}

impl CacheDb {
    /// Get the cached snippets for a gallery URL.
    ///
    /// Returns None if the URL was never cached or its entry has expired.
    /// The stored provenance tag is not returned; see [`CacheDb::get_gallery_meta`].
    pub async fn load_gallery<T: DeserializeOwned>(&self, url: &str) -> Result<Option<Vec<T>>, Error> {
        self.load_gallery_at(url, Utc::now()).await
    }

    pub(crate) async fn load_gallery_at<T: DeserializeOwned>(
        &self, url: &str, now: DateTime<Utc>,
    ) -> Result<Option<Vec<T>>, Error> {
        let lookup = url.to_string();
        let row = self
            .with_conn(move |conn| -> Result<Option<(String, f64)>, Error> {
                let mut stmt = conn.prepare("SELECT snippets, expires_at FROM gallery_cache WHERE url = ?1")?;

                let result = stmt.query_row(params![lookup], |row| Ok((row.get(0)?, row.get(1)?)));

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        match row {
            None => {
                tracing::debug!(url, "gallery cache miss");
                Ok(None)
            }
            Some((_, expires)) if is_expired(expires, now) => {
                tracing::debug!(url, expires_at = expires, "gallery cache entry expired");
                Ok(None)
            }
            Some((snippets, _)) => {
                tracing::debug!(url, "gallery cache hit");
                decode_records(&snippets).map(Some)
            }
        }
    }

    /// Get gallery provenance by URL, whether or not the entry is still fresh.
    pub async fn get_gallery_meta(&self, url: &str) -> Result<Option<GalleryCacheMeta>, Error> {
        let url = url.to_string();
        self.with_conn(move |conn| -> Result<Option<GalleryCacheMeta>, Error> {
            let mut stmt = conn.prepare("SELECT tag, expires_at FROM gallery_cache WHERE url = ?1")?;

            let result =
                stmt.query_row(params![url], |row| Ok(GalleryCacheMeta { tag: row.get(0)?, expires_at: row.get(1)? }));

            match result {
                Ok(meta) => Ok(Some(meta)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Insert or replace the cached snippets for a gallery URL.
    ///
    /// `tag` is stored as provenance only and plays no part in lookups.
    pub async fn save_gallery<T: Serialize>(
        &self, url: &str, tag: &str, snippets: &[T], ttl_days: f64,
    ) -> Result<(), Error> {
        self.save_gallery_at(url, tag, snippets, ttl_days, Utc::now()).await
    }

    pub(crate) async fn save_gallery_at<T: Serialize>(
        &self, url: &str, tag: &str, snippets: &[T], ttl_days: f64, now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let expires = expires_at(now, ttl_days)?;
        let snippets_json = encode_records(snippets)?;
        let url = url.to_string();
        let tag = tag.to_string();

        tracing::debug!(url = %url, tag = %tag, snippets = snippets.len(), "saving gallery cache entry");

        self.with_conn(move |conn| -> Result<(), Error> {
            conn.execute(
                "INSERT INTO gallery_cache (url, tag, snippets, expires_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(url) DO UPDATE SET
                    tag = excluded.tag,
                    snippets = excluded.snippets,
                    expires_at = excluded.expires_at",
                params![url, tag, snippets_json, expires],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete expired gallery cache entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_galleries(&self) -> Result<u64, Error> {
        let now = unix_seconds(Utc::now());
        self.with_conn(move |conn| -> Result<u64, Error> {
            let count = conn.execute("DELETE FROM gallery_cache WHERE expires_at < ?1", params![now])?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::{Value, json};

    const URL: &str = "https://example.com/gallery/42";

    #[tokio::test]
    async fn test_save_and_load_gallery() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let snippets = vec![json!({"img": "a.jpg", "caption": "A"}), json!({"img": "b.jpg"})];

        db.save_gallery(URL, "Beach", &snippets, 1.0).await.unwrap();

        assert_eq!(db.load_gallery::<Value>(URL).await.unwrap(), Some(snippets));
    }

    #[tokio::test]
    async fn test_gallery_url_is_case_sensitive() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_gallery(URL, "beach", &[json!(1)], 1.0).await.unwrap();

        let upper = URL.to_uppercase();
        assert!(db.load_gallery::<Value>(&upper).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gallery_expiry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_gallery(URL, "beach", &[json!(1)], -1.0).await.unwrap();
        assert!(db.load_gallery::<Value>(URL).await.unwrap().is_none());

        let t0 = DateTime::from_timestamp(2_000_000, 0).unwrap();
        db.save_gallery_at(URL, "beach", &[json!(2)], 0.5, t0).await.unwrap();
        let within = DateTime::from_timestamp(2_000_000 + 43_200, 0).unwrap();
        let after = DateTime::from_timestamp(2_000_000 + 43_201, 0).unwrap();
        assert_eq!(db.load_gallery_at::<Value>(URL, within).await.unwrap(), Some(vec![json!(2)]));
        assert!(db.load_gallery_at::<Value>(URL, after).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gallery_overwrite_replaces_provenance() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_gallery(URL, "first", &[json!("old")], 1.0).await.unwrap();
        db.save_gallery(URL, "Second", &[json!("new")], 1.0).await.unwrap();

        assert_eq!(db.load_gallery::<Value>(URL).await.unwrap(), Some(vec![json!("new")]));

        let meta = db.get_gallery_meta(URL).await.unwrap().unwrap();
        assert_eq!(meta.tag, "Second");
        assert!(!meta.is_expired());
    }

    #[tokio::test]
    async fn test_gallery_meta_survives_expiry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_gallery_meta(URL).await.unwrap().is_none());

        db.save_gallery(URL, "beach", &[json!(1)], -1.0).await.unwrap();

        let meta = db.get_gallery_meta(URL).await.unwrap().unwrap();
        assert_eq!(meta.tag, "beach");
        assert!(meta.is_expired());
    }

    #[tokio::test]
    async fn test_tag_and_gallery_namespaces_independent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = "sunset";

        db.save_tag(key, &[json!("link")], 1.0).await.unwrap();
        assert!(db.load_gallery::<Value>(key).await.unwrap().is_none());

        db.save_gallery(key, key, &[json!("snippet")], 1.0).await.unwrap();
        assert_eq!(db.load_tag::<Value>(key).await.unwrap(), Some(vec![json!("link")]));
        assert_eq!(db.load_gallery::<Value>(key).await.unwrap(), Some(vec![json!("snippet")]));
    }

    #[tokio::test]
    async fn test_corrupt_gallery_blob_is_decode_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO gallery_cache (url, tag, snippets, expires_at) VALUES (?1, 'x', '\"scalar\"', 9e15)",
                [URL],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let err = db.load_gallery::<Value>(URL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_purge_expired_galleries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_gallery("https://example.com/old", "a", &[json!(1)], -1.0).await.unwrap();
        db.save_gallery(URL, "a", &[json!(1)], 1.0).await.unwrap();

        assert_eq!(db.purge_expired_galleries().await.unwrap(), 1);
        assert!(db.get_gallery_meta("https://example.com/old").await.unwrap().is_none());
        assert!(db.load_gallery::<Value>(URL).await.unwrap().is_some());
    }
}
