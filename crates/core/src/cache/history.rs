//! Tag history ledger.
//!
//! One row per lowercased tag holding the Unix second it was most recently
//! added. Rows are refreshed, never deleted.

use chrono::{DateTime, Utc};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use super::normalize_tag;
use crate::Error;

/// How much history `get_last` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLimit {
    /// Every tag, oldest first.
    All,
    /// At most this many tags, most recently added first.
    Last(usize),
}

impl From<Option<usize>> for HistoryLimit {
    fn from(n: Option<usize>) -> Self {
        n.map_or(HistoryLimit::All, HistoryLimit::Last)
    }
}

impl CacheDb {
    /// Record tags in the history, refreshing the timestamp of any already present.
    ///
    /// All tags receive the same timestamp and are written in one transaction.
    pub async fn add_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<(), Error> {
        self.add_tags_at(tags, Utc::now()).await
    }

    pub(crate) async fn add_tags_at<S: AsRef<str>>(&self, tags: &[S], now: DateTime<Utc>) -> Result<(), Error> {
        if tags.is_empty() {
            return Ok(());
        }

        let tags: Vec<String> = tags.iter().map(|t| normalize_tag(t.as_ref())).collect();
        let added_at = now.timestamp();

        tracing::debug!(count = tags.len(), added_at, "recording tag history");

        self.with_conn(move |conn| -> Result<(), Error> {
            let tx = conn.transaction()?;
            {
                // REPLACE deletes the old row, so rowid tracks insertion order within a second.
                let mut stmt = tx.prepare("INSERT OR REPLACE INTO history_tags (tag, added_at) VALUES (?1, ?2)")?;
                for tag in &tags {
                    stmt.execute(params![tag, added_at])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Query the tag history.
    ///
    /// `HistoryLimit::All` returns tags oldest first; `HistoryLimit::Last(n)`
    /// returns up to `n` tags newest first.
    pub async fn get_last(&self, limit: HistoryLimit) -> Result<Vec<String>, Error> {
        self.with_conn(move |conn| -> Result<Vec<String>, Error> {
            let tags = match limit {
                HistoryLimit::All => {
                    let mut stmt = conn.prepare("SELECT tag FROM history_tags ORDER BY added_at ASC, rowid ASC")?;
                    let rows = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                    rows
                }
                HistoryLimit::Last(n) => {
                    let n = i64::try_from(n).unwrap_or(i64::MAX);
                    let mut stmt =
                        conn.prepare("SELECT tag FROM history_tags ORDER BY added_at DESC, rowid DESC LIMIT ?1")?;
                    let rows = stmt.query_map(params![n], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                    rows
                }
            };
            Ok(tags)
        })
        .await
    }
}
