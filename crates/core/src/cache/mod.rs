//! SQLite-backed cache for tag lookups, gallery lookups, and tag history.
//!
//! This module provides a persistent TTL cache using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Two independent keyed namespaces (tags, gallery URLs) with logical expiry
//! - An append-only, deduplicated history of seen tags
//! - Automatic schema migrations
//! - Per-operation connections for file-backed stores

pub mod connection;
pub mod galleries;
pub mod history;
pub mod migrations;
pub mod tags;

pub use crate::Error;

pub use connection::{CacheDb, PurgeStats};
pub use galleries::{GalleryCacheMeta, Snippet};
pub use history::HistoryLimit;
pub use tags::Link;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tags are case-insensitive keys; they are stored lowercased.
pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.to_lowercase()
}

/// Unix time in fractional seconds (microsecond precision).
pub(crate) fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0
}

/// Absolute expiry for an entry written at `now` with a TTL in days.
pub(crate) fn expires_at(now: DateTime<Utc>, ttl_days: f64) -> Result<f64, Error> {
    let expires = unix_seconds(now) + ttl_days * SECONDS_PER_DAY;
    if !expires.is_finite() {
        return Err(Error::InvalidInput(format!("ttl_days must be a finite number, got {ttl_days}")));
    }
    Ok(expires)
}

/// An entry is stale once the current time has passed its expiry.
pub(crate) fn is_expired(expires_at: f64, now: DateTime<Utc>) -> bool {
    expires_at < unix_seconds(now)
}

pub(crate) fn encode_records<T: Serialize>(records: &[T]) -> Result<String, Error> {
    serde_json::to_string(records).map_err(|e| Error::InvalidInput(format!("failed to serialize records: {e}")))
}

pub(crate) fn decode_records<T: DeserializeOwned>(blob: &str) -> Result<Vec<T>, Error> {
    serde_json::from_str(blob).map_err(|e| Error::Decode(e.to_string()))
}
