//! Persistent TTL cache for tag and gallery lookups.
//!
//! This crate provides:
//! - Tag and gallery caches with SQLite backend and logical expiry
//! - An append-only, deduplicated tag history
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, GalleryCacheMeta, HistoryLimit, Link, PurgeStats, Snippet};
pub use config::{AppConfig, ConfigError};
pub use error::{Error, ErrorKind};
