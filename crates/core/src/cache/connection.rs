//! Database location, connection lifecycle, and schema initialization.
//!
//! A file-backed store opens a fresh connection at the start of every
//! operation and closes it when the operation ends, whether it succeeded or
//! not. Nothing is held between operations, so concurrent callers are
//! serialized only by SQLite's own file locking.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, rusqlite};

use super::migrations;
use crate::Error;
use crate::config::AppConfig;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

#[derive(Clone, Debug)]
enum Location {
    File { path: PathBuf, busy_timeout: Duration },
    /// An in-memory database only lives as long as its connection, so it is shared.
    Memory(Connection),
}

/// Rows removed by an expiry purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStats {
    pub tags: u64,
    pub galleries: u64,
}

/// Cache database handle.
///
/// Cheap to clone; clones of an in-memory handle share the same database.
#[derive(Clone, Debug)]
pub struct CacheDb {
    location: Location,
}

impl CacheDb {
    /// Open a database at the specified path with default settings.
    ///
    /// Creates the file (and its parent directory) if it doesn't exist and
    /// runs [`CacheDb::initialize`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_file(path.as_ref().to_path_buf(), AppConfig::default().busy_timeout()).await
    }

    /// Open the database described by `config`.
    ///
    /// Runs [`CacheDb::initialize`], then purges expired rows once if
    /// `purge_on_open` is set.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let db = Self::open_file(config.db_path.clone(), config.busy_timeout()).await?;

        if config.purge_on_open {
            db.purge_expired().await?;
        }

        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// The handle keeps its single connection for as long as any clone of it
    /// is alive.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;

        let db = Self { location: Location::Memory(conn) };
        db.initialize().await?;
        Ok(db)
    }

    async fn open_file(path: PathBuf, busy_timeout: Duration) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io { path: parent.to_path_buf(), source })?;
        }

        let db = Self { location: Location::File { path, busy_timeout } };
        db.initialize().await?;
        Ok(db)
    }

    /// Path of the backing file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File { path, .. } => Some(path),
            Location::Memory(_) => None,
        }
    }

    /// Apply pragmas and create any missing tables.
    ///
    /// Safe to call any number of times.
    pub async fn initialize(&self) -> Result<(), Error> {
        let conn = self.acquire().await?;
        let result = prepare(&conn).await;
        self.release(conn).await;
        result
    }

    /// Delete expired rows from both the tag and gallery caches.
    pub async fn purge_expired(&self) -> Result<PurgeStats, Error> {
        let stats = PurgeStats {
            tags: self.purge_expired_tags().await?,
            galleries: self.purge_expired_galleries().await?,
        };

        tracing::info!(tags = stats.tags, galleries = stats.galleries, "purged expired cache entries");
        Ok(stats)
    }

    /// Run `function` on a connection acquired for this call only.
    ///
    /// The connection is released afterwards regardless of the outcome.
    pub(crate) async fn with_conn<F, R>(&self, function: F) -> Result<R, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.acquire().await?;
        let result = conn.call(function).await.map_err(Error::from);
        self.release(conn).await;
        result
    }

    async fn acquire(&self) -> Result<Connection, Error> {
        match &self.location {
            Location::Memory(conn) => Ok(conn.clone()),
            Location::File { path, busy_timeout } => {
                let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;

                let timeout = *busy_timeout;
                conn.call(move |conn| conn.busy_timeout(timeout))
                    .await
                    .map_err(Error::from)?;

                Ok(conn)
            }
        }
    }

    async fn release(&self, conn: Connection) {
        if !matches!(self.location, Location::File { .. }) {
            return;
        }

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close cache connection");
        }
    }
}

async fn prepare(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| conn.execute_batch(PRAGMAS))
        .await
        .map_err(Error::from)?;

    migrations::run(conn).await
}
