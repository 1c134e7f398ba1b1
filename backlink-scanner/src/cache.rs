use crate::error::{Result, ScanError};
use async_trait::async_trait;
use backlink_core::recognizer::ContentClass;
use backlink_core::{CanonicalUrl, FetchError, FetchGateway, FetchResponse};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// File name of the on-disk cache inside a cache directory.
pub const CACHE_FILE_NAME: &str = "responses.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    /// Total size of the cached bodies.
    pub bytes: u64,
}

/// Storage for fetched responses, keyed by canonical URL.
pub trait ResponseCache: Send + Sync {
    /// A fresh entry for `key`. Expired entries are dropped and reported as misses.
    fn get(&self, key: &str) -> Result<Option<FetchResponse>>;
    fn put(&self, key: &str, response: &FetchResponse) -> Result<()>;
    fn stats(&self) -> Result<CacheStats>;
    /// Remove every entry, returning how many were removed.
    fn clear(&self) -> Result<usize>;
}

impl<T: ResponseCache + ?Sized> ResponseCache for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<FetchResponse>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, response: &FetchResponse) -> Result<()> {
        (**self).put(key, response)
    }

    fn stats(&self) -> Result<CacheStats> {
        (**self).stats()
    }

    fn clear(&self) -> Result<usize> {
        (**self).clear()
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// An entry is stale once it is `expire_secs` old; zero expires everything.
fn is_expired(stored_at: i64, expire_secs: u64, now: i64) -> bool {
    now.saturating_sub(stored_at) >= expire_secs as i64
}

fn poisoned<T>(_: T) -> ScanError {
    ScanError::Other("cache lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct CachedEntry {
    stored_at: i64,
    response: FetchResponse,
}

/// Process-local cache. Contents are lost when the process exits.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
    expire_secs: u64,
}

impl MemoryCache {
    pub fn new(expire_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expire_secs,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CachedEntry>>> {
        self.entries.lock().map_err(poisoned)
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<FetchResponse>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if !is_expired(entry.stored_at, self.expire_secs, now()) => {
                Ok(Some(entry.response.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, response: &FetchResponse) -> Result<()> {
        self.lock()?.insert(
            key.to_string(),
            CachedEntry {
                stored_at: now(),
                response: response.clone(),
            },
        );
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let entries = self.lock()?;
        let now = now();
        Ok(CacheStats {
            entries: entries.len(),
            expired: entries
                .values()
                .filter(|e| is_expired(e.stored_at, self.expire_secs, now))
                .count(),
            bytes: entries.values().map(|e| e.response.body.len() as u64).sum(),
        })
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// On-disk cache backed by a single SQLite file.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    path: PathBuf,
    expire_secs: u64,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`, creating parent directories.
    pub fn open(path: &Path, expire_secs: u64) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS responses (
                url TEXT PRIMARY KEY,
                status INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                body TEXT NOT NULL,
                final_url TEXT NOT NULL,
                redirect_chain TEXT NOT NULL,  -- JSON array
                stored_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_responses_stored_at ON responses(stored_at);
            ",
        )?;
        info!("Response cache at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            expire_secs,
        })
    }

    /// Open the cache file inside `directory`.
    pub fn in_directory(directory: &Path, expire_secs: u64) -> Result<Self> {
        Self::open(&directory.join(CACHE_FILE_NAME), expire_secs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let cutoff = now().saturating_sub(self.expire_secs as i64);
        Ok(conn.execute(
            "DELETE FROM responses WHERE stored_at <= ?1",
            params![cutoff],
        )?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }
}

impl ResponseCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<FetchResponse>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT status, content_type, body, final_url, redirect_chain, stored_at
                 FROM responses WHERE url = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, content_type, body, final_url, chain, stored_at)) = row else {
            return Ok(None);
        };
        if is_expired(stored_at, self.expire_secs, now()) {
            debug!("Cache entry for {} expired", key);
            conn.execute("DELETE FROM responses WHERE url = ?1", params![key])?;
            return Ok(None);
        }

        Ok(Some(FetchResponse {
            status: status as u16,
            content_type,
            body,
            final_url,
            redirect_chain: serde_json::from_str(&chain)?,
        }))
    }

    fn put(&self, key: &str, response: &FetchResponse) -> Result<()> {
        let chain = serde_json::to_string(&response.redirect_chain)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (
                url, status, content_type, body, final_url, redirect_chain, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                response.status as i64,
                response.content_type,
                response.body,
                response.final_url,
                chain,
                now(),
            ],
        )?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let (entries, bytes) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(body AS BLOB))), 0) FROM responses",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        let cutoff = now().saturating_sub(self.expire_secs as i64);
        let expired = conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE stored_at <= ?1",
            params![cutoff],
            |row| row.get::<_, i64>(0),
        )?;

        Ok(CacheStats {
            entries: entries as usize,
            expired: expired as usize,
            bytes: bytes as u64,
        })
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM responses", [])?)
    }
}

/// Gateway decorator that answers from a [`ResponseCache`] before asking `inner`.
///
/// Only successful markup responses are stored unless `store_errors` is set. Cache
/// failures are logged and never fail the fetch.
pub struct CachingFetcher<F, C> {
    inner: F,
    cache: C,
    store_errors: bool,
}

impl<F, C> CachingFetcher<F, C>
where
    F: FetchGateway,
    C: ResponseCache,
{
    pub fn new(inner: F, cache: C) -> Self {
        Self {
            inner,
            cache,
            store_errors: false,
        }
    }

    pub fn with_store_errors(mut self, store_errors: bool) -> Self {
        self.store_errors = store_errors;
        self
    }

    fn should_store(&self, response: &FetchResponse) -> bool {
        if ContentClass::from_content_type(&response.content_type) != ContentClass::Markup {
            return false;
        }
        response.is_success() || self.store_errors
    }
}

#[async_trait]
impl<F, C> FetchGateway for CachingFetcher<F, C>
where
    F: FetchGateway,
    C: ResponseCache,
{
    async fn fetch(&self, url: &CanonicalUrl) -> std::result::Result<FetchResponse, FetchError> {
        match self.cache.get(url.as_str()) {
            Ok(Some(hit)) => {
                debug!("Cache hit for {}", url);
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed for {}: {}", url, e),
        }

        let response = self.inner.fetch(url).await?;
        if self.should_store(&response)
            && let Err(e) = self.cache.put(url.as_str(), &response)
        {
            warn!("Cache store failed for {}: {}", url, e);
        }
        Ok(response)
    }
}
