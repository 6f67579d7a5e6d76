use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{ProviderKind, UserStats};

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// One row of the cache, as listed for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAccount {
    pub provider: ProviderKind,
    pub username: String,
    pub stored_at: DateTime<Utc>,
    pub ttl_minutes: u32,
    pub is_stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub row_count: u64,
    /// Bytes of serialized payload across all rows.
    pub total_size: u64,
    pub oldest_entry_age: Option<Duration>,
    pub newest_entry: Option<(ProviderKind, String, DateTime<Utc>)>,
}

/// SQLite-backed snapshot cache keyed by `(provider, username)`.
///
/// A connection is opened per operation and dropped before returning, so no
/// handle is held while network calls are in flight. Reads degrade to a miss
/// on any storage error and `put` never fails the caller.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::CacheUnavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(&self.path).map_err(|e| {
            Error::CacheUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stats_cache (
                provider TEXT NOT NULL,
                username TEXT NOT NULL,
                payload TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                ttl_minutes INTEGER NOT NULL,
                PRIMARY KEY (provider, username)
            );

            CREATE INDEX IF NOT EXISTS idx_stats_cache_stored_at ON stats_cache(stored_at);
            "#,
        )?;
        Ok(conn)
    }

    /// Fresh entry only: `now - stored_at < ttl`.
    pub fn get(&self, provider: ProviderKind, username: &str) -> Option<UserStats> {
        self.read(provider, username, false, Utc::now())
    }

    /// Most recent entry regardless of age.
    pub fn get_stale(&self, provider: ProviderKind, username: &str) -> Option<UserStats> {
        self.read(provider, username, true, Utc::now())
    }

    fn read(
        &self,
        provider: ProviderKind,
        username: &str,
        allow_stale: bool,
        now: DateTime<Utc>,
    ) -> Option<UserStats> {
        match self.try_read(provider, username, allow_stale, now) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    fn try_read(
        &self,
        provider: ProviderKind,
        username: &str,
        allow_stale: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<UserStats>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT payload, stored_at, ttl_minutes FROM stats_cache
                 WHERE provider = ?1 AND username = ?2",
                params![provider.as_str(), cache_key(username)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((payload, stored_at, ttl_minutes)) = row else {
            return Ok(None);
        };

        if !allow_stale && is_expired(parse_timestamp(&stored_at)?, ttl_minutes, now) {
            tracing::debug!("Cache entry for {} on {} has expired", username, provider);
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// Upserts the snapshot. Failures are logged and swallowed.
    pub fn put(&self, provider: ProviderKind, username: &str, stats: &UserStats, ttl_minutes: u32) {
        if let Err(e) = self.try_put(provider, username, stats, ttl_minutes) {
            tracing::warn!("Cache write failed for {} on {}: {}", username, provider, e);
        }
    }

    pub fn try_put(
        &self,
        provider: ProviderKind,
        username: &str,
        stats: &UserStats,
        ttl_minutes: u32,
    ) -> Result<()> {
        self.put_at(provider, username, stats, ttl_minutes, Utc::now())
    }

    /// Upserts with an explicit `stored_at`. The row is replaced in a single
    /// statement, so either the full snapshot lands or nothing does.
    pub fn put_at(
        &self,
        provider: ProviderKind,
        username: &str,
        stats: &UserStats,
        ttl_minutes: u32,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(stats)?;
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO stats_cache (provider, username, payload, stored_at, ttl_minutes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(provider, username) DO UPDATE SET
                payload = excluded.payload,
                stored_at = excluded.stored_at,
                ttl_minutes = excluded.ttl_minutes
            "#,
            params![
                provider.as_str(),
                cache_key(username),
                payload,
                stored_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ttl_minutes,
            ],
        )?;
        tracing::debug!("Cached stats for {} on {}", username, provider);
        Ok(())
    }

    /// Deletes every row. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.connect()?;
        Ok(conn.execute("DELETE FROM stats_cache", [])?)
    }

    /// Deletes the rows for `username` on every provider.
    pub fn clear_user(&self, username: &str) -> Result<usize> {
        let conn = self.connect()?;
        Ok(conn.execute(
            "DELETE FROM stats_cache WHERE username = ?1",
            params![cache_key(username)],
        )?)
    }

    pub fn list_cached(&self) -> Result<Vec<CachedAccount>> {
        self.list_cached_at(Utc::now())
    }

    fn list_cached_at(&self, now: DateTime<Utc>) -> Result<Vec<CachedAccount>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT provider, username, stored_at, ttl_minutes FROM stats_cache
             ORDER BY stored_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut accounts = Vec::with_capacity(rows.len());
        for (provider, username, stored_at, ttl_minutes) in rows {
            let Some(provider) = ProviderKind::parse(&provider) else {
                tracing::warn!("Skipping cache row with unknown provider '{}'", provider);
                continue;
            };
            let stored_at = parse_timestamp(&stored_at)?;
            accounts.push(CachedAccount {
                provider,
                username,
                stored_at,
                ttl_minutes,
                is_stale: is_expired(stored_at, ttl_minutes, now),
            });
        }
        Ok(accounts)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now();
        let conn = self.connect()?;
        let (row_count, total_size, oldest): (u64, u64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload)), 0), MIN(stored_at) FROM stats_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let newest = conn
            .query_row(
                "SELECT provider, username, stored_at FROM stats_cache
                 ORDER BY stored_at DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let oldest_entry_age = oldest
            .map(|ts| parse_timestamp(&ts))
            .transpose()?
            .map(|stored_at| now - stored_at);

        let newest_entry = match newest {
            Some((provider, username, stored_at)) => ProviderKind::parse(&provider)
                .map(|provider| Ok::<_, Error>((provider, username, parse_timestamp(&stored_at)?)))
                .transpose()?,
            None => None,
        };

        Ok(CacheStats {
            row_count,
            total_size,
            oldest_entry_age,
            newest_entry,
        })
    }
}

fn cache_key(username: &str) -> String {
    username.trim().to_lowercase()
}

fn is_expired(stored_at: DateTime<Utc>, ttl_minutes: u32, now: DateTime<Utc>) -> bool {
    now - stored_at >= Duration::minutes(i64::from(ttl_minutes))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::CacheUnavailable(format!("bad stored_at '{}': {}", value, e)))
}
