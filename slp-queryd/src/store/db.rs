use std::collections::HashSet;
use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{ServiceRecord, WatchedRecord};

const SELECT_COLUMNS: &str = "SELECT watch, slp_url, name, ip, port, protocol, slp_type, host,
        lifetime, attributes, match_params, discovered_at, first_seen, last_seen, alive
    FROM records";

pub struct WatchDb {
    conn: Connection,
}

impl WatchDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                watch         TEXT NOT NULL,
                slp_url       TEXT NOT NULL,
                name          TEXT NOT NULL,
                ip            TEXT NOT NULL,
                port          INTEGER NOT NULL,
                protocol      TEXT NOT NULL,
                slp_type      TEXT NOT NULL,
                host          TEXT NOT NULL,
                lifetime      INTEGER NOT NULL,
                attributes    TEXT NOT NULL,
                match_params  TEXT NOT NULL,
                discovered_at TEXT NOT NULL,
                first_seen    TEXT NOT NULL,
                last_seen     TEXT NOT NULL,
                alive         INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (watch, slp_url)
            );

            CREATE INDEX IF NOT EXISTS idx_watch ON records(watch);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Insert or refresh a record for a watch. Returns true if data changed.
    pub fn upsert_record(&self, watch: &str, record: &ServiceRecord) -> Result<bool> {
        let existing = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE watch = ?1 AND slp_url = ?2"),
                params![watch, &record.slp_url],
                Self::row_to_record,
            )
            .optional()
            .context("Failed to query existing record")?;

        let changed = match &existing {
            Some(old) => !old.alive || record_data_changed(&old.record, record),
            None => true,
        };

        let attributes_json = serde_json::to_string(&record.attributes)
            .context("Failed to serialize attributes")?;
        let match_params_json = serde_json::to_string(&record.match_params)
            .context("Failed to serialize match params")?;
        let seen = record.discovered_at.to_rfc3339();

        self.conn.execute(
            r#"
            INSERT INTO records (
                watch, slp_url, name, ip, port, protocol, slp_type, host, lifetime,
                attributes, match_params, discovered_at, first_seen, last_seen, alive
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?12, 1)
            ON CONFLICT(watch, slp_url) DO UPDATE SET
                name = excluded.name,
                ip = excluded.ip,
                port = excluded.port,
                protocol = excluded.protocol,
                slp_type = excluded.slp_type,
                host = excluded.host,
                lifetime = excluded.lifetime,
                attributes = excluded.attributes,
                match_params = excluded.match_params,
                discovered_at = excluded.discovered_at,
                last_seen = excluded.last_seen,
                alive = 1
            "#,
            params![
                watch,
                &record.slp_url,
                &record.name,
                &record.ip,
                record.port,
                &record.protocol,
                &record.slp_type,
                &record.host,
                record.lifetime,
                &attributes_json,
                &match_params_json,
                seen,
            ],
        )
        .context("Failed to upsert record")?;

        Ok(changed)
    }

    /// Mark every live record of `watch` whose URL is not in `live_urls` as
    /// gone. Returns how many were marked.
    pub fn mark_gone(&self, watch: &str, live_urls: &[String]) -> Result<u64> {
        let live: HashSet<&str> = live_urls.iter().map(String::as_str).collect();

        let mut stmt = self
            .conn
            .prepare("SELECT slp_url FROM records WHERE watch = ?1 AND alive = 1")
            .context("Failed to prepare query")?;
        let stored = stmt
            .query_map([watch], |row| row.get::<_, String>(0))
            .context("Failed to query live records")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect live records")?;

        let mut count = 0;
        for url in stored.iter().filter(|url| !live.contains(url.as_str())) {
            count += self
                .conn
                .execute(
                    "UPDATE records SET alive = 0 WHERE watch = ?1 AND slp_url = ?2",
                    params![watch, url],
                )
                .context("Failed to mark record as gone")? as u64;
        }

        Ok(count)
    }

    /// Get all records
    pub fn get_all_records(&self) -> Result<Vec<WatchedRecord>> {
        let mut stmt = self
            .conn
            .prepare(SELECT_COLUMNS)
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map([], Self::row_to_record)
            .context("Failed to query records")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect records")?;

        Ok(records)
    }

    /// Get the records of one watch
    pub fn get_watch_records(&self, watch: &str) -> Result<Vec<WatchedRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE watch = ?1"))
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map([watch], Self::row_to_record)
            .context("Failed to query records by watch")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect records")?;

        Ok(records)
    }

    /// Delete records not seen recently
    pub fn prune_stale(&self, prune_after_secs: u64) -> Result<u64> {
        let cutoff = stale_cutoff(prune_after_secs)?;

        let count = self.conn.execute(
            "DELETE FROM records WHERE last_seen < ?1",
            params![cutoff.to_rfc3339()],
        )
        .context("Failed to prune old records")?;

        Ok(count as u64)
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<WatchedRecord, rusqlite::Error> {
        let attributes_json: String = row.get(9)?;
        let match_params_json: String = row.get(10)?;
        let alive_int: i32 = row.get(14)?;

        let attributes = serde_json::from_str(&attributes_json)
            .map_err(|e| conversion_error(9, e))?;
        let match_params = serde_json::from_str(&match_params_json)
            .map_err(|e| conversion_error(10, e))?;

        Ok(WatchedRecord {
            watch: row.get(0)?,
            record: ServiceRecord {
                slp_url: row.get(1)?,
                name: row.get(2)?,
                ip: row.get(3)?,
                port: row.get::<_, u16>(4)?,
                protocol: row.get(5)?,
                slp_type: row.get(6)?,
                host: row.get(7)?,
                lifetime: row.get::<_, u16>(8)?,
                attributes,
                match_params,
                discovered_at: timestamp(row, 11)?,
            },
            first_seen: timestamp(row, 12)?,
            last_seen: timestamp(row, 13)?,
            alive: alive_int != 0,
        })
    }
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn timestamp(row: &rusqlite::Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

/// Compare the fields that describe the service, not when it was seen.
fn record_data_changed(old: &ServiceRecord, new: &ServiceRecord) -> bool {
    old.ip != new.ip
        || old.port != new.port
        || old.host != new.host
        || old.protocol != new.protocol
        || old.slp_type != new.slp_type
        || old.attributes != new.attributes
        || old.name != new.name
}

/// Oldest `last_seen` a record may have and still survive pruning.
pub fn stale_cutoff(prune_after_secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(prune_after_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|max_age| Utc::now().checked_sub_signed(max_age))
        .with_context(|| format!("prune_after_secs {} is out of range", prune_after_secs))
}
