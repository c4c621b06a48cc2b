//! SQLite-backed store, safe for several worker processes sharing one file

use arena_core::{Bot, MatchRecord, Rating};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::schema::init_connection;
use super::{check_ratings, check_recordable, RateFn, Store, StoreError};

const BOT_COLUMNS: &str = "name, enabled, mu, sigma, matches_played";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        init_connection(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_connection(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn row_to_bot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bot> {
    Ok(Bot {
        name: row.get(0)?,
        enabled: row.get::<_, i64>(1)? != 0,
        mu: row.get(2)?,
        sigma: row.get(3)?,
        matches_played: row.get::<_, i64>(4)? as u64,
    })
}

fn fetch_bot(conn: &Connection, name: &str) -> Result<Option<Bot>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {BOT_COLUMNS} FROM bots WHERE name = ?1"),
            [name],
            row_to_bot,
        )
        .optional()?)
}

impl Store for SqliteStore {
    fn register_bot(&self, name: &str, rating: Rating, enabled: bool) -> Result<Bot, StoreError> {
        arena_runner::validate_bot_name(name)?;
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO bots (name, enabled, mu, sigma, matches_played, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)
             ON CONFLICT(name) DO NOTHING",
            params![name, enabled, rating.mu, rating.sigma, Utc::now().to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateBot(name.to_string()));
        }
        fetch_bot(&conn, name)?.ok_or_else(|| StoreError::UnknownBot(name.to_string()))
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE bots SET enabled = ?1 WHERE name = ?2",
            params![enabled, name],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownBot(name.to_string()));
        }
        Ok(())
    }

    fn bot(&self, name: &str) -> Result<Option<Bot>, StoreError> {
        let conn = self.lock()?;
        fetch_bot(&conn, name)
    }

    fn all_bots(&self) -> Result<Vec<Bot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {BOT_COLUMNS} FROM bots ORDER BY id"))?;
        let bots = stmt
            .query_map([], row_to_bot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bots)
    }

    fn enabled_roster(&self) -> Result<Vec<Bot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE enabled = 1 ORDER BY id"
        ))?;
        let bots = stmt
            .query_map([], row_to_bot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bots)
    }

    fn record_match(&self, record: &MatchRecord, rate: &RateFn<'_>) -> Result<Vec<Bot>, StoreError> {
        check_recordable(record)?;
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so the read-modify-write
        // below cannot interleave with another worker's
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: Option<String> = tx
            .query_row("SELECT id FROM matches WHERE id = ?1", [record.id.to_string()], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateMatch(record.id));
        }

        let current = record
            .ranking
            .iter()
            .map(|p| fetch_bot(&tx, &p.bot)?.ok_or_else(|| StoreError::UnknownBot(p.bot.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let ratings = rate(current.as_slice());
        check_ratings(record, &ratings)?;

        let participants_json = serde_json::to_string(&record.participants)
            .map_err(|err| StoreError::Inconsistent(err.to_string()))?;
        tx.execute(
            "INSERT INTO matches (id, started_at, duration_ms, participants_json, replay, seed, width, height, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'finalized')",
            params![
                record.id.to_string(),
                record.started_at.to_rfc3339(),
                record.duration.as_millis() as i64,
                participants_json,
                record.replay.as_ref().map(|p| p.to_string_lossy().into_owned()),
                record.seed,
                record.map_size.map(|(w, _)| w),
                record.map_size.map(|(_, h)| h),
            ],
        )?;

        let mut updated = Vec::with_capacity(current.len());
        for (position, ((placement, bot), rating)) in record
            .ranking
            .iter()
            .zip(current)
            .zip(ratings)
            .enumerate()
        {
            tx.execute(
                "UPDATE bots SET mu = ?1, sigma = ?2, matches_played = matches_played + 1 WHERE name = ?3",
                params![rating.mu, rating.sigma, bot.name],
            )?;
            tx.execute(
                "INSERT INTO match_results (match_id, bot, slot, rank, reported_rank, outcome, last_frame_alive, mu, sigma, error_log)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.to_string(),
                    bot.name,
                    placement.slot as i64,
                    (position + 1) as i64,
                    placement.reported_rank,
                    placement.outcome.as_str(),
                    placement.last_frame_alive,
                    rating.mu,
                    rating.sigma,
                    placement.error_log.as_ref().map(|p| p.to_string_lossy().into_owned()),
                ],
            )?;
            updated.push(Bot {
                mu: rating.mu,
                sigma: rating.sigma,
                matches_played: bot.matches_played + 1,
                ..bot
            });
        }

        tx.commit()?;
        Ok(updated)
    }

    fn match_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM matches WHERE status = 'finalized'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
