//! SQLite schema for the tournament store

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bots (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE,
    enabled         INTEGER NOT NULL DEFAULT 1,
    mu              REAL NOT NULL,
    sigma           REAL NOT NULL,
    matches_played  INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS matches (
    id                 TEXT PRIMARY KEY,
    started_at         TEXT NOT NULL,
    duration_ms        INTEGER NOT NULL,
    participants_json  TEXT NOT NULL,
    replay             TEXT,
    seed               TEXT,
    width              INTEGER,
    height             INTEGER,
    status             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS match_results (
    match_id          TEXT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    bot               TEXT NOT NULL REFERENCES bots(name),
    slot              INTEGER NOT NULL,
    rank              INTEGER NOT NULL,
    reported_rank     INTEGER NOT NULL,
    outcome           TEXT NOT NULL,
    last_frame_alive  INTEGER,
    mu                REAL NOT NULL,
    sigma             REAL NOT NULL,
    error_log         TEXT,
    PRIMARY KEY (match_id, bot)
);

CREATE INDEX IF NOT EXISTS idx_match_results_bot ON match_results(bot);
"#;

pub(crate) fn init_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    // WAL lets readers (the roster query) proceed while another worker writes
    let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(SCHEMA)
}
