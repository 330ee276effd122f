//! SQL migration definitions for the bill tracker database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: bills, hearings, docket_entries, FTS5",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Bills, unique by bill number
CREATE TABLE IF NOT EXISTS bills (
    id           TEXT PRIMARY KEY,
    number       TEXT NOT NULL UNIQUE,
    session_year TEXT NOT NULL,
    title        TEXT,
    summary      TEXT NOT NULL DEFAULT '',
    sponsor      TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT '',
    full_text    TEXT NOT NULL DEFAULT '',
    html_link    TEXT NOT NULL DEFAULT '',
    category     TEXT,
    docket_link  TEXT,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bills_last_updated ON bills(last_updated);
CREATE INDEX IF NOT EXISTS idx_bills_category ON bills(category);

-- At most one upcoming hearing per bill
CREATE TABLE IF NOT EXISTS hearings (
    id        TEXT PRIMARY KEY,
    bill_id   TEXT NOT NULL UNIQUE REFERENCES bills(id) ON DELETE CASCADE,
    committee TEXT NOT NULL,
    date      TEXT NOT NULL,
    time      TEXT NOT NULL,
    location  TEXT NOT NULL
);

-- Docket history
CREATE TABLE IF NOT EXISTS docket_entries (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    bill_id TEXT NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
    date    TEXT NOT NULL,
    chamber TEXT NOT NULL,
    action  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_docket_entries_bill ON docket_entries(bill_id, date);

-- Full-text search on bills
CREATE VIRTUAL TABLE IF NOT EXISTS bills_fts USING fts5(
    number,
    summary,
    full_text,
    content=bills,
    content_rowid=rowid
);

-- Triggers to keep FTS in sync with bills table
CREATE TRIGGER IF NOT EXISTS bills_fts_insert AFTER INSERT ON bills BEGIN
    INSERT INTO bills_fts(rowid, number, summary, full_text)
    VALUES (new.rowid, new.number, new.summary, new.full_text);
END;

CREATE TRIGGER IF NOT EXISTS bills_fts_delete AFTER DELETE ON bills BEGIN
    INSERT INTO bills_fts(bills_fts, rowid, number, summary, full_text)
    VALUES ('delete', old.rowid, old.number, old.summary, old.full_text);
END;

CREATE TRIGGER IF NOT EXISTS bills_fts_update AFTER UPDATE ON bills BEGIN
    INSERT INTO bills_fts(bills_fts, rowid, number, summary, full_text)
    VALUES ('delete', old.rowid, old.number, old.summary, old.full_text);
    INSERT INTO bills_fts(rowid, number, summary, full_text)
    VALUES (new.rowid, new.number, new.summary, new.full_text);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
