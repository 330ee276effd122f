//! Turso Embedded / libSQL storage layer for ingested bills.
//!
//! The [`Storage`] struct wraps a libSQL database holding bills, their
//! hearings and docket entries, and a full-text index over bill text.
//!
//! **Access rules:**
//! - Ingestion and backfill: read-write via [`Storage::open`]
//! - Query commands: read-only via [`Storage::open_readonly`]
//!
//! Batch writes ([`Storage::commit_bills`], [`Storage::commit_categories`])
//! run inside a single transaction: either every row lands or none does.

mod migrations;

use std::path::Path;

use billtracker_shared::{BillId, BillTrackerError, DocketEntry, Hearing, Result, StoredBill};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Column list matching [`row_to_bill`].
const BILL_COLUMNS: &str = "id, number, session_year, title, summary, sponsor, status, \
     full_text, html_link, category, docket_link, last_updated";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BillTrackerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BillTrackerError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BillTrackerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bill lookups
    // -----------------------------------------------------------------------

    /// Find a bill by number, without its hearing or docket.
    pub async fn find_bill_by_number(&self, number: &str) -> Result<Option<StoredBill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE number = ?1");
        let mut rows = self.conn.query(&sql, params![number]).await.map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_bill(&row)?)),
            None => Ok(None),
        }
    }

    /// Load a bill by number together with its next hearing and docket history.
    pub async fn get_bill(&self, number: &str) -> Result<Option<StoredBill>> {
        let Some(mut bill) = self.find_bill_by_number(number).await? else {
            return Ok(None);
        };
        let bill_id = bill.id.to_string();

        let mut rows = self
            .conn
            .query(
                "SELECT committee, date, time, location FROM hearings WHERE bill_id = ?1",
                params![bill_id.as_str()],
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            bill.next_hearing = Some(Hearing {
                committee: row.get::<String>(0).map_err(db_err)?,
                date: parse_date(&row.get::<String>(1).map_err(db_err)?)?,
                time: row.get::<String>(2).map_err(db_err)?,
                location: row.get::<String>(3).map_err(db_err)?,
            });
        }

        let mut rows = self
            .conn
            .query(
                "SELECT date, chamber, action FROM docket_entries
                 WHERE bill_id = ?1
                 ORDER BY date DESC, id DESC",
                params![bill_id.as_str()],
            )
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            bill.docket_entries.push(DocketEntry {
                date: parse_date(&row.get::<String>(0).map_err(db_err)?)?,
                chamber: row.get::<String>(1).map_err(db_err)?,
                action: row.get::<String>(2).map_err(db_err)?,
            });
        }

        Ok(Some(bill))
    }

    /// Most recently updated bills first.
    pub async fn list_recent(&self, limit: u32, offset: u32) -> Result<Vec<StoredBill>> {
        let sql = format!(
            "SELECT {BILL_COLUMNS} FROM bills
             ORDER BY last_updated DESC, number
             LIMIT ?1 OFFSET ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit, offset])
            .await
            .map_err(db_err)?;

        let mut bills = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            bills.push(row_to_bill(&row)?);
        }
        Ok(bills)
    }

    /// Bills that have never been assigned a category.
    pub async fn list_uncategorized(&self) -> Result<Vec<StoredBill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE category IS NULL ORDER BY number");
        let mut rows = self.conn.query(&sql, params![]).await.map_err(db_err)?;

        let mut bills = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            bills.push(row_to_bill(&row)?);
        }
        Ok(bills)
    }

    /// Total number of stored bills.
    pub async fn count_bills(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM bills", params![])
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }

    /// Number of bills per category, largest first. Uncategorized bills count under `None`.
    pub async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT category, COUNT(*) AS n FROM bills
                 GROUP BY category
                 ORDER BY n DESC, category",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut counts = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            counts.push(CategoryCount {
                category: row.get::<String>(0).ok(),
                count: row.get::<i64>(1).map_err(db_err)? as u64,
            });
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Batch writes
    // -----------------------------------------------------------------------

    /// Persist a reconciled batch in one transaction.
    ///
    /// `updates` must already exist (matched by id); `inserts` must not. Any
    /// failure rolls back the whole batch.
    pub async fn commit_bills(&self, inserts: &[StoredBill], updates: &[StoredBill]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let result = async {
            for bill in updates {
                update_bill(&tx, bill).await?;
            }
            for bill in inserts {
                insert_bill(&tx, bill).await?;
            }
            Ok::<_, BillTrackerError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await.map_err(db_err)?;
                debug!(inserted = inserts.len(), updated = updates.len(), "batch committed");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Assign categories to bills in one transaction.
    pub async fn commit_categories(&self, assignments: &[(BillId, String)]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let result = async {
            for (id, category) in assignments {
                tx.execute(
                    "UPDATE bills SET category = ?1 WHERE id = ?2",
                    params![category.as_str(), id.to_string()],
                )
                .await
                .map_err(db_err)?;
            }
            Ok::<_, BillTrackerError>(())
        }
        .await;

        match result {
            Ok(()) => tx.commit().await.map_err(db_err),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Hearings and docket
    // -----------------------------------------------------------------------

    /// Set (or replace) the upcoming hearing for a bill.
    pub async fn set_hearing(&self, bill_id: &BillId, hearing: &Hearing) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO hearings (id, bill_id, committee, date, time, location)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(bill_id) DO UPDATE SET
                     committee = excluded.committee,
                     date = excluded.date,
                     time = excluded.time,
                     location = excluded.location",
                params![
                    Uuid::now_v7().to_string(),
                    bill_id.to_string(),
                    hearing.committee.as_str(),
                    hearing.date.to_string(),
                    hearing.time.as_str(),
                    hearing.location.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Append an action to a bill's docket.
    pub async fn add_docket_entry(&self, bill_id: &BillId, entry: &DocketEntry) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO docket_entries (bill_id, date, chamber, action)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    bill_id.to_string(),
                    entry.date.to_string(),
                    entry.chamber.as_str(),
                    entry.action.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Search bills by number, summary and full text.
    ///
    /// A bill matches when `query` appears anywhere in one of those columns
    /// (case-insensitive for ASCII) or when the FTS index matches it as a
    /// phrase. FTS hits rank first. An empty query matches every bill, so the
    /// filters alone decide.
    pub async fn search_bills(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: u32,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        let category = filters.category.as_deref();
        let sponsor = filters.sponsor.as_deref().map(like_pattern);

        let queried = if query.is_empty() {
            self.conn
                .query(
                    "SELECT b.number, b.summary, b.category, NULL
                     FROM bills b
                     WHERE (?1 IS NULL OR b.category = ?1)
                       AND (?2 IS NULL OR b.sponsor LIKE ?2 ESCAPE '\\')
                     ORDER BY b.last_updated DESC
                     LIMIT ?3",
                    params![category, sponsor, limit],
                )
                .await
        } else {
            let phrase = format!("\"{}\"", query.replace('"', "\"\""));
            self.conn
                .query(
                    "SELECT b.number, b.summary, b.category, fts.rank
                     FROM bills b
                     LEFT JOIN (
                         SELECT rowid, rank FROM bills_fts WHERE bills_fts MATCH ?1
                     ) fts ON fts.rowid = b.rowid
                     WHERE (fts.rowid IS NOT NULL
                            OR b.number LIKE ?2 ESCAPE '\\'
                            OR b.summary LIKE ?2 ESCAPE '\\'
                            OR b.full_text LIKE ?2 ESCAPE '\\')
                       AND (?3 IS NULL OR b.category = ?3)
                       AND (?4 IS NULL OR b.sponsor LIKE ?4 ESCAPE '\\')
                     ORDER BY fts.rank IS NULL, fts.rank, b.last_updated DESC
                     LIMIT ?5",
                    params![phrase, like_pattern(query), category, sponsor, limit],
                )
                .await
        };
        let mut rows = queried.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(SearchResult {
                number: row.get::<String>(0).map_err(db_err)?,
                summary: row.get::<String>(1).map_err(db_err)?,
                category: row.get::<String>(2).ok(),
                score: row.get::<f64>(3).unwrap_or(0.0),
            });
        }
        Ok(results)
    }
}

/// Optional narrowing for [`Storage::search_bills`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Exact category label.
    pub category: Option<String>,
    /// Substring of the sponsor.
    pub sponsor: Option<String>,
}

/// A search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub number: String,
    pub summary: String,
    pub category: Option<String>,
    /// FTS5 rank (lower is better). Substring-only hits score 0.
    pub score: f64,
}

/// Bill count for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    /// `None` for bills not yet categorized.
    pub category: Option<String>,
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// `%value%` for a LIKE match, with the wildcards in `value` escaped.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn db_err(e: libsql::Error) -> BillTrackerError {
    BillTrackerError::Storage(e.to_string())
}

async fn insert_bill(conn: &Connection, bill: &StoredBill) -> Result<()> {
    conn.execute(
        "INSERT INTO bills (id, number, session_year, title, summary, sponsor, status,
                            full_text, html_link, category, docket_link, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            bill.id.to_string(),
            bill.number.as_str(),
            bill.session_year.as_str(),
            bill.title.as_deref(),
            bill.summary.as_str(),
            bill.sponsor.as_str(),
            bill.status.as_str(),
            bill.full_text.as_str(),
            bill.html_link.as_str(),
            bill.category.as_deref(),
            bill.docket_link.as_deref(),
            format_timestamp(&bill.last_updated)
        ],
    )
    .await
    .map_err(|e| BillTrackerError::Storage(format!("insert {}: {e}", bill.number)))?;
    Ok(())
}

async fn update_bill(conn: &Connection, bill: &StoredBill) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE bills SET number = ?2, session_year = ?3, title = ?4, summary = ?5,
                 sponsor = ?6, status = ?7, full_text = ?8, html_link = ?9, category = ?10,
                 docket_link = ?11, last_updated = ?12
             WHERE id = ?1",
            params![
                bill.id.to_string(),
                bill.number.as_str(),
                bill.session_year.as_str(),
                bill.title.as_deref(),
                bill.summary.as_str(),
                bill.sponsor.as_str(),
                bill.status.as_str(),
                bill.full_text.as_str(),
                bill.html_link.as_str(),
                bill.category.as_deref(),
                bill.docket_link.as_deref(),
                format_timestamp(&bill.last_updated)
            ],
        )
        .await
        .map_err(|e| BillTrackerError::Storage(format!("update {}: {e}", bill.number)))?;

    if changed == 0 {
        return Err(BillTrackerError::Storage(format!(
            "update {}: no stored bill with id {}",
            bill.number, bill.id
        )));
    }
    Ok(())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| BillTrackerError::Storage(format!("invalid date {s:?}: {e}")))
}

/// Convert a row selected with [`BILL_COLUMNS`] to a [`StoredBill`].
fn row_to_bill(row: &libsql::Row) -> Result<StoredBill> {
    let id: String = row.get(0).map_err(db_err)?;
    let last_updated: String = row.get(11).map_err(db_err)?;

    Ok(StoredBill {
        id: id
            .parse()
            .map_err(|e| BillTrackerError::Storage(format!("invalid bill id {id:?}: {e}")))?,
        number: row.get::<String>(1).map_err(db_err)?,
        session_year: row.get::<String>(2).map_err(db_err)?,
        title: row.get::<String>(3).ok(),
        summary: row.get::<String>(4).map_err(db_err)?,
        sponsor: row.get::<String>(5).map_err(db_err)?,
        status: row.get::<String>(6).map_err(db_err)?,
        full_text: row.get::<String>(7).map_err(db_err)?,
        html_link: row.get::<String>(8).map_err(db_err)?,
        category: row.get::<String>(9).ok(),
        docket_link: row.get::<String>(10).ok(),
        last_updated: DateTime::parse_from_rfc3339(&last_updated)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| BillTrackerError::Storage(format!("invalid date: {e}")))?,
        next_hearing: None,
        docket_entries: Vec::new(),
    })
}
