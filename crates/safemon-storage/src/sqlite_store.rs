use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use safemon_common::types::{
    normalize_hostname, Category, Domain, DomainStats, RecentScan, ScanVerdict, ThreatMatch,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, StorageError};
use crate::{is_valid_color, DomainRegistry, ScanLease, ScanResultStore, DEFAULT_CATEGORY_COLOR};

const CATEGORIES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE UNIQUE,
    color TEXT NOT NULL DEFAULT '#6b7280',
    created_at INTEGER NOT NULL
);
";

const DOMAINS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domains (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 1,
    category_id TEXT REFERENCES categories(id),
    notes TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_domains_active ON domains(is_active);
CREATE INDEX IF NOT EXISTS idx_domains_category ON domains(category_id);
";

const SCAN_RESULTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_results (
    id TEXT PRIMARY KEY,
    domain_id TEXT NOT NULL REFERENCES domains(id),
    scanned_at INTEGER NOT NULL,
    is_safe INTEGER NOT NULL,
    threats TEXT NOT NULL,
    raw_response TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scan_results_domain_time ON scan_results(domain_id, scanned_at);
CREATE INDEX IF NOT EXISTS idx_scan_results_scanned_at ON scan_results(scanned_at);
CREATE TRIGGER IF NOT EXISTS scan_results_no_update BEFORE UPDATE ON scan_results
BEGIN
    SELECT RAISE(ABORT, 'scan_results is append-only');
END;
CREATE TRIGGER IF NOT EXISTS scan_results_no_delete BEFORE DELETE ON scan_results
BEGIN
    SELECT RAISE(ABORT, 'scan_results is append-only');
END;
";

const SCAN_LEASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
";

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DOMAIN_COLUMNS: &str =
    "d.id, d.domain, d.is_active, d.category_id, c.name, d.notes, d.created_at, d.updated_at";

/// Orders verdicts newest first; ids are decimal Snowflakes compared numerically.
const LATEST_FIRST: &str = "scanned_at DESC, CAST(id AS INTEGER) DESC";

/// SQLite-backed [`DomainRegistry`] and [`ScanResultStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("safemon.db");
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(CATEGORIES_SCHEMA)?;
        conn.execute_batch(DOMAINS_SCHEMA)?;
        conn.execute_batch(SCAN_RESULTS_SCHEMA)?;
        conn.execute_batch(SCAN_LEASE_SCHEMA)?;

        tracing::info!(path = %db_path.display(), "Initialized safemon store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn category_by_id(conn: &Connection, id: &str) -> Result<Option<Category>> {
        let category = conn
            .query_row(
                "SELECT id, name, color, created_at FROM categories WHERE id = ?1",
                rusqlite::params![id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    fn category_name_taken(conn: &Connection, name: &str, except_id: Option<&str>) -> Result<bool> {
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM categories WHERE name = ?1 AND id != ?2",
            rusqlite::params![name, except_id.unwrap_or("")],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    fn row_to_domain(row: &rusqlite::Row<'_>) -> rusqlite::Result<Domain> {
        let created_ms: i64 = row.get(6)?;
        let updated_ms: i64 = row.get(7)?;
        Ok(Domain {
            id: row.get(0)?,
            domain: row.get(1)?,
            is_active: row.get(2)?,
            category_id: row.get(3)?,
            category_name: row.get(4)?,
            notes: row.get(5)?,
            created_at: from_millis(created_ms),
            updated_at: from_millis(updated_ms),
        })
    }

    fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        let created_ms: i64 = row.get(3)?;
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            created_at: from_millis(created_ms),
        })
    }

    fn insert_verdict(conn: &Connection, verdict: &ScanVerdict) -> Result<()> {
        let threats_json = serde_json::to_string(&verdict.threats)?;
        let raw_json = serde_json::to_string(&verdict.raw_response)?;
        conn.prepare_cached(
            "INSERT INTO scan_results (id, domain_id, scanned_at, is_safe, threats, raw_response)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(rusqlite::params![
            verdict.id,
            verdict.domain_id,
            verdict.scanned_at.timestamp_millis(),
            verdict.is_safe,
            threats_json,
            raw_json,
        ])?;
        Ok(())
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn validated_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::Invalid("category name must not be empty".into()));
    }
    Ok(name)
}

fn validated_color(color: &str) -> Result<&str> {
    if !is_valid_color(color) {
        return Err(StorageError::Invalid(format!(
            "invalid color '{color}', expected #RGB or #RRGGBB"
        )));
    }
    Ok(color)
}

impl DomainRegistry for SqliteStore {
    fn add_category(&self, name: &str, color: Option<&str>) -> Result<Category> {
        let name = validated_name(name)?;
        let color = validated_color(color.unwrap_or(DEFAULT_CATEGORY_COLOR))?;
        let conn = self.conn();
        if Self::category_name_taken(&conn, name, None)? {
            return Err(StorageError::Invalid(format!("category '{name}' already exists")));
        }

        let id = safemon_common::id::next_id();
        conn.execute(
            "INSERT INTO categories (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, color, Utc::now().timestamp_millis()],
        )?;
        Self::category_by_id(&conn, &id)?.ok_or(StorageError::NotFound {
            entity: "category",
            id,
        })
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, color, created_at FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], Self::row_to_category)?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        if name.is_none() && color.is_none() {
            return Err(StorageError::Invalid("no fields to update".into()));
        }
        let name = name.map(validated_name).transpose()?;
        let color = color.map(validated_color).transpose()?;

        let conn = self.conn();
        let existing = Self::category_by_id(&conn, id)?.ok_or_else(|| StorageError::NotFound {
            entity: "category",
            id: id.to_string(),
        })?;
        if let Some(n) = name {
            if Self::category_name_taken(&conn, n, Some(id))? {
                return Err(StorageError::Invalid(format!("category '{n}' already exists")));
            }
        }

        conn.execute(
            "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3",
            rusqlite::params![
                name.unwrap_or(&existing.name),
                color.unwrap_or(&existing.color),
                id
            ],
        )?;
        Self::category_by_id(&conn, id)?.ok_or_else(|| StorageError::NotFound {
            entity: "category",
            id: id.to_string(),
        })
    }

    fn delete_category(&self, id: &str) -> Result<u64> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        if Self::category_by_id(&tx, id)?.is_none() {
            return Err(StorageError::NotFound {
                entity: "category",
                id: id.to_string(),
            });
        }
        let active_assigned: i64 = tx.query_row(
            "SELECT COUNT(*) FROM domains WHERE category_id = ?1 AND is_active = 1",
            rusqlite::params![id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE domains SET category_id = NULL, updated_at = ?1 WHERE category_id = ?2",
            rusqlite::params![Utc::now().timestamp_millis(), id],
        )?;
        tx.execute("DELETE FROM categories WHERE id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        tracing::info!(category_id = %id, unassigned = active_assigned, "Deleted category");
        Ok(active_assigned as u64)
    }

    fn add_domain(&self, hostname: &str, notes: &str, category_id: Option<&str>) -> Result<Domain> {
        let domain = normalize_hostname(hostname);
        if domain.is_empty() {
            return Err(StorageError::Invalid("domain must not be empty".into()));
        }

        {
            let conn = self.conn();
            if let Some(cid) = category_id {
                if Self::category_by_id(&conn, cid)?.is_none() {
                    return Err(StorageError::NotFound {
                        entity: "category",
                        id: cid.to_string(),
                    });
                }
            }
            let now = Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO domains (id, domain, is_active, category_id, notes, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)
                 ON CONFLICT(domain) DO UPDATE SET
                     is_active = 1,
                     category_id = excluded.category_id,
                     notes = excluded.notes,
                     updated_at = excluded.updated_at",
                rusqlite::params![safemon_common::id::next_id(), domain, category_id, notes, now],
            )?;
        }

        tracing::info!(domain = %domain, "Domain registered");
        self.get_domain_by_name(&domain)?
            .ok_or(StorageError::NotFound {
                entity: "domain",
                id: domain,
            })
    }

    fn deactivate_domain(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE domains SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().timestamp_millis(), id],
        )?;
        Ok(updated > 0)
    }

    fn get_domain_by_name(&self, hostname: &str) -> Result<Option<Domain>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains d LEFT JOIN categories c ON c.id = d.category_id WHERE d.domain = ?1"
        );
        let domain = conn
            .query_row(&sql, rusqlite::params![normalize_hostname(hostname)], Self::row_to_domain)
            .optional()?;
        Ok(domain)
    }

    fn list_active(&self) -> Result<Vec<Domain>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains d LEFT JOIN categories c ON c.id = d.category_id
             WHERE d.is_active = 1
             ORDER BY c.name IS NULL, c.name, d.domain"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_domain)?;
        let mut domains = Vec::new();
        for row in rows {
            domains.push(row?);
        }
        Ok(domains)
    }
}

impl ScanResultStore for SqliteStore {
    fn append_verdict(&self, verdict: &ScanVerdict) -> Result<()> {
        let conn = self.conn();
        Self::insert_verdict(&conn, verdict)
    }

    fn append_verdicts(&self, verdicts: &[ScanVerdict]) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        for verdict in verdicts {
            Self::insert_verdict(&tx, verdict)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn most_recent_verdict(&self, domain_id: &str) -> Result<Option<ScanVerdict>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT id, domain_id, scanned_at, is_safe, threats, raw_response FROM scan_results
             WHERE domain_id = ?1 ORDER BY {LATEST_FIRST} LIMIT 1"
        );
        let row = conn
            .query_row(&sql, rusqlite::params![domain_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()?;

        let Some((id, domain_id, scanned_ms, is_safe, threats, raw)) = row else {
            return Ok(None);
        };
        Ok(Some(ScanVerdict {
            id,
            domain_id,
            scanned_at: from_millis(scanned_ms),
            is_safe,
            threats: serde_json::from_str::<Vec<ThreatMatch>>(&threats)?,
            raw_response: serde_json::from_str(&raw)?,
        }))
    }

    fn recent_scans(&self, limit: usize) -> Result<Vec<RecentScan>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT d.domain, r.scanned_at, r.is_safe, r.threats
             FROM scan_results r JOIN domains d ON d.id = r.domain_id
             ORDER BY r.scanned_at DESC, CAST(r.id AS INTEGER) DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut scans = Vec::new();
        for row in rows {
            let (domain, scanned_ms, is_safe, threats) = row?;
            let threats: Vec<ThreatMatch> = serde_json::from_str(&threats)?;
            scans.push(RecentScan {
                domain,
                scanned_at: from_millis(scanned_ms),
                is_safe,
                threat_types: threats.into_iter().map(|t| t.threat_type).collect(),
            });
        }
        Ok(scans)
    }

    fn domain_stats(&self) -> Result<DomainStats> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT (SELECT r.is_safe FROM scan_results r WHERE r.domain_id = d.id
                     ORDER BY r.scanned_at DESC, CAST(r.id AS INTEGER) DESC LIMIT 1)
             FROM domains d WHERE d.is_active = 1",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<bool>>(0))?;

        let mut stats = DomainStats::default();
        for row in rows {
            stats.total_domains += 1;
            match row? {
                Some(true) => stats.safe_domains += 1,
                Some(false) => stats.flagged_domains += 1,
                None => stats.unscanned_domains += 1,
            }
        }
        Ok(stats)
    }
}

impl ScanLease for SqliteStore {
    fn try_acquire_scan_lease(&self, holder: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn();
        // Read and claim under one write lock.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().timestamp_millis();
        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT holder, expires_at FROM scan_lease WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((owner, expires_at)) = current {
            if owner != holder && expires_at > now {
                tracing::debug!(owner = %owner, "Scan lease held elsewhere");
                return Ok(false);
            }
        }

        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        tx.execute(
            "INSERT INTO scan_lease (id, holder, acquired_at, expires_at) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 holder = excluded.holder,
                 acquired_at = excluded.acquired_at,
                 expires_at = excluded.expires_at",
            rusqlite::params![holder, now, now.saturating_add(ttl_ms)],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn release_scan_lease(&self, holder: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM scan_lease WHERE id = 1 AND holder = ?1",
            rusqlite::params![holder],
        )?;
        Ok(())
    }
}
