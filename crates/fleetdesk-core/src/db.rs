//! SQLite-backed store.
//!
//! One [`Store`] owns one connection behind a mutex. Domain modules take a
//! `&Connection` so the same function runs inside or outside a transaction
//! (`Transaction` derefs to `Connection`).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;

use crate::error::Result;

/// Bumped whenever `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    email       TEXT,
    mobile_no   TEXT,
    address     TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS company_users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'admin',
    device_token  TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS delivery_men (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    mobile_no     TEXT NOT NULL UNIQUE,
    email         TEXT UNIQUE,
    password_hash TEXT,
    photo_url     TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS company_delivery_man (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id       INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    delivery_man_id  INTEGER NOT NULL REFERENCES delivery_men(id) ON DELETE CASCADE,
    created_at       TEXT NOT NULL,
    UNIQUE (company_id, delivery_man_id)
);

CREATE TABLE IF NOT EXISTS customers (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id     INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    mobile_no      TEXT NOT NULL,
    email          TEXT,
    address        TEXT,
    customer_code  TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (company_id, mobile_no)
);

CREATE TABLE IF NOT EXISTS addresses (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    INTEGER REFERENCES companies(id) ON DELETE CASCADE,
    owner_kind    TEXT NOT NULL,
    owner_id      INTEGER NOT NULL,
    address_type  TEXT,
    label         TEXT,
    address       TEXT NOT NULL,
    latitude      REAL,
    longitude     REAL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS addresses_owner ON addresses (owner_kind, owner_id);
CREATE INDEX IF NOT EXISTS addresses_type ON addresses (address_type);

CREATE TABLE IF NOT EXISTS items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    code        TEXT,
    unit        TEXT,
    notes       TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (company_id, name)
);
CREATE UNIQUE INDEX IF NOT EXISTS items_company_code ON items (company_id, code) WHERE code IS NOT NULL;

CREATE TABLE IF NOT EXISTS deliveries (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    tracking_number         TEXT NOT NULL UNIQUE,
    company_id              INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    delivery_man_id         INTEGER REFERENCES delivery_men(id) ON DELETE SET NULL,
    customer_id             INTEGER NOT NULL REFERENCES customers(id),
    pickup_address_id       INTEGER,
    drop_address_id         INTEGER,
    pickup_label            TEXT,
    pickup_address          TEXT,
    pickup_latitude         REAL,
    pickup_longitude        REAL,
    drop_label              TEXT,
    drop_address            TEXT NOT NULL,
    drop_latitude           REAL,
    drop_longitude          REAL,
    delivery_notes          TEXT,
    delivery_type           TEXT,
    expected_delivery_time  TEXT,
    delivery_mode           TEXT,
    status                  TEXT NOT NULL DEFAULT 'pending',
    proof_notes             TEXT,
    proof_image_url         TEXT,
    assigned_at             TEXT,
    in_progress_at          TEXT,
    delivered_at            TEXT,
    amount                  REAL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,
    deleted_at              TEXT
);
CREATE INDEX IF NOT EXISTS deliveries_company_man ON deliveries (company_id, delivery_man_id);
CREATE INDEX IF NOT EXISTS deliveries_status ON deliveries (status);

CREATE TABLE IF NOT EXISTS delivery_items (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id   INTEGER NOT NULL,
    delivery_id  INTEGER NOT NULL REFERENCES deliveries(id) ON DELETE CASCADE,
    item_id      INTEGER NOT NULL REFERENCES items(id),
    quantity     INTEGER NOT NULL DEFAULT 1,
    notes        TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (delivery_id, item_id)
);

CREATE TABLE IF NOT EXISTS delivery_status_logs (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    delivery_id      INTEGER NOT NULL REFERENCES deliveries(id) ON DELETE CASCADE,
    status           TEXT NOT NULL,
    changed_by_id    INTEGER,
    changed_by_type  TEXT,
    remarks          TEXT,
    changed_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS status_logs_delivery ON delivery_status_logs (delivery_id);

CREATE TABLE IF NOT EXISTS company_activity_logs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    user_id       INTEGER REFERENCES company_users(id) ON DELETE SET NULL,
    action        TEXT NOT NULL,
    description   TEXT NOT NULL,
    subject_type  TEXT,
    subject_id    INTEGER,
    properties    TEXT,
    ip_address    TEXT,
    user_agent    TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS activity_company_created ON company_activity_logs (company_id, created_at);
CREATE INDEX IF NOT EXISTS activity_company_action ON company_activity_logs (company_id, action);

CREATE TABLE IF NOT EXISTS revoked_tokens (
    jti         TEXT PRIMARY KEY,
    expires_at  TEXT NOT NULL
);
"#;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves SQLite itself consistent; keep serving.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock();
        let v = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(v)
    }

    /// Run `f` against the connection outside any explicit transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction, committing only when it returns `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, req: PageRequest, total: u64) -> Self {
        let per_page = u64::from(req.per_page);
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            data,
            current_page: req.page,
            per_page: req.per_page,
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
        }
    }
}

// ---------------------------------------------------------------------------
// Revoked tokens
// ---------------------------------------------------------------------------

/// Remember a logged-out token id until the token would have expired anyway.
pub fn revoke_token(conn: &Connection, jti: &str, expires_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "DELETE FROM revoked_tokens WHERE expires_at < ?1",
        [Utc::now()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?1, ?2)",
        params![jti, expires_at],
    )?;
    Ok(())
}

pub fn is_token_revoked(conn: &Connection, jti: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?1",
        [jti],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// `%term%` for a LIKE filter, escaping the wildcard characters.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
