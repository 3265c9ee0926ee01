use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{OnboardingRecord, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The requested change is not allowed in the record's current state.
    #[error("{0}")]
    Conflict(String),
}

/// Mutation applied under the store's lock. Returning an error leaves the
/// stored record untouched.
pub type RecordUpdate<'a> = &'a mut dyn FnMut(&mut OnboardingRecord) -> Result<(), StoreError>;

/// Key-value persistence for onboarding records, keyed by user id.
pub trait OnboardingStore: Send + Sync {
    fn get(&self, user_id: &UserId) -> Result<Option<OnboardingRecord>, StoreError>;

    /// Inserts or replaces the user's record; assigns an id on first write.
    fn put(&self, record: OnboardingRecord) -> Result<OnboardingRecord, StoreError>;

    fn list(&self) -> Result<Vec<OnboardingRecord>, StoreError>;

    /// Read-modify-write for one user, creating the record if it does not exist yet.
    fn update(&self, user_id: &UserId, apply: RecordUpdate<'_>) -> Result<OnboardingRecord, StoreError>;
}

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<UserId, OnboardingRecord>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self, record: &mut OnboardingRecord) {
        if record.id.is_none() {
            record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }
    }
}

impl OnboardingStore for InMemoryStore {
    fn get(&self, user_id: &UserId) -> Result<Option<OnboardingRecord>, StoreError> {
        Ok(self.records.read().get(user_id).cloned())
    }

    fn put(&self, mut record: OnboardingRecord) -> Result<OnboardingRecord, StoreError> {
        let mut records = self.records.write();
        if record.id.is_none() {
            record.id = records.get(&record.user_id).and_then(|existing| existing.id);
        }
        self.assign_id(&mut record);
        records.insert(record.user_id.clone(), record.clone());
        Ok(record)
    }

    fn list(&self) -> Result<Vec<OnboardingRecord>, StoreError> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn update(&self, user_id: &UserId, apply: RecordUpdate<'_>) -> Result<OnboardingRecord, StoreError> {
        let mut records = self.records.write();
        let mut record = records
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| OnboardingRecord::new(user_id.clone()));

        apply(&mut record)?;
        record.updated_at = Utc::now();
        self.assign_id(&mut record);

        records.insert(user_id.clone(), record.clone());
        Ok(record)
    }
}

/// Records kept as JSON documents in SQLite; the row id is the record id.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        info!("Opening onboarding database at {}", path.as_ref().display());
        let conn = Connection::open(path).map_err(|e| {
            error!("Failed to open onboarding database: {}", e);
            StoreError::Database(e)
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS onboarding_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL UNIQUE,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        debug!("onboarding_records table ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load(conn: &Connection, user_id: &UserId) -> Result<Option<OnboardingRecord>, StoreError> {
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, record FROM onboarding_records WHERE user_id = ?1",
                params![user_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(id, json)| decode(id, &json)).transpose()
    }

    fn save(conn: &Connection, record: &OnboardingRecord) -> Result<OnboardingRecord, StoreError> {
        let json = serde_json::to_string(record)?;
        conn.execute(
            "INSERT INTO onboarding_records (user_id, record, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
            params![record.user_id.as_str(), json, record.updated_at.to_rfc3339()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM onboarding_records WHERE user_id = ?1",
            params![record.user_id.as_str()],
            |row| row.get(0),
        )?;

        let mut saved = record.clone();
        saved.id = Some(id as u64);
        Ok(saved)
    }
}

fn decode(id: i64, json: &str) -> Result<OnboardingRecord, StoreError> {
    let mut record: OnboardingRecord = serde_json::from_str(json)?;
    record.id = Some(id as u64);
    Ok(record)
}

impl OnboardingStore for SqliteStore {
    fn get(&self, user_id: &UserId) -> Result<Option<OnboardingRecord>, StoreError> {
        let conn = self.conn.lock();
        Self::load(&conn, user_id)
    }

    fn put(&self, record: OnboardingRecord) -> Result<OnboardingRecord, StoreError> {
        let conn = self.conn.lock();
        Self::save(&conn, &record)
    }

    fn list(&self) -> Result<Vec<OnboardingRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, record FROM onboarding_records ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, json) = row?;
            records.push(decode(id, &json)?);
        }
        Ok(records)
    }

    fn update(&self, user_id: &UserId, apply: RecordUpdate<'_>) -> Result<OnboardingRecord, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut record =
            Self::load(&tx, user_id)?.unwrap_or_else(|| OnboardingRecord::new(user_id.clone()));
        apply(&mut record)?;
        record.updated_at = Utc::now();

        let saved = Self::save(&tx, &record)?;
        tx.commit()?;
        Ok(saved)
    }
}
