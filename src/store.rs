//! Sample store boundary
//!
//! Fetching samples is the only asynchronous step in the estimation path.
//! Stores return records newest first, capped at the requested limit, from a
//! per-user namespace. Failures are returned as-is; nothing here retries.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StoreError};
use crate::samples::{FeatureRecord, SessionRecord};

const FEATURES: &str = "performance_features";
const SESSIONS: &str = "game_sessions";

/// Read access to a user's performance history
#[allow(async_fn_in_trait)]
pub trait SampleStore {
    /// Up to `limit` feature records, newest first
    async fn fetch_features(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<FeatureRecord>, StoreError>;

    /// Up to `limit` raw game sessions, newest first
    async fn fetch_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SessionRecord>, StoreError>;
}

/// Both collections for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSamples {
    #[serde(default)]
    pub features: Vec<FeatureRecord>,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

/// In-memory store, also loadable from a JSON file keyed by user id
#[derive(Debug, Clone, Default)]
pub struct MemorySampleStore {
    users: HashMap<String, UserSamples>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "<userId>": { "features": [...], "sessions": [...] } }`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let users: HashMap<String, UserSamples> = serde_json::from_str(&content)?;
        Ok(Self { users })
    }

    pub fn insert_feature(&mut self, user_id: &str, record: FeatureRecord) {
        self.users.entry(user_id.to_string()).or_default().features.push(record);
    }

    pub fn insert_session(&mut self, user_id: &str, record: SessionRecord) {
        self.users.entry(user_id.to_string()).or_default().sessions.push(record);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl SampleStore for MemorySampleStore {
    async fn fetch_features(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<FeatureRecord>, StoreError> {
        let mut records = self
            .users
            .get(user_id)
            .map(|u| u.features.clone())
            .unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn fetch_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SessionRecord>, StoreError> {
        let mut records = self
            .users
            .get(user_id)
            .map(|u| u.sessions.clone())
            .unwrap_or_default();
        // Sessions without any timestamp sort last
        records.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
        records.truncate(limit);
        Ok(records)
    }
}

/// SQLite-backed store
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
}

impl SqliteSampleStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> std::result::Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| StoreError::Unavailable {
            reason: format!("{}: {}", db_path.as_ref().display(), e),
        })?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> std::result::Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> std::result::Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connection(&self) -> std::result::Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Unavailable {
            reason: "connection lock poisoned".to_string(),
        })
    }

    /// Initialize tables and indexes
    fn init_schema(&self) -> std::result::Result<(), StoreError> {
        let conn = self.connection()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS performance_features (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                rt_z REAL,
                time_of_day_hour INTEGER,
                mins_since_last_meal REAL,
                last_meal_type TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                timestamp TEXT,
                game_start_at TEXT,
                rt_median_ms REAL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_features_user_created ON performance_features (user_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON game_sessions (user_id)",
            [],
        )?;

        Ok(())
    }

    pub fn insert_feature(&self, user_id: &str, record: &FeatureRecord) -> std::result::Result<(), StoreError> {
        self.connection()?.execute(
            r#"
            INSERT INTO performance_features (
                user_id, created_at, rt_z, time_of_day_hour, mins_since_last_meal, last_meal_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id,
                encode_time(record.created_at),
                record.rt_z,
                record.time_of_day_hour,
                record.mins_since_last_meal,
                record.last_meal_type,
            ],
        )?;
        Ok(())
    }

    pub fn insert_session(&self, user_id: &str, record: &SessionRecord) -> std::result::Result<(), StoreError> {
        self.connection()?.execute(
            r#"
            INSERT INTO game_sessions (user_id, timestamp, game_start_at, rt_median_ms)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                user_id,
                record.timestamp.map(encode_time),
                record.game_start_at.map(encode_time),
                record.rt_median_ms,
            ],
        )?;
        Ok(())
    }

    fn query_features(&self, user_id: &str, limit: usize) -> std::result::Result<Vec<FeatureRecord>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT created_at, rt_z, time_of_day_hour, mins_since_last_meal, last_meal_type
            FROM performance_features
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, sql_limit(limit)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (created_at, rt_z, time_of_day_hour, mins_since_last_meal, last_meal_type) = row?;
            records.push(FeatureRecord {
                created_at: decode_time(FEATURES, &created_at)?,
                rt_z,
                time_of_day_hour,
                mins_since_last_meal,
                last_meal_type,
            });
        }
        Ok(records)
    }

    fn query_sessions(&self, user_id: &str, limit: usize) -> std::result::Result<Vec<SessionRecord>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp, game_start_at, rt_median_ms
            FROM game_sessions
            WHERE user_id = ?1
            ORDER BY COALESCE(timestamp, game_start_at) DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, sql_limit(limit)], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (timestamp, game_start_at, rt_median_ms) = row?;
            records.push(SessionRecord {
                timestamp: timestamp.map(|t| decode_time(SESSIONS, &t)).transpose()?,
                game_start_at: game_start_at.map(|t| decode_time(SESSIONS, &t)).transpose()?,
                rt_median_ms,
            });
        }
        Ok(records)
    }
}

impl SampleStore for SqliteSampleStore {
    async fn fetch_features(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<FeatureRecord>, StoreError> {
        self.query_features(user_id, limit)
    }

    async fn fetch_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SessionRecord>, StoreError> {
        self.query_sessions(user_id, limit)
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// Fixed-width UTC text keeps ORDER BY chronological.
fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_time(collection: &str, raw: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRecord {
            collection: collection.to_string(),
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}
