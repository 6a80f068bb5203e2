use crate::record::SessionRecord;
use crate::scoring::VariantId;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Opaque handle to a saved record.
pub type StorageKey = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only persistence for completed sessions, plus the per-variant
/// completion flags that drive battery progress.
///
/// `save` never overwrites: every session becomes a new row, and history
/// queries return the full trail. The completion flag is a separate signal
/// so progress survives even if an individual record is later pruned.
pub trait SessionStore {
    fn save(&mut self, record: &SessionRecord) -> Result<StorageKey, StoreError>;

    /// Most recently saved record for this participant and variant.
    fn latest(
        &self,
        username: &str,
        variant: VariantId,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Every saved record for this participant and variant, oldest first.
    fn all(&self, username: &str, variant: VariantId) -> Result<Vec<SessionRecord>, StoreError>;

    fn set_completed(&mut self, username: &str, variant: VariantId) -> Result<(), StoreError>;

    fn completed(&self, username: &str, variant: VariantId) -> Result<bool, StoreError>;

    /// Persist a finished session: the record and the completion flag in
    /// one call, so the two signals cannot drift apart.
    fn record_session(&mut self, record: &SessionRecord) -> Result<StorageKey, StoreError> {
        let key = self.save(record)?;
        self.set_completed(&record.username, record.variant)?;
        Ok(key)
    }
}

/// In-memory store, for tests and embedding layers that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<SessionRecord>,
    flags: HashSet<(String, VariantId)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn save(&mut self, record: &SessionRecord) -> Result<StorageKey, StoreError> {
        self.records.push(record.clone());
        Ok(self.records.len() as StorageKey)
    }

    fn latest(
        &self,
        username: &str,
        variant: VariantId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .rev()
            .find(|r| r.username == username && r.variant == variant)
            .cloned())
    }

    fn all(&self, username: &str, variant: VariantId) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.username == username && r.variant == variant)
            .cloned()
            .collect())
    }

    fn set_completed(&mut self, username: &str, variant: VariantId) -> Result<(), StoreError> {
        self.flags.insert((username.to_string(), variant));
        Ok(())
    }

    fn completed(&self, username: &str, variant: VariantId) -> Result<bool, StoreError> {
        Ok(self.flags.contains(&(username.to_string(), variant)))
    }
}

/// SQLite-backed store. Records are kept as JSON payloads keyed by
/// participant and variant slug; the schema never needs to change when a
/// variant grows a new metric.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at the default path under
    /// `$HOME/.local/state/tremo`.
    pub fn new() -> Result<Self, StoreError> {
        let db_path = Self::default_path().unwrap_or_else(|| PathBuf::from("tremo_sessions.db"));
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&db_path)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                variant TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_records_user_variant
             ON session_records(username, variant)",
            [],
        )?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS completion_flags (
                username TEXT NOT NULL,
                variant TEXT NOT NULL,
                PRIMARY KEY (username, variant)
            )
            "#,
            [],
        )?;
        Ok(SqliteStore { conn })
    }

    /// Database location under `$HOME/.local/state/tremo`, falling back to
    /// the platform data directory.
    fn default_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("tremo");
            Some(state_dir.join("sessions.db"))
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", "tremo") {
            Some(proj_dirs.data_local_dir().join("sessions.db"))
        } else {
            None
        }
    }
}

impl SessionStore for SqliteStore {
    fn save(&mut self, record: &SessionRecord) -> Result<StorageKey, StoreError> {
        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO session_records (username, variant, saved_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.username,
                record.variant.slug(),
                chrono::Local::now().to_rfc3339(),
                payload,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest(
        &self,
        username: &str,
        variant: VariantId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM session_records
                 WHERE username = ?1 AND variant = ?2
                 ORDER BY id DESC LIMIT 1",
                params![username, variant.slug()],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn all(&self, username: &str, variant: VariantId) -> Result<Vec<SessionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM session_records
             WHERE username = ?1 AND variant = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![username, variant.slug()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn set_completed(&mut self, username: &str, variant: VariantId) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO completion_flags (username, variant) VALUES (?1, ?2)",
            params![username, variant.slug()],
        )?;
        Ok(())
    }

    fn completed(&self, username: &str, variant: VariantId) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM completion_flags WHERE username = ?1 AND variant = ?2",
                params![username, variant.slug()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metrics;
    use chrono::{Local, TimeZone};

    fn sample(username: &str, variant: VariantId, total_presses: u64) -> SessionRecord {
        SessionRecord {
            variant,
            username: username.to_string(),
            started_at: Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 22).unwrap(),
            total_time_ms: 15_000,
            target_text: None,
            final_text: "kkk".to_string(),
            metrics: Metrics {
                total_presses,
                correct_presses: total_presses,
                incorrect_presses: 0,
                accuracy_pct: 100.0,
                speed_per_sec: total_presses as f64 / 15.0,
                ..Metrics::default()
            },
            events: vec![],
            expected_times: None,
        }
    }

    fn check_store(store: &mut impl SessionStore) {
        let user = "ana";
        assert!(!store.completed(user, VariantId::FreeCount).unwrap());
        assert!(store.latest(user, VariantId::FreeCount).unwrap().is_none());

        store
            .record_session(&sample(user, VariantId::FreeCount, 3))
            .unwrap();
        store
            .record_session(&sample(user, VariantId::FreeCount, 7))
            .unwrap();

        // append-only: both sessions survive, newest wins for latest()
        let history = store.all(user, VariantId::FreeCount).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].metrics.total_presses, 3);
        let latest = store.latest(user, VariantId::FreeCount).unwrap().unwrap();
        assert_eq!(latest.metrics.total_presses, 7);

        assert!(store.completed(user, VariantId::FreeCount).unwrap());
        // scoped per participant and per variant
        assert!(!store.completed(user, VariantId::Rhythm).unwrap());
        assert!(!store.completed("luis", VariantId::FreeCount).unwrap());
        assert!(store.latest("luis", VariantId::FreeCount).unwrap().is_none());
    }

    #[test]
    fn memory_store_contract() {
        check_store(&mut MemoryStore::new());
    }

    #[test]
    fn sqlite_store_contract() {
        check_store(&mut SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn sqlite_roundtrips_the_full_record() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let record = sample("ana", VariantId::FreeCount, 5);
        store.save(&record).unwrap();
        let back = store.latest("ana", VariantId::FreeCount).unwrap().unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn set_completed_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.set_completed("ana", VariantId::DualTask).unwrap();
        store.set_completed("ana", VariantId::DualTask).unwrap();
        assert!(store.completed("ana", VariantId::DualTask).unwrap());
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .record_session(&sample("ana", VariantId::Rhythm, 9))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.completed("ana", VariantId::Rhythm).unwrap());
        let back = store.latest("ana", VariantId::Rhythm).unwrap().unwrap();
        assert_eq!(back.metrics.total_presses, 9);
    }
}
