//! Record and credential persistence.
//!
//! The storage handle is an explicitly constructed, cloneable object that
//! gets injected into the pipeline, the gate and the issuer; connection
//! sharing is an internal detail, never a process-wide singleton. SQLite
//! backs production; the in-memory store backs tests.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;
use crate::severity::SeverityLevel;
use crate::{Credential, ImageRecord};

/// Fields captured at upload time, before inference has run.
#[derive(Clone, Debug)]
pub struct NewImageRecord<'a> {
    pub filename: &'a str,
    pub filepath: &'a str,
    pub device_id: &'a str,
    pub uploaded_at_ms: i64,
}

/// The single follow-up mutation once inference completes.
#[derive(Clone, Debug)]
pub struct DetectionUpdate<'a> {
    pub labeled_filename: &'a str,
    pub labeled_filepath: &'a str,
    pub total_count: i64,
    pub severity: SeverityLevel,
}

pub trait RecordStore: Send {
    /// Inserts the upload-time fields, returns the generated record id.
    fn insert_record(&self, record: &NewImageRecord) -> Result<i64, StoreError>;

    /// Applies the post-inference update to an existing record.
    fn apply_detection_update(&self, id: i64, update: &DetectionUpdate)
        -> Result<(), StoreError>;

    /// All records in insertion order.
    fn list_records(&self) -> Result<Vec<ImageRecord>, StoreError>;

    fn get_record(&self, id: i64) -> Result<Option<ImageRecord>, StoreError>;
}

pub trait CredentialStore: Send {
    fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError>;

    fn find_credential(&self, token: &str) -> Result<Option<Credential>, StoreError>;
}

// -------------------- SQLite --------------------

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS images (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              filename TEXT NOT NULL,
              filepath TEXT NOT NULL,
              device_id TEXT NOT NULL,
              uploaded_at INTEGER NOT NULL,
              labeled_filename TEXT,
              labeled_filepath TEXT,
              total_count INTEGER,
              severity TEXT
            );

            CREATE TABLE IF NOT EXISTS credentials (
              token TEXT PRIMARY KEY,
              issued_at INTEGER NOT NULL,
              expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_images_device ON images(device_id);
            "#,
        )?;
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<ImageRecord, StoreError> {
    let severity_text: Option<String> = row.get(8)?;
    let severity = severity_text
        .map(|text| SeverityLevel::from_str(&text).map_err(StoreError::CorruptValue))
        .transpose()?;
    Ok(ImageRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        filepath: row.get(2)?,
        device_id: row.get(3)?,
        uploaded_at_ms: row.get(4)?,
        labeled_filename: row.get(5)?,
        labeled_filepath: row.get(6)?,
        total_count: row.get(7)?,
        severity,
    })
}

const RECORD_COLUMNS: &str = "id, filename, filepath, device_id, uploaded_at, \
     labeled_filename, labeled_filepath, total_count, severity";

impl RecordStore for SqliteStore {
    fn insert_record(&self, record: &NewImageRecord) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO images(filename, filepath, device_id, uploaded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.filename,
                record.filepath,
                record.device_id,
                record.uploaded_at_ms
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn apply_detection_update(
        &self,
        id: i64,
        update: &DetectionUpdate,
    ) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            r#"
            UPDATE images
            SET labeled_filename = ?2, labeled_filepath = ?3,
                total_count = ?4, severity = ?5
            WHERE id = ?1
            "#,
            params![
                id,
                update.labeled_filename,
                update.labeled_filepath,
                update.total_count,
                update.severity.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRecord(id));
        }
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM images ORDER BY id ASC"))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(record_from_row(row)?);
        }
        Ok(out)
    }

    fn get_record(&self, id: i64) -> Result<Option<ImageRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM images WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(record_from_row(row)?)),
            None => Ok(None),
        }
    }
}

impl CredentialStore for SqliteStore {
    fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.conn()?.execute(
            r#"
            INSERT INTO credentials(token, issued_at, expires_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![
                credential.token,
                credential.issued_at_ms,
                credential.expires_at_ms
            ],
        )?;
        Ok(())
    }

    fn find_credential(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT token, issued_at, expires_at FROM credentials WHERE token = ?1",
                params![token],
                |row| {
                    Ok(Credential {
                        token: row.get(0)?,
                        issued_at_ms: row.get(1)?,
                        expires_at_ms: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }
}

// -------------------- In-memory --------------------

#[derive(Debug)]
struct MemInner {
    records: Vec<ImageRecord>,
    credentials: HashMap<String, Credential>,
    next_id: i64,
}

impl Default for MemInner {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            credentials: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Cloneable in-memory counterpart of [`SqliteStore`]; clones share state,
/// which is what gives tests the same read-your-writes behavior.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<MemInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, MemInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for InMemoryStore {
    fn insert_record(&self, record: &NewImageRecord) -> Result<i64, StoreError> {
        let mut inner = self.inner()?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.records.push(ImageRecord {
            id,
            filename: record.filename.to_string(),
            filepath: record.filepath.to_string(),
            device_id: record.device_id.to_string(),
            uploaded_at_ms: record.uploaded_at_ms,
            labeled_filename: None,
            labeled_filepath: None,
            total_count: None,
            severity: None,
        });
        Ok(id)
    }

    fn apply_detection_update(
        &self,
        id: i64,
        update: &DetectionUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::MissingRecord(id))?;
        record.labeled_filename = Some(update.labeled_filename.to_string());
        record.labeled_filepath = Some(update.labeled_filepath.to_string());
        record.total_count = Some(update.total_count);
        record.severity = Some(update.severity);
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(self.inner()?.records.clone())
    }

    fn get_record(&self, id: i64) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.inner()?.records.iter().find(|r| r.id == id).cloned())
    }
}

impl CredentialStore for InMemoryStore {
    fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        // mirror the SQLite primary-key constraint
        if inner.credentials.contains_key(&credential.token) {
            return Err(StoreError::DuplicateToken);
        }
        inner
            .credentials
            .insert(credential.token.clone(), credential.clone());
        Ok(())
    }

    fn find_credential(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.inner()?.credentials.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new<'a>() -> NewImageRecord<'a> {
        NewImageRecord {
            filename: "abc.jpg",
            filepath: "images/abc.jpg",
            device_id: "dev-1",
            uploaded_at_ms: 1_700_000_000_000,
        }
    }

    fn check_lifecycle(store: &(impl RecordStore + CredentialStore)) {
        let id = store.insert_record(&sample_new()).unwrap();
        let partial = store.get_record(id).unwrap().unwrap();
        assert_eq!(partial.device_id, "dev-1");
        assert_eq!(partial.labeled_filename, None);
        assert_eq!(partial.total_count, None);
        assert_eq!(partial.severity, None);

        store
            .apply_detection_update(
                id,
                &DetectionUpdate {
                    labeled_filename: "labeled_1.jpg",
                    labeled_filepath: "labeled/labeled_1.jpg",
                    total_count: 3,
                    severity: SeverityLevel::Medium,
                },
            )
            .unwrap();
        let full = store.get_record(id).unwrap().unwrap();
        assert_eq!(full.total_count, Some(3));
        assert_eq!(full.severity, Some(SeverityLevel::Medium));
        assert_eq!(full.labeled_filename.as_deref(), Some("labeled_1.jpg"));

        assert!(matches!(
            store.apply_detection_update(
                9999,
                &DetectionUpdate {
                    labeled_filename: "x.jpg",
                    labeled_filepath: "labeled/x.jpg",
                    total_count: 0,
                    severity: SeverityLevel::Low,
                }
            ),
            Err(StoreError::MissingRecord(9999))
        ));

        let cred = Credential {
            token: "deadbeef".to_string(),
            issued_at_ms: 1,
            expires_at_ms: 2,
        };
        store.insert_credential(&cred).unwrap();
        assert_eq!(
            store.find_credential("deadbeef").unwrap(),
            Some(cred.clone())
        );
        assert_eq!(store.find_credential("other").unwrap(), None);

        // both backends reject a re-used token
        assert!(store.insert_credential(&cred).is_err());
        assert_eq!(store.find_credential("deadbeef").unwrap(), Some(cred));
    }

    #[test]
    fn sqlite_record_lifecycle() {
        let store = SqliteStore::open(":memory:").unwrap();
        check_lifecycle(&store);
        assert_eq!(store.list_records().unwrap().len(), 1);
    }

    #[test]
    fn in_memory_record_lifecycle() {
        let store = InMemoryStore::new();
        check_lifecycle(&store);
        assert_eq!(store.list_records().unwrap().len(), 1);
    }

    #[test]
    fn cloned_handles_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.insert_record(&sample_new()).unwrap();
        assert_eq!(other.list_records().unwrap().len(), 1);

        let sqlite = SqliteStore::open(":memory:").unwrap();
        let sqlite_clone = sqlite.clone();
        sqlite.insert_record(&sample_new()).unwrap();
        assert_eq!(sqlite_clone.list_records().unwrap().len(), 1);
    }

    #[test]
    fn record_ids_are_distinct_and_sequential() {
        let store = SqliteStore::open(":memory:").unwrap();
        let a = store.insert_record(&sample_new()).unwrap();
        let b = store.insert_record(&sample_new()).unwrap();
        assert_ne!(a, b);
        let listed: Vec<i64> = store
            .list_records()
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, vec![a, b]);
    }
}
