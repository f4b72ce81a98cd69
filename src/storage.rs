// 🗄️ Key-Value Storage - the flat persistence primitive under the store
//
// Two backends:
//   MemoryStorage - shared in-process region; each attach() is a sibling tab
//   SqliteStorage - single-table SQLite file shared across processes (WAL)

use crate::bus::{ChangeBus, ContextId, StorageEvent};
use crate::error::StorageError;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// TRAIT
// ============================================================================

/// Synchronous string-keyed store of text values.
///
/// `set` replaces the whole value for a key in one step; readers never see a
/// partial write.
pub trait KeyValueStore: Send + Sync {
    /// The execution context this handle writes as
    fn context(&self) -> ContextId;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn context(&self) -> ContextId {
        (**self).context()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// SHA-256 of a stored value, hex encoded
pub fn value_digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// MEMORY STORAGE
// ============================================================================

/// In-process storage region shared by every attached context.
///
/// Each `set` is announced on the region's [`ChangeBus`] tagged with the
/// writer's context, the way a browser raises `storage` events in sibling
/// tabs.
pub struct MemoryStorage {
    context: ContextId,
    region: Arc<Mutex<HashMap<String, String>>>,
    bus: ChangeBus,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Open a fresh empty region announcing writes on `bus`
    pub fn new(bus: ChangeBus) -> Self {
        MemoryStorage {
            context: ContextId::next(),
            region: Arc::new(Mutex::new(HashMap::new())),
            bus,
            quota: None,
        }
    }

    /// Limit every stored value to `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Open another context on the same region (a second tab)
    pub fn attach(&self) -> MemoryStorage {
        MemoryStorage {
            context: ContextId::next(),
            region: Arc::clone(&self.region),
            bus: self.bus.clone(),
            quota: self.quota,
        }
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Overwrite a value without announcing it, as if written by a process
    /// outside this bus.
    pub fn write_raw(&self, key: &str, value: &str) {
        self.region.lock().insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryStorage {
    fn context(&self) -> ContextId {
        self.context
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.region.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed: value.len(),
                    quota,
                });
            }
        }

        self.region.lock().insert(key.to_string(), value.to_string());

        // Region lock released before listeners run
        self.bus.publish(&StorageEvent {
            key: key.to_string(),
            new_value: Some(value.to_string()),
            origin: self.context,
        });
        Ok(())
    }
}

// ============================================================================
// SQLITE STORAGE
// ============================================================================

struct Seen {
    data_version: i64,
    digests: HashMap<String, String>,
}

/// Key-value table in a SQLite file.
///
/// Several processes (or several connections in one process) may open the
/// same file; each is its own context. Writes by other connections are found
/// with [`SqliteStorage::poll_changes`].
pub struct SqliteStorage {
    context: ContextId,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    seen: Mutex<Seen>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        setup_kv_table(&conn)?;

        let data_version = read_data_version(&conn)?;
        let digests = read_all(&conn)?
            .into_iter()
            .map(|(key, value)| {
                let digest = value_digest(&value);
                (key, digest)
            })
            .collect();

        Ok(SqliteStorage {
            context: ContextId::next(),
            path,
            conn: Mutex::new(conn),
            seen: Mutex::new(Seen {
                data_version,
                digests,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Report values changed by other connections since the last poll.
    ///
    /// Uses `PRAGMA data_version`, which only moves when a *different*
    /// connection commits, then compares digests to find the changed keys.
    /// Events carry a fresh foreign context so every local subscriber hears
    /// them.
    pub fn poll_changes(&self) -> Result<Vec<StorageEvent>, StorageError> {
        let conn = self.conn.lock();
        let version = read_data_version(&conn)?;

        let mut seen = self.seen.lock();
        if version == seen.data_version {
            return Ok(Vec::new());
        }
        seen.data_version = version;

        let origin = ContextId::next();
        let mut events = Vec::new();
        for (key, value) in read_all(&conn)? {
            let digest = value_digest(&value);
            if seen.digests.get(&key) == Some(&digest) {
                continue;
            }
            seen.digests.insert(key.clone(), digest);
            events.push(StorageEvent {
                key,
                new_value: Some(value),
                origin,
            });
        }
        Ok(events)
    }
}

impl KeyValueStore for SqliteStorage {
    fn context(&self) -> ContextId {
        self.context
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        // Our own commit doesn't move data_version for this connection, but
        // the digest must track it so the next poll doesn't report it.
        self.seen
            .lock()
            .digests
            .insert(key.to_string(), value_digest(value));
        Ok(())
    }
}

pub fn setup_kv_table(conn: &Connection) -> Result<(), StorageError> {
    // WAL so readers in other processes aren't blocked by a writer
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn read_data_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.pragma_query_value(None, "data_version", |row| row.get(0))?)
}

fn read_all(conn: &Connection) -> Result<Vec<(String, String)>, StorageError> {
    let mut stmt = conn.prepare("SELECT key, value FROM kv_store ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
