// Named-blob storage backends

use crate::models::now_ms;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

const CURRENT_VERSION: u32 = 1;

/// Storage for whole collections, addressed by a fixed key
pub trait Backend {
    /// Contents stored under `key`, or `None` if nothing was ever written
    fn read_blob(&self, key: &str) -> Result<Option<String>>;

    /// Replace the contents stored under `key`
    fn write_blob(&mut self, key: &str, contents: &str) -> Result<()>;

    /// Keep the current contents of `key` under a backup name so a later
    /// write does not destroy them
    fn set_aside_blob(&mut self, key: &str) -> Result<()>;
}

/// Backup key for contents set aside from `key`
pub fn set_aside_key(key: &str) -> String {
    format!("{}-bad", key)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Blob key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Blob key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid blob key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

fn write_version(base_path: &Path) -> Result<()> {
    let version_path = base_path.join(".version");
    if !version_path.exists() {
        fs::write(version_path, CURRENT_VERSION.to_string())?;
    }
    Ok(())
}

// ============================================================================
// JSONL files
// ============================================================================

/// One `{key}.jsonl` file per blob inside a directory
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        write_version(&base_path)?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", key))
    }
}

impl Backend for FileBackend {
    fn read_blob(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.blob_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(contents))
    }

    fn write_blob(&mut self, key: &str, contents: &str) -> Result<()> {
        validate_key(key)?;

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(".lock"))
            .context("Failed to open lock file")?;

        // Acquire exclusive lock before writing
        lock_file.lock_exclusive().context("Failed to acquire file lock")?;

        let path = self.blob_path(key);
        let tmp_path = self.base_path.join(format!("{}.jsonl.tmp", key));
        {
            let mut tmp = fs::File::create(&tmp_path).context("Failed to create temp file")?;
            tmp.write_all(contents.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!(key, bytes = contents.len(), "Wrote blob file");

        // Lock is released when lock_file is dropped
        Ok(())
    }

    fn set_aside_blob(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.blob_path(key);
        if !path.exists() {
            return Ok(());
        }
        let bad_path = self.base_path.join(format!("{}.jsonl.bad", key));
        fs::rename(&path, &bad_path).with_context(|| format!("Failed to move aside {}", path.display()))?;
        debug!(key, path = %bad_path.display(), "Set aside blob file");
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Blobs kept as rows of a single key/value table
pub struct SqliteBackend {
    db: Connection,
}

impl SqliteBackend {
    /// Open or create `taskboard.db` inside the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref();
        fs::create_dir_all(base_path).context("Failed to create store directory")?;

        let db = Connection::open(base_path.join("taskboard.db")).context("Failed to open SQLite database")?;
        let backend = Self { db };
        backend.create_schema()?;

        Self::create_gitignore(base_path)?;
        write_version(base_path)?;
        Ok(backend)
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                contents TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(base_path: &Path) -> Result<()> {
        let gitignore_path = base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "taskboard.db\ntaskboard.db-shm\ntaskboard.db-wal\n")?;
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn read_blob(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let contents = self
            .db
            .query_row("SELECT contents FROM blobs WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(contents)
    }

    fn write_blob(&mut self, key: &str, contents: &str) -> Result<()> {
        validate_key(key)?;
        self.db.execute(
            "INSERT OR REPLACE INTO blobs (key, contents, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, contents, now_ms()],
        )?;
        debug!(key, bytes = contents.len(), "Wrote blob row");
        Ok(())
    }

    fn set_aside_blob(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let backup = set_aside_key(key);
        self.db.execute(
            "INSERT OR REPLACE INTO blobs (key, contents, updated_at) SELECT ?2, contents, ?3 FROM blobs WHERE key = ?1",
            rusqlite::params![key, backup, now_ms()],
        )?;
        debug!(key, backup = %backup, "Set aside blob row");
        Ok(())
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Process-local blobs. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    read_only: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, contents: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.blobs.lock().map_err(|_| eyre!("Memory backend lock poisoned"))
    }
}

impl Backend for MemoryBackend {
    fn read_blob(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn write_blob(&mut self, key: &str, contents: &str) -> Result<()> {
        validate_key(key)?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(eyre!("Backend is read-only, cannot write {}", key));
        }
        self.insert(key, contents)
    }

    fn set_aside_blob(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut blobs = self.lock()?;
        if let Some(contents) = blobs.get(key).cloned() {
            blobs.insert(set_aside_key(key), contents);
        }
        Ok(())
    }
}
