//! Persisted queue / current / completed / errors collections.
//!
//! Each collection is its own JSON document in the state directory so the
//! dashboard can load them independently. Every mutation rewrites the whole
//! document through a temp file + rename, so a concurrent reader sees either
//! the previous or the next version, never a partial one.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const QUEUE_FILE: &str = "queue.json";
pub const CURRENT_FILE: &str = "current.json";
pub const COMPLETED_FILE: &str = "completed.json";
pub const ERRORS_FILE: &str = "errors.json";

/// Errors raised by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State store lock poisoned")]
    Poisoned,
}

/// A file waiting to be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub added: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            added: Utc::now(),
        }
    }
}

/// The single in-flight job.
///
/// `synthetic_progress` is a liveness indicator produced on a timer while the
/// encoder runs. It is not derived from the encoder and is not an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentJob {
    pub path: PathBuf,
    pub synthetic_progress: u8,
    pub eta: String,
    pub started: DateTime<Utc>,
}

/// A successfully encoded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub completed_at: DateTime<Utc>,
}

/// Machine-readable category of an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingSuffix,
    NoEligibleFiles,
    OutputAlreadyExists,
    /// The encoder exited non-zero or could not be started.
    ToolFailed,
    /// The timeout case of a tool failure: the encoder ran past the
    /// configured limit and was killed. See [`ErrorKind::is_tool_failure`].
    ToolTimedOut,
    OutputMissing,
    Interrupted,
    Unexpected,
}

impl ErrorKind {
    /// True for every failure of the external encoder, timeouts included.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, ErrorKind::ToolFailed | ErrorKind::ToolTimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingSuffix => "missing_suffix",
            ErrorKind::NoEligibleFiles => "no_eligible_files",
            ErrorKind::OutputAlreadyExists => "output_already_exists",
            ErrorKind::ToolFailed => "tool_failed",
            ErrorKind::ToolTimedOut => "tool_timed_out",
            ErrorKind::OutputMissing => "output_missing",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file or per-folder failure surfaced to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(path: impl Into<PathBuf>, kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// All four collections read at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub queue: Vec<QueueEntry>,
    pub current: Option<CurrentJob>,
    pub completed: Vec<CompletedRecord>,
    pub errors: Vec<ErrorRecord>,
}

/// Owner of the persisted collections.
///
/// Mutations are serialized by an internal lock; reads take no lock and rely
/// on the atomic replace of each document.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Open the store rooted at `dir`, creating the directory and any missing
    /// collection documents.
    ///
    /// Existing documents are kept and must parse.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StateError::Io {
            path: dir.clone(),
            source,
        })?;

        let store = Self {
            dir,
            write_lock: Mutex::new(()),
        };

        let snapshot = store.snapshot()?;
        {
            let _guard = store.lock()?;
            for name in [QUEUE_FILE, COMPLETED_FILE, ERRORS_FILE] {
                if !store.dir.join(name).exists() {
                    store.write_atomic(name, &Vec::<QueueEntry>::new())?;
                }
            }
            if !store.dir.join(CURRENT_FILE).exists() {
                store.write_current(None)?;
            }
        }

        debug!(
            dir = %store.dir.display(),
            queued = snapshot.queue.len(),
            completed = snapshot.completed.len(),
            errors = snapshot.errors.len(),
            "State store opened"
        );
        Ok(store)
    }

    /// Directory holding the collection documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn enqueue(&self, entry: QueueEntry) -> Result<(), StateError> {
        let _guard = self.lock()?;
        let mut queue: Vec<QueueEntry> = self.read_list(QUEUE_FILE)?;
        queue.push(entry);
        self.write_atomic(QUEUE_FILE, &queue)
    }

    /// Remove every queue entry whose path equals `path`. Returns how many were removed.
    pub fn dequeue(&self, path: &Path) -> Result<usize, StateError> {
        let _guard = self.lock()?;
        let mut queue: Vec<QueueEntry> = self.read_list(QUEUE_FILE)?;
        let before = queue.len();
        queue.retain(|entry| entry.path != path);
        let removed = before - queue.len();
        if removed > 0 {
            self.write_atomic(QUEUE_FILE, &queue)?;
        }
        Ok(removed)
    }

    /// Publish the in-flight job, or clear it with `None`.
    pub fn set_current(&self, job: Option<&CurrentJob>) -> Result<(), StateError> {
        let _guard = self.lock()?;
        self.write_current(job)
    }

    pub fn append_completed(&self, record: CompletedRecord) -> Result<(), StateError> {
        let _guard = self.lock()?;
        let mut completed: Vec<CompletedRecord> = self.read_list(COMPLETED_FILE)?;
        completed.push(record);
        self.write_atomic(COMPLETED_FILE, &completed)
    }

    pub fn append_error(&self, record: ErrorRecord) -> Result<(), StateError> {
        let _guard = self.lock()?;
        let mut errors: Vec<ErrorRecord> = self.read_list(ERRORS_FILE)?;
        errors.push(record);
        self.write_atomic(ERRORS_FILE, &errors)
    }

    pub fn queue(&self) -> Result<Vec<QueueEntry>, StateError> {
        self.read_list(QUEUE_FILE)
    }

    pub fn current(&self) -> Result<Option<CurrentJob>, StateError> {
        let path = self.dir.join(CURRENT_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| StateError::Json {
                path: path.clone(),
                source,
            })?;
        match value {
            serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StateError::Json { path, source }),
        }
    }

    pub fn completed(&self) -> Result<Vec<CompletedRecord>, StateError> {
        self.read_list(COMPLETED_FILE)
    }

    pub fn errors(&self) -> Result<Vec<ErrorRecord>, StateError> {
        self.read_list(ERRORS_FILE)
    }

    /// Read all four collections.
    pub fn snapshot(&self) -> Result<StateSnapshot, StateError> {
        Ok(StateSnapshot {
            queue: self.queue()?,
            current: self.current()?,
            completed: self.completed()?,
            errors: self.errors()?,
        })
    }

    /// Reset every collection to empty. Used on graceful shutdown.
    pub fn clear_all(&self) -> Result<(), StateError> {
        let _guard = self.lock()?;
        self.write_atomic(QUEUE_FILE, &Vec::<QueueEntry>::new())?;
        self.write_current(None)?;
        self.write_atomic(COMPLETED_FILE, &Vec::<CompletedRecord>::new())?;
        self.write_atomic(ERRORS_FILE, &Vec::<ErrorRecord>::new())?;
        debug!(dir = %self.dir.display(), "State store cleared");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StateError> {
        self.write_lock.lock().map_err(|_| StateError::Poisoned)
    }

    fn read_list<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StateError> {
        let path = self.dir.join(name);
        match read_optional(&path)? {
            Some(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                .map_err(|source| StateError::Json { path, source }),
            _ => Ok(Vec::new()),
        }
    }

    fn write_current(&self, job: Option<&CurrentJob>) -> Result<(), StateError> {
        match job {
            Some(job) => self.write_atomic(CURRENT_FILE, job),
            None => self.write_atomic(CURRENT_FILE, &serde_json::json!({})),
        }
    }

    /// Serialize `value` and replace `name` with it via temp file + rename.
    fn write_atomic<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StateError> {
        let target = self.dir.join(name);
        let json = serde_json::to_vec_pretty(value).map_err(|source| StateError::Json {
            path: target.clone(),
            source,
        })?;

        let tmp = self.dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
        let result = write_and_rename(&tmp, &target, &json).and_then(|_| sync_dir(&self.dir));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(|source| StateError::Io {
            path: target,
            source,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StateError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_and_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, target)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
