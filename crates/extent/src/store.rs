//! ExtentTable: the server-resident mapping from hash to content.
//!
//! One table is shared by every connection handler. All access goes through a
//! single coarse-grained mutex, held only for the duration of one call.
//! Persistence is best-effort: a bad extent file is logged and skipped, a
//! failed write is logged and the flush moves on to the next extent.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{LockResult, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extent::Extent;
use crate::hash::ExtentHash;
use crate::persist::{self, PersistenceError, TEMP_SUFFIX};

/// Trait for extent storage backends.
///
/// The connection handler only needs these four operations; persistence is a
/// concern of the concrete table.
pub trait ExtentStore: Send + Sync {
    /// Upsert an extent. Equal content is idempotent; a colliding hash is
    /// overwritten (last write wins).
    fn put(&self, extent: Extent) -> ExtentHash;

    /// Fetch content by hash. Returns `None` if absent.
    fn get(&self, hash: &ExtentHash) -> Option<Bytes>;

    /// Check if an extent exists without fetching it.
    fn has(&self, hash: &ExtentHash) -> bool;

    /// Number of stored extents.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which extents a flush writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushPolicy {
    /// Rewrite every in-memory extent.
    #[default]
    Full,
    /// Write only extents not yet persisted.
    Dirty,
}

impl FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(FlushPolicy::Full),
            "dirty" => Ok(FlushPolicy::Dirty),
            other => Err(format!("unknown flush policy: {other} (expected full or dirty)")),
        }
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPolicy::Full => f.write_str("full"),
            FlushPolicy::Dirty => f.write_str("dirty"),
        }
    }
}

/// Outcome of [`ExtentTable::load_from_disk`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<PersistenceError>,
}

/// Outcome of [`ExtentTable::flush_to_disk`].
#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: usize,
    pub failed: Vec<PersistenceError>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct TableInner {
    extents: HashMap<ExtentHash, Bytes>,
    /// Hashes written since the last successful flush.
    dirty: HashSet<ExtentHash>,
}

/// In-memory extent table with load-from-disk and flush-to-disk.
#[derive(Debug, Default)]
pub struct ExtentTable {
    inner: Mutex<TableInner>,
    /// Serializes flushes so two handlers closing at once don't race on temp files.
    flush_lock: Mutex<()>,
}

fn relock<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    // A panic elsewhere doesn't leave the map half-updated: every mutation is a single insert.
    result.unwrap_or_else(PoisonError::into_inner)
}

impl ExtentTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        relock(self.inner.lock())
    }

    /// Store raw content, returning its hash.
    pub fn insert(&self, content: impl Into<Bytes>) -> ExtentHash {
        self.put(Extent::new(content))
    }

    /// Number of extents written since the last flush.
    pub fn dirty_count(&self) -> usize {
        self.lock().dirty.len()
    }

    /// Load every persisted extent file in `dir` into the table.
    ///
    /// Files that fail to read, decode, or verify are logged and skipped.
    /// Loaded extents are considered already persisted.
    pub fn load_from_disk(&self, dir: &Path) -> Result<LoadReport, PersistenceError> {
        let entries = std::fs::read_dir(dir).map_err(|source| PersistenceError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut report = LoadReport::default();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(source) => {
                    let err = PersistenceError::ReadDir {
                        path: dir.to_path_buf(),
                        source,
                    };
                    warn!("skipping unreadable directory entry: {err}");
                    report.skipped.push(err);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                debug!(path = %path.display(), "ignoring leftover temp file");
                continue;
            }

            match persist::read_extent(&path) {
                Ok(extent) => {
                    let (hash, content) = extent.into_parts();
                    self.lock().extents.insert(hash, content);
                    report.loaded += 1;
                }
                Err(err) => {
                    warn!("error reading extent {}: {err}", path.display());
                    report.skipped.push(err);
                }
            }
        }

        debug!(
            dir = %dir.display(),
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "loaded extents from disk"
        );
        Ok(report)
    }

    /// Write extents to `dir`, one file per hash.
    ///
    /// The table lock is held only to snapshot the extents to write; file I/O
    /// happens outside it. Failures are logged and do not stop the flush.
    pub fn flush_to_disk(&self, dir: &Path, policy: FlushPolicy) -> FlushReport {
        let _flushing = relock(self.flush_lock.lock());

        let snapshot: Vec<(ExtentHash, Bytes)> = {
            let inner = self.lock();
            match policy {
                FlushPolicy::Full => inner
                    .extents
                    .iter()
                    .map(|(h, c)| (h.clone(), c.clone()))
                    .collect(),
                FlushPolicy::Dirty => inner
                    .dirty
                    .iter()
                    .filter_map(|h| inner.extents.get(h).map(|c| (h.clone(), c.clone())))
                    .collect(),
            }
        };

        let mut report = FlushReport::default();
        for (hash, content) in snapshot {
            match persist::write_extent(dir, &hash, &content) {
                Ok(()) => {
                    self.lock().dirty.remove(&hash);
                    report.written += 1;
                }
                Err(err) => {
                    warn!("error writing extent file for {} to disk: {err}", hash.short());
                    report.failed.push(err);
                }
            }
        }

        debug!(
            dir = %dir.display(),
            %policy,
            written = report.written,
            failed = report.failed.len(),
            "flushed extents to disk"
        );
        report
    }
}

impl ExtentStore for ExtentTable {
    fn put(&self, extent: Extent) -> ExtentHash {
        let (hash, content) = extent.into_parts();
        let mut inner = self.lock();
        let unchanged = inner.extents.get(&hash) == Some(&content);
        if !unchanged {
            inner.extents.insert(hash.clone(), content);
            inner.dirty.insert(hash.clone());
        }
        hash
    }

    fn get(&self, hash: &ExtentHash) -> Option<Bytes> {
        self.lock().extents.get(hash).cloned()
    }

    fn has(&self, hash: &ExtentHash) -> bool {
        self.lock().extents.contains_key(hash)
    }

    fn len(&self) -> usize {
        self.lock().extents.len()
    }
}
