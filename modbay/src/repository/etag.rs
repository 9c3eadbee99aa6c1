//! Persistent ETag bookkeeping for conditional repository downloads.
//!
//! One JSON object mapping URL → ETag, written transactionally. An
//! unreadable file is not an error: the store starts empty and the next
//! update simply re-downloads everything.

use crate::fsutil::write_atomic;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File name inside the cache directory.
pub const ETAGS_FILE_NAME: &str = "etags.json";

/// In-memory mirror of `etags.json`.
#[derive(Debug)]
pub struct EtagStore {
    path: PathBuf,
    // BTreeMap keeps serialization byte-stable across runs.
    map: BTreeMap<String, String>,
}

impl EtagStore {
    /// Load from disk; missing or unreadable files yield an empty store.
    pub fn load(path: &Path) -> Self {
        let map = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable etag file, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable etag file, starting fresh");
                BTreeMap::new()
            }
        };
        EtagStore {
            path: path.to_path_buf(),
            map,
        }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.map.get(url).map(|s| s.as_str())
    }

    pub fn set(&mut self, url: impl Into<String>, etag: impl Into<String>) {
        self.map.insert(url.into(), etag.into());
    }

    pub fn clear(&mut self, url: &str) {
        self.map.remove(url);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Persist the current map transactionally.
    pub fn save(&self) -> io::Result<()> {
        let bytes =
            serde_json::to_vec_pretty(&self.map).expect("etag map serialization cannot fail");
        write_atomic(&self.path, &bytes)
    }

    /// Discard in-memory state and re-read the last persisted map.
    ///
    /// This is the rollback primitive for failed updates: pending ETag
    /// changes vanish, so the next update re-checks those repositories.
    pub fn reload(&mut self) {
        *self = EtagStore::load(&self.path);
    }
}
