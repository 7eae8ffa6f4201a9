//! Content-addressed store of final simplify results.
//!
//! Payloads live as `<key>.json` beside a single `index.json` that maps each
//! key to its payload file and creation time. The index is read and rewritten
//! on every mutation without locking, so two writers racing on it can lose
//! one update. Expired entries are removed lazily by the `get` that finds them.

use crate::error::CacheError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";
const KEY_HEX_CHARS: usize = 16;

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRecord {
    path: String,
    cached_at: DateTime<Utc>,
}

type CacheIndex = HashMap<String, IndexRecord>;

/// SHA-256 of the file bytes, truncated to 16 hex characters. Names and
/// languages play no part, so identical bytes always share a key.
pub fn hash_file(path: &Path) -> Result<String, CacheError> {
    let bytes = fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(KEY_HEX_CHARS);
    digest
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
    retention: Duration,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_retention(root, Duration::days(DEFAULT_RETENTION_DAYS))
    }

    pub fn with_retention(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    /// Looks up `key` as of `now`. Expired, unreadable or orphaned entries
    /// count as misses and are dropped from the index.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut index = self.load_index();
        let record = index.get(key)?.clone();
        let payload_path = self.payload_path(key);

        if now - record.cached_at > self.retention {
            debug!(key, cached_at = %record.cached_at, "evicting expired cache entry");
            index.remove(key);
            self.save_index_quietly(&index);
            if let Err(error) = fs::remove_file(&payload_path) {
                debug!(key, %error, "expired payload already gone");
            }
            return None;
        }

        match fs::read_to_string(&payload_path) {
            Ok(payload) => Some(payload),
            Err(error) => {
                warn!(key, %error, "cache payload unreadable, dropping entry");
                index.remove(key);
                self.save_index_quietly(&index);
                None
            }
        }
    }

    pub fn put(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        self.put_at(key, payload, Utc::now())
    }

    pub fn put_at(
        &self,
        key: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)?;

        fs::write(self.payload_path(key), payload)?;

        let mut index = self.load_index();
        index.insert(
            key.to_string(),
            IndexRecord {
                path: format!("{key}.json"),
                cached_at: now,
            },
        );
        self.save_index(&index)
    }

    /// Always derived from the key; the `path` stored in the index is never
    /// trusted.
    fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> CacheIndex {
        let raw = match fs::read_to_string(self.index_path()) {
            Ok(raw) => raw,
            Err(_) => return CacheIndex::new(),
        };

        serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!(%error, "cache index is corrupt, starting empty");
            CacheIndex::new()
        })
    }

    fn save_index(&self, index: &CacheIndex) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.index_path(), serde_json::to_string(index)?)?;
        Ok(())
    }

    fn save_index_quietly(&self, index: &CacheIndex) {
        if let Err(error) = self.save_index(index) {
            warn!(%error, "failed to rewrite cache index");
        }
    }
}
