// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Content-addressed response cache
//!
//! Each entry is a single file in the cache directory named by the request
//! fingerprint and holding the raw response text. The file mtime orders
//! eviction. Bodies containing [`TOOL_CALL_MARKER`] are never stored, which
//! keeps every leg that resolved a function call out of the cache.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Result, SgptError};

/// Marker the tool invoker writes into every function call rendering
pub const TOOL_CALL_MARKER: &str = "@FunctionCall";

/// Default number of entries kept on disk
pub const DEFAULT_CACHE_LENGTH: usize = 100;

/// Hex digest identifying a logical request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint any serializable request description.
///
/// serde_json emits struct fields in declaration order and map keys sorted,
/// so the digest is stable across runs.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint> {
    let canonical = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Whether responses computed with caching disabled are still stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheWritePolicy {
    /// Store only when the caller asked for caching
    #[default]
    WhenEnabled,
    /// Store every completed response (except function call legs)
    Always,
}

impl std::str::FromStr for CacheWritePolicy {
    type Err = SgptError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "when_enabled" => Ok(Self::WhenEnabled),
            "always" => Ok(Self::Always),
            other => Err(SgptError::Config(format!(
                "unknown cache write policy {:?} (expected when_enabled or always)",
                other
            ))),
        }
    }
}

/// Disk cache of completed responses
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    capacity: usize,
    write_policy: CacheWritePolicy,
}

impl ResponseCache {
    /// Open (creating if needed) a cache directory holding at most `capacity` entries
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SgptError::Cache(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            capacity,
            write_policy: CacheWritePolicy::default(),
        })
    }

    /// Set the write policy
    pub fn with_write_policy(mut self, write_policy: CacheWritePolicy) -> Self {
        self.write_policy = write_policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_policy(&self) -> CacheWritePolicy {
        self.write_policy
    }

    /// Path of the entry for a fingerprint
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(fingerprint.as_str())
    }

    /// Read an entry. A missing entry is `None`; an unreadable one is an error.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let path = self.entry_path(fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SgptError::Cache(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write an entry, replacing any previous body
    pub fn put(&self, fingerprint: &Fingerprint, body: &str) -> Result<()> {
        let path = self.entry_path(fingerprint);
        std::fs::write(&path, body)
            .map_err(|e| SgptError::Cache(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Number of entries on disk
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let entries = self.entries()?;
        let mut removed = 0;
        for (path, _) in entries {
            if remove_entry(&path)? {
                removed += 1;
            }
        }
        tracing::debug!(target: "sgpt.cache", removed, "cache cleared");
        Ok(removed)
    }

    /// Delete the oldest entries beyond capacity, returning how many were removed
    pub fn evict(&self) -> Result<usize> {
        let mut entries = self.entries()?;
        if entries.len() <= self.capacity {
            return Ok(0);
        }

        entries.sort_by(|a, b| a.1.cmp(&b.1));
        let excess = entries.len() - self.capacity;
        let mut removed = 0;
        for (path, _) in entries.into_iter().take(excess) {
            if remove_entry(&path)? {
                removed += 1;
            }
        }
        tracing::debug!(target: "sgpt.cache", removed, capacity = self.capacity, "evicted entries");
        Ok(removed)
    }

    /// Serve a cached body or stream a freshly computed one.
    ///
    /// On a hit the stored body is yielded once and `compute` is never
    /// called. On a miss every fragment from `compute()` is forwarded as it
    /// arrives and the buffered body is stored only after the inner stream
    /// is exhausted without error. Dropping the returned stream early stores
    /// nothing.
    pub fn fetch_or_compute<'a, F, S>(
        &'a self,
        fingerprint: Fingerprint,
        use_cache: bool,
        compute: F,
    ) -> impl Stream<Item = Result<String>> + 'a
    where
        F: FnOnce() -> S + 'a,
        S: Stream<Item = Result<String>> + 'a,
    {
        async_stream::try_stream! {
            let cached = if use_cache { self.get(&fingerprint)? } else { None };

            if let Some(body) = cached {
                tracing::debug!(target: "sgpt.cache", fingerprint = %fingerprint, "cache hit");
                yield body;
            } else {
                let inner = compute();
                let mut inner = std::pin::pin!(inner);
                let mut buffer = String::new();

                while let Some(fragment) = inner.next().await {
                    let fragment = fragment?;
                    buffer.push_str(&fragment);
                    yield fragment;
                }

                if self.should_store(use_cache, &buffer) {
                    self.put(&fingerprint, &buffer)?;
                    tracing::debug!(target: "sgpt.cache", fingerprint = %fingerprint, bytes = buffer.len(), "cache store");
                }
                self.evict()?;
            }
        }
    }

    fn should_store(&self, use_cache: bool, body: &str) -> bool {
        let enabled = use_cache || self.write_policy == CacheWritePolicy::Always;
        enabled && !body.contains(TOOL_CALL_MARKER)
    }

    fn entries(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| {
            SgptError::Cache(format!("cannot list {}: {}", self.dir.display(), e))
        })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            // Another process may evict between listing and stat
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if metadata.is_file() {
                entries.push((entry.path(), metadata.modified()?));
            }
        }
        Ok(entries)
    }
}

fn remove_entry(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SgptError::Cache(format!(
            "cannot remove {}: {}",
            path.display(),
            e
        ))),
    }
}
