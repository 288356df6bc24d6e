//! Persistent resolution cache.
//!
//! Entries live in slots addressed by [`CacheKey`] (descriptor path plus
//! sorted flags). Each entry records the content hash of every descriptor
//! file the resolution read; a lookup re-hashes those files and only serves
//! the entry when the recomputed fingerprint still matches.
//!
//! ```text
//! fetch ── Absent / Corrupted / VersionMismatch / Expired / Changed ──▶ miss
//!   │
//!   └── fingerprint matches, age < ttl ──▶ hit
//!
//! stage ──▶ PendingWrite ── commit ──▶ visible
//!                   └────── drop ────▶ discarded
//! ```

mod backend;
mod entry;
mod key;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use backend::{CacheBackend, ENTRY_EXTENSION, FsBackend, MemoryBackend, StagedWrite};
pub use entry::{CacheEntry, CacheMetadata, CachedResolution};
pub use key::{CacheKey, content_hash, fingerprint};

use crate::directive::InputRecord;
use crate::runtime::Runtime;

/// Current cache format version. Increment when the entry layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 2;

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("cache corrupted: {0}")]
    Corrupted(String),
}

/// Why a lookup did not produce a usable entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Corrupted,
    VersionMismatch,
    Expired,
    /// A recorded input changed, disappeared, or the entry belongs to another request.
    Changed,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Corrupted => "corrupted",
            Self::VersionMismatch => "version mismatch",
            Self::Expired => "expired",
            Self::Changed => "inputs changed",
        })
    }
}

#[derive(Debug)]
pub enum CacheLookup {
    Hit(Box<CacheEntry>),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A staged entry. Publish it with [`PendingWrite::commit`]; dropping it
/// discards the write.
pub struct PendingWrite {
    key: CacheKey,
    staged: Box<dyn StagedWrite>,
}

impl PendingWrite {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn commit(self) -> Result<(), CacheError> {
        self.staged.commit()
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Fingerprint-validated cache of resolved build contexts.
#[derive(Debug)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Filesystem store rooted at `dir`. The directory is created on first write.
    pub fn open(dir: impl AsRef<Path>, ttl: Duration) -> Self {
        Self::new(Arc::new(FsBackend::new(dir.as_ref())), ttl)
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up the entry for a request and validate it against live content.
    ///
    /// Corrupted and incompatible entries are removed on the way.
    pub fn fetch(
        &self,
        runtime: &dyn Runtime,
        descriptor: &Path,
        flags: &BTreeMap<String, String>,
    ) -> Result<CacheLookup, CacheError> {
        let key = CacheKey::for_request(descriptor, flags);
        let lookup = self.lookup(runtime, &key, descriptor, flags)?;
        match &lookup {
            CacheLookup::Hit(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            CacheLookup::Miss(_) => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(lookup)
    }

    fn lookup(
        &self,
        runtime: &dyn Runtime,
        key: &CacheKey,
        descriptor: &Path,
        flags: &BTreeMap<String, String>,
    ) -> Result<CacheLookup, CacheError> {
        let Some(bytes) = self.backend.read(key)? else {
            return Ok(CacheLookup::Miss(MissReason::Absent));
        };

        let entry = match CacheEntry::decode(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                let reason = match err {
                    CacheError::VersionMismatch { .. } => MissReason::VersionMismatch,
                    _ => MissReason::Corrupted,
                };
                tracing::warn!(key = %key, error = %err, "discarding unreadable cache entry");
                self.backend.remove(key)?;
                return Ok(CacheLookup::Miss(reason));
            }
        };

        if entry.descriptor != descriptor || &entry.flags != flags {
            return Ok(CacheLookup::Miss(MissReason::Changed));
        }

        let ttl = self.ttl.min(entry.metadata.ttl());
        if entry.metadata.age(entry::now_millis()) >= ttl {
            return Ok(CacheLookup::Miss(MissReason::Expired));
        }

        let Some(live) = live_inputs(runtime, &entry.inputs) else {
            return Ok(CacheLookup::Miss(MissReason::Changed));
        };
        let root_matches = live.first().is_some_and(|root| root.hash == entry.root_hash);
        if !root_matches || fingerprint(descriptor, flags, &live) != entry.fingerprint {
            return Ok(CacheLookup::Miss(MissReason::Changed));
        }

        Ok(CacheLookup::Hit(Box::new(entry)))
    }

    /// Encode and stage `entry` in its slot without publishing it.
    pub fn stage(&self, entry: &CacheEntry) -> Result<PendingWrite, CacheError> {
        let key = CacheKey::for_request(&entry.descriptor, &entry.flags);
        let bytes = entry.encode()?;
        let staged = self.backend.stage(&key, &bytes)?;
        Ok(PendingWrite { key, staged })
    }

    /// Stage and immediately publish `entry`.
    pub fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.stage(entry)?.commit()
    }

    /// Drop the slot of one (descriptor, flags) request.
    pub fn invalidate(&self, descriptor: &Path, flags: &BTreeMap<String, String>) -> Result<(), CacheError> {
        self.backend.remove(&CacheKey::for_request(descriptor, flags))
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear()
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.backend.entries()?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.iter().map(|(_, size)| size).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

/// Re-hash every recorded input. `None` when any of them can no longer be read.
///
/// An absent candidate that now exists comes back with its content hash, so
/// the fingerprint no longer matches.
fn live_inputs(runtime: &dyn Runtime, recorded: &[InputRecord]) -> Option<Vec<InputRecord>> {
    recorded
        .iter()
        .map(|input| match runtime.read_file(&input.path) {
            Ok(bytes) => Some(InputRecord {
                path: input.path.clone(),
                hash: content_hash(&bytes),
            }),
            // a candidate that was missing must still be missing
            Err(_) if input.is_absent() && !runtime.is_file(&input.path) => Some(input.clone()),
            Err(_) => None,
        })
        .collect()
}
