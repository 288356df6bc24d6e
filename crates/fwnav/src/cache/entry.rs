//! On-disk cache record layout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fwnav_graph::{BuildContext, DependencyGraph};
use serde::{Deserialize, Serialize};

use super::key::fingerprint;
use super::{CACHE_FORMAT_VERSION, CacheError};
use crate::directive::InputRecord;

/// Header written first in every entry so the format version can be checked
/// before the payload is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Cache format version.
    pub format_version: u32,
    /// fwnav version that wrote the entry.
    pub fwnav_version: String,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Time-to-live the entry was written with, in milliseconds.
    pub ttl_ms: u64,
}

impl CacheMetadata {
    pub fn new(ttl: Duration) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            fwnav_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at_ms: now_millis(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn is_compatible(&self) -> bool {
        self.format_version == CACHE_FORMAT_VERSION
    }

    /// Age of the entry at `now_ms`. Clock skew into the future counts as zero.
    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.created_at_ms))
    }
}

/// The resolved output stored in an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResolution {
    pub context: BuildContext,
    pub graph: DependencyGraph,
}

/// One cached resolution of a (descriptor, flags) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    pub fingerprint: String,
    pub descriptor: PathBuf,
    pub flags: BTreeMap<String, String>,
    /// Content hash of the platform descriptor itself.
    pub root_hash: String,
    /// Every descriptor file read during resolution, root first.
    pub inputs: Vec<InputRecord>,
    pub payload: CachedResolution,
}

impl CacheEntry {
    /// Build an entry for a finished resolution. `inputs[0]` must be the root descriptor.
    pub fn new(
        descriptor: PathBuf,
        flags: BTreeMap<String, String>,
        inputs: Vec<InputRecord>,
        ttl: Duration,
        payload: CachedResolution,
    ) -> Self {
        let fingerprint = fingerprint(&descriptor, &flags, &inputs);
        let root_hash = inputs.first().map(|i| i.hash.clone()).unwrap_or_default();
        Self {
            metadata: CacheMetadata::new(ttl),
            fingerprint,
            descriptor,
            flags,
            root_hash,
            inputs,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        bincode::serialize(self).map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    /// Decode an entry, rejecting other format versions before touching the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let metadata: CacheMetadata =
            bincode::deserialize(bytes).map_err(|e| CacheError::DeserializationError(e.to_string()))?;
        if !metadata.is_compatible() {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: metadata.format_version,
            });
        }

        let entry: Self =
            bincode::deserialize(bytes).map_err(|e| CacheError::DeserializationError(e.to_string()))?;
        if entry.root_hash.is_empty() || entry.inputs.first().is_none_or(|i| i.hash != entry.root_hash) {
            return Err(CacheError::Corrupted("root descriptor hash does not match first input".into()));
        }
        Ok(entry)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
