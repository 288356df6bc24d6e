//! Cache slot keys and content fingerprints, both BLAKE3.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use blake3::Hasher;

use super::CACHE_FORMAT_VERSION;
use crate::directive::InputRecord;

/// Address of one cache slot: BLAKE3 over the descriptor path and flag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the slot key for a (descriptor, flags) request.
    pub fn for_request(descriptor: &Path, flags: &BTreeMap<String, String>) -> Self {
        let mut hasher = Hasher::new();
        hash_request(&mut hasher, descriptor, flags);
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex BLAKE3 hash of file contents.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fingerprint covering every input that affects a resolution's output:
///
/// 1. cache format version
/// 2. normalized descriptor path
/// 3. sorted flag set
/// 4. every input path with its content hash, in read order
pub fn fingerprint(descriptor: &Path, flags: &BTreeMap<String, String>, inputs: &[InputRecord]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
    hash_request(&mut hasher, descriptor, flags);

    for input in inputs {
        hasher.update(input.path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(input.hash.as_bytes());
        hasher.update(b"\0");
    }

    hasher.finalize().to_hex().to_string()
}

fn hash_request(hasher: &mut Hasher, descriptor: &Path, flags: &BTreeMap<String, String>) {
    hasher.update(descriptor.to_string_lossy().replace('\\', "/").as_bytes());
    hasher.update(b"\0");
    // BTreeMap iterates in key order
    for (name, value) in flags {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
}
