//! In-memory content-addressable store (spec §4.9), keyed
//! `"<packageId>/<relPath>"`. Grounded in `pacm-store::store_manager`'s
//! SHA-256-keyed "if it's already there, don't redo the work" shape and
//! `pacm-store::path_resolver`'s scoped-name conventions, generalized from a
//! POSIX directory tree to a `HashMap` that never touches a filesystem.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use webpm_error::{Result, WebpmError};
use webpm_tar::ContentType;

#[must_use]
pub fn store_key(package_id: &str, rel_path: &str) -> String {
    format!("{package_id}/{rel_path}")
}

/// A stored entry, or a marker recording that the bytes were elided for
/// exceeding the per-file cap — distinct from the key being entirely absent.
#[derive(Debug, Clone)]
pub enum StoredEntry {
    Bytes { bytes: Arc<Vec<u8>>, content_type: ContentType },
    SkippedTooLarge { content_type: ContentType, size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    Deduplicated,
    SkippedTooLarge,
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub struct ContentStore {
    max_file_bytes: u64,
    entries: Mutex<HashMap<String, StoredEntry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new(webpm_constants::DEFAULT_MAX_FILE_BYTES)
    }
}

impl ContentStore {
    #[must_use]
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Serializes concurrent writers to the same key; a write whose bytes
    /// match what's already there is a no-op, divergent bytes are a conflict
    /// (spec §5 "content store is append-mostly").
    pub async fn put(
        &self,
        package_id: &str,
        rel_path: &str,
        bytes: Vec<u8>,
        content_type: ContentType,
    ) -> Result<PutOutcome> {
        let key = store_key(package_id, rel_path);
        let key_lock = self.lock_for(&key).await;
        let _guard = key_lock.lock().await;

        if bytes.len() as u64 > self.max_file_bytes {
            let mut entries = self.entries.lock().await;
            entries.insert(
                key,
                StoredEntry::SkippedTooLarge { content_type, size: bytes.len() as u64 },
            );
            return Ok(PutOutcome::SkippedTooLarge);
        }

        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(&key) {
            match existing {
                StoredEntry::Bytes { bytes: existing_bytes, .. } => {
                    if digest(existing_bytes) == digest(&bytes) {
                        return Ok(PutOutcome::Deduplicated);
                    }
                    return Err(WebpmError::ContentStoreConflict(key));
                }
                StoredEntry::SkippedTooLarge { .. } => {
                    return Err(WebpmError::ContentStoreConflict(key));
                }
            }
        }

        entries.insert(key, StoredEntry::Bytes { bytes: Arc::new(bytes), content_type });
        Ok(PutOutcome::Stored)
    }

    pub async fn get(&self, key: &str) -> Option<StoredEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn list_by_package(&self, package_id: &str) -> Vec<String> {
        let prefix = format!("{package_id}/");
        self.entries
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.key_locks.lock().await.clear();
    }
}
