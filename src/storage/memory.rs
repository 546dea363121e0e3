//! In-process archive, for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{ArchiveStorage, Listing};

/// Archive held in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map still holds consistent data: writes are single inserts.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ArchiveStorage for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Listing> {
        let objects = self.lock();
        let mut listing = Listing::default();

        for key in objects.keys().filter(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            match rest.find('/') {
                Some(idx) => {
                    let child = format!("{prefix}{}", &rest[..=idx]);
                    if listing.prefixes.last() != Some(&child) {
                        listing.prefixes.push(child);
                    }
                }
                None => listing.objects.push(key.clone()),
            }
        }
        listing.prefixes.sort();
        listing.prefixes.dedup();
        Ok(listing)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::missing_archive(format!("no object at {key}")))
    }

    async fn write(&self, key: &str, body: &[u8], _content_type: &str) -> Result<()> {
        self.lock().insert(key.to_string(), body.to_vec());
        Ok(())
    }
}
