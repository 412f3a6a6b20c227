use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{AssetSource, MemoryQuery, PhotoFetcher, RecentQuery};
use crate::error::FetchError;
use crate::events::PhotoRecord;

/// Library held entirely in memory.
///
/// Returns its records in insertion order (truncated to the requested count)
/// and leaves all window filtering to the caller. Counts fetches and can be
/// told to fail, which makes it the fetcher of choice for offline runs and
/// tests.
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    recent: Mutex<Vec<PhotoRecord>>,
    memories: Mutex<Vec<PhotoRecord>>,
    assets: Mutex<HashMap<String, Bytes>>,
    recent_fetches: AtomicUsize,
    memory_fetches: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryLibrary {
    pub fn new(recent: Vec<PhotoRecord>, memories: Vec<PhotoRecord>) -> Self {
        Self {
            recent: Mutex::new(recent),
            memories: Mutex::new(memories),
            ..Self::default()
        }
    }

    pub fn set_memories(&self, records: Vec<PhotoRecord>) {
        *self.memories.lock().expect("library lock poisoned") = records;
    }

    pub fn insert_asset(&self, id: impl Into<String>, bytes: impl Into<Bytes>) {
        self.assets
            .lock()
            .expect("library lock poisoned")
            .insert(id.into(), bytes.into());
    }

    /// Make every following request fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn recent_fetches(&self) -> usize {
        self.recent_fetches.load(Ordering::SeqCst)
    }

    pub fn memory_fetches(&self) -> usize {
        self.memory_fetches.load(Ordering::SeqCst)
    }

    fn check_failing(&self, url: &str) -> Result<(), FetchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoFetcher for InMemoryLibrary {
    async fn fetch_recent(&self, query: &RecentQuery) -> Result<Vec<PhotoRecord>, FetchError> {
        self.recent_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failing("memory://recent")?;
        let recent = self.recent.lock().expect("library lock poisoned");
        Ok(recent.iter().take(query.count).cloned().collect())
    }

    async fn fetch_memories(&self, _query: &MemoryQuery) -> Result<Vec<PhotoRecord>, FetchError> {
        self.memory_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failing("memory://memories")?;
        Ok(self.memories.lock().expect("library lock poisoned").clone())
    }
}

#[async_trait]
impl AssetSource for InMemoryLibrary {
    async fn download(&self, id: &str) -> Result<Bytes, FetchError> {
        self.check_failing("memory://assets")?;
        self.assets
            .lock()
            .expect("library lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                url: format!("memory://assets/{id}"),
            })
    }
}
