//! Boundary to the remote photo library.

pub mod immich;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::FavoritesFilter;
use crate::error::FetchError;
use crate::events::PhotoRecord;

pub use immich::ImmichClient;
pub use memory::InMemoryLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentQuery {
    /// Look-back window in days; 0 means unlimited.
    pub days: u32,
    pub favorites: FavoritesFilter,
    /// Upper bound on the number of records returned.
    pub count: usize,
    /// End of the window; nothing taken after this instant is requested.
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryQuery {
    /// How many years back to look; 0 means unlimited.
    pub years: u32,
    pub favorites: FavoritesFilter,
    /// Calendar day whose anniversaries are requested.
    pub on: NaiveDate,
}

/// Supplies candidate records for the two rotation pools.
#[async_trait]
pub trait PhotoFetcher: Send + Sync {
    async fn fetch_recent(&self, query: &RecentQuery) -> Result<Vec<PhotoRecord>, FetchError>;
    async fn fetch_memories(&self, query: &MemoryQuery) -> Result<Vec<PhotoRecord>, FetchError>;
}

/// Supplies the original bytes of an asset for rendering.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn download(&self, id: &str) -> Result<Bytes, FetchError>;

    /// Link to the asset in the library's web UI, if it has one.
    fn asset_url(&self, _id: &str) -> Option<String> {
        None
    }
}
