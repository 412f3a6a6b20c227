use thiserror::Error;

use crate::events::Category;

/// Failures reported by a `PhotoFetcher` or `AssetSource`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The library answered with a status the client does not accept.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The API key was rejected.
    #[error("photo library rejected the API key")]
    Unauthorized,

    /// The response body did not match the expected shape.
    #[error("malformed library response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The asset download did not return image content.
    #[error("asset {id} returned non-image content type {content_type:?}")]
    NotAnImage { id: String, content_type: String },
}

/// Recoverable outcomes of a selection tick.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The fetcher returned no usable candidates for this category.
    #[error("no {0} photos available")]
    EmptyPool(Category),

    /// No second portrait turned up within the attempt bound.
    #[error("no second portrait found after {attempts} attempts")]
    PairingExhausted { attempts: usize },

    #[error("photo library request failed: {0}")]
    Fetch(#[from] FetchError),
}

impl SelectionError {
    pub fn is_empty_pool(&self) -> bool {
        matches!(self, Self::EmptyPool(_))
    }
}
