use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::SelectionError;
use crate::events::{PhotoRecord, Selection};
use crate::pool::PoolManager;
use crate::random::RandomSource;

/// Height strictly greater than width once EXIF rotation is applied.
///
/// Squares and records without dimensions count as landscape.
pub fn is_portrait(record: &PhotoRecord) -> bool {
    let (width, height) = record.display_dimensions();
    width > 0 && height > 0 && height > width
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortraitPairing {
    pub enabled: bool,
    /// Records inspected per category before giving up.
    pub max_attempts: usize,
}

impl PortraitPairing {
    /// Turns the first draw into a selection, adding a second portrait when
    /// pairing applies and one can be found.
    ///
    /// The category of `first` is searched before the other one. Running out
    /// of candidates, or failing to refill a pool, degrades the tick to a
    /// single photo; the first draw is never lost.
    pub async fn pair(
        &self,
        first: PhotoRecord,
        pools: &mut PoolManager,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Selection {
        if !self.enabled || !is_portrait(&first) {
            return Selection::Single(first);
        }

        let attempts = self.max_attempts.max(1);
        for category in [first.category, first.category.other()] {
            match pools
                .next_portrait_from(category, &first.id, attempts, now, rng)
                .await
            {
                Ok(second) => return Selection::Dual(first, second),
                Err(SelectionError::Fetch(err)) => {
                    warn!(category = %category, "pairing refill failed: {err}");
                }
                Err(err) => {
                    debug!(category = %category, attempts, "no portrait partner: {err}");
                }
            }
        }
        Selection::Single(first)
    }
}
