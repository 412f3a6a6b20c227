use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::config::SelectionOptions;
use crate::error::{FetchError, SelectionError};
use crate::events::{Category, PhotoRecord, Selection};
use crate::filter::CandidateFilter;
use crate::library::{MemoryQuery, PhotoFetcher, RecentQuery};
use crate::pairing::is_portrait;
use crate::random::{RandomSource, shuffle};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub filter: CandidateFilter,
    pub recent_fetch_count: usize,
    pub recent_refresh: Option<Duration>,
    pub memory_refresh: Option<Duration>,
    pub empty_retry: Duration,
    pub timezone: Tz,
}

impl PoolOptions {
    pub fn from_selection(options: &SelectionOptions, timezone: Tz) -> Self {
        Self {
            filter: CandidateFilter::from(options),
            recent_fetch_count: options.recent_fetch_count,
            recent_refresh: options.recent_refresh,
            memory_refresh: options.memory_refresh,
            empty_retry: options.empty_retry,
            timezone,
        }
    }

    fn refresh_for(&self, category: Category) -> Option<Duration> {
        match category {
            Category::Recent => self.recent_refresh,
            Category::Memory => self.memory_refresh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Initial,
    Forced,
    CycleExhausted,
    Expired,
    DayChanged,
    EmptyRetry,
}

/// One no-repeat rotation: records of the current pass plus a cursor.
#[derive(Debug, Clone)]
pub struct Pool {
    category: Category,
    records: Vec<PhotoRecord>,
    cursor: usize,
    last_served: Option<String>,
    built_at: Option<DateTime<Utc>>,
    built_for: Option<NaiveDate>,
    stale: bool,
}

impl Pool {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            records: Vec::new(),
            cursor: 0,
            last_served: None,
            built_at: None,
            built_for: None,
            stale: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records not yet served in the current pass.
    pub fn remaining(&self) -> usize {
        self.records.len().saturating_sub(self.cursor)
    }

    pub fn last_served(&self) -> Option<&str> {
        self.last_served.as_deref()
    }

    /// Order of the current pass, served and unserved.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    fn rebuild_reason(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
        refresh: Option<Duration>,
        empty_retry: Duration,
    ) -> Option<RebuildReason> {
        let Some(built_at) = self.built_at else {
            return Some(RebuildReason::Initial);
        };
        if self.stale {
            return Some(RebuildReason::Forced);
        }
        if self.category == Category::Memory && self.built_for != Some(today) {
            return Some(RebuildReason::DayChanged);
        }
        let age = (now - built_at).to_std().unwrap_or_default();
        if self.records.is_empty() {
            return (age >= empty_retry).then_some(RebuildReason::EmptyRetry);
        }
        if self.cursor >= self.records.len() {
            return Some(RebuildReason::CycleExhausted);
        }
        match refresh {
            Some(period) if age >= period => Some(RebuildReason::Expired),
            _ => None,
        }
    }

    /// Starts a new pass over `records` in random order.
    ///
    /// Duplicate ids are dropped, and the pass never opens with the record
    /// served last when there is an alternative.
    pub fn install(
        &mut self,
        records: Vec<PhotoRecord>,
        rng: &mut dyn RandomSource,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) {
        let mut seen = HashSet::new();
        let mut records: Vec<PhotoRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        shuffle(&mut records, rng);
        if records.len() > 1
            && self
                .last_served
                .as_deref()
                .is_some_and(|last| records[0].id == last)
        {
            let swap_with = 1 + rng.next_below(records.len() - 1);
            records.swap(0, swap_with);
        }
        self.records = records;
        self.cursor = 0;
        self.built_at = Some(now);
        self.built_for = Some(today);
        self.stale = false;
    }

    pub fn take_next(&mut self) -> Option<PhotoRecord> {
        let record = self.records.get(self.cursor)?.clone();
        self.cursor += 1;
        self.last_served = Some(record.id.clone());
        Some(record)
    }

    /// Serves the first portrait among the next `max_attempts` unserved
    /// records. Skipped records stay in the pass.
    pub fn take_portrait(&mut self, exclude_id: &str, max_attempts: usize) -> Option<PhotoRecord> {
        let end = self.records.len().min(self.cursor.saturating_add(max_attempts));
        let window = self.cursor..end;
        let found = self.records[window]
            .iter()
            .position(|r| r.id != exclude_id && is_portrait(r))?;
        self.records.swap(self.cursor, self.cursor + found);
        self.take_next()
    }

    /// Puts `id` back at the cursor if it was the last record served from
    /// this pass. Returns whether the cursor moved.
    pub fn requeue(&mut self, id: &str) -> bool {
        let Some(previous) = self.cursor.checked_sub(1) else {
            return false;
        };
        if self.records[previous].id != id {
            return false;
        }
        self.cursor = previous;
        true
    }
}

/// Owns the recent and memory rotations and refills them from the fetcher.
pub struct PoolManager {
    fetcher: Arc<dyn PhotoFetcher>,
    options: PoolOptions,
    recent: Pool,
    memory: Pool,
}

impl PoolManager {
    pub fn new(fetcher: Arc<dyn PhotoFetcher>, options: PoolOptions) -> Self {
        Self {
            fetcher,
            options,
            recent: Pool::new(Category::Recent),
            memory: Pool::new(Category::Memory),
        }
    }

    pub fn pool(&self, category: Category) -> &Pool {
        match category {
            Category::Recent => &self.recent,
            Category::Memory => &self.memory,
        }
    }

    fn pool_mut(&mut self, category: Category) -> &mut Pool {
        match category {
            Category::Recent => &mut self.recent,
            Category::Memory => &mut self.memory,
        }
    }

    /// Returns the records of `selection` to their passes, newest draw first.
    pub fn requeue(&mut self, selection: &Selection) {
        for record in [selection.second(), Some(selection.first())].into_iter().flatten() {
            if self.pool_mut(record.category).requeue(&record.id) {
                debug!(id = %record.id, category = %record.category, "record requeued");
            }
        }
    }

    /// Force both pools to re-fetch on their next draw.
    pub fn invalidate(&mut self) {
        self.recent.invalidate();
        self.memory.invalidate();
    }

    /// Next record of `category`'s pass, rebuilding the pool first if needed.
    pub async fn next_from(
        &mut self,
        category: Category,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Result<PhotoRecord, SelectionError> {
        self.ensure_ready(category, now, rng).await?;
        self.pool_mut(category)
            .take_next()
            .ok_or(SelectionError::EmptyPool(category))
    }

    /// Next portrait of `category` other than `exclude_id`, inspecting at most
    /// `max_attempts` records of the pass.
    pub async fn next_portrait_from(
        &mut self,
        category: Category,
        exclude_id: &str,
        max_attempts: usize,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Result<PhotoRecord, SelectionError> {
        self.ensure_ready(category, now, rng).await?;
        let pool = self.pool_mut(category);
        if pool.is_empty() {
            return Err(SelectionError::EmptyPool(category));
        }
        pool.take_portrait(exclude_id, max_attempts)
            .ok_or(SelectionError::PairingExhausted {
                attempts: max_attempts,
            })
    }

    async fn ensure_ready(
        &mut self,
        category: Category,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Result<(), SelectionError> {
        let local_now = now.with_timezone(&self.options.timezone).naive_local();
        let today = local_now.date();
        let refresh = self.options.refresh_for(category);
        let reason =
            self.pool(category)
                .rebuild_reason(now, today, refresh, self.options.empty_retry);
        let Some(reason) = reason else {
            return if self.pool(category).is_empty() {
                Err(SelectionError::EmptyPool(category))
            } else {
                Ok(())
            };
        };

        let fetched = self.fetch(category, now, local_now).await?;
        let total = fetched.len();
        let filter = self.options.filter;
        let accepted: Vec<PhotoRecord> = fetched
            .into_iter()
            .filter(|r| match category {
                Category::Recent => filter.accepts_recent(r, local_now),
                Category::Memory => filter.accepts_memory(r, today),
            })
            .map(|mut r| {
                r.category = category;
                r
            })
            .collect();
        let pool = self.pool_mut(category);
        pool.install(accepted, rng, now, today);

        match reason {
            RebuildReason::CycleExhausted | RebuildReason::EmptyRetry => debug!(
                category = %category,
                fetched = total,
                pooled = pool.len(),
                reason = ?reason,
                "pool rebuilt"
            ),
            _ => info!(
                category = %category,
                fetched = total,
                pooled = pool.len(),
                reason = ?reason,
                "pool rebuilt"
            ),
        }

        if pool.is_empty() {
            return Err(SelectionError::EmptyPool(category));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        category: Category,
        now: DateTime<Utc>,
        local_now: NaiveDateTime,
    ) -> Result<Vec<PhotoRecord>, FetchError> {
        let filter = self.options.filter;
        match category {
            Category::Recent => {
                let query = RecentQuery {
                    days: filter.recent_days,
                    favorites: filter.favorites,
                    count: self.options.recent_fetch_count,
                    until: now,
                };
                self.fetcher.fetch_recent(&query).await
            }
            Category::Memory => {
                let query = MemoryQuery {
                    years: filter.memory_years,
                    favorites: filter.favorites,
                    on: local_now.date(),
                };
                self.fetcher.fetch_memories(&query).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FavoritesFilter;
    use crate::library::InMemoryLibrary;
    use crate::random::{SequenceRandom, StdRandom};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn recent(id: &str) -> PhotoRecord {
        let taken = NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        PhotoRecord::new(id, taken, Category::Recent).with_dimensions(4000, 3000)
    }

    fn options() -> PoolOptions {
        PoolOptions {
            filter: CandidateFilter {
                recent_days: 90,
                memory_years: 0,
                favorites: FavoritesFilter::All,
            },
            recent_fetch_count: 100,
            recent_refresh: Some(Duration::from_secs(6 * 3600)),
            memory_refresh: None,
            empty_retry: Duration::from_secs(300),
            timezone: Tz::UTC,
        }
    }

    #[test]
    fn install_avoids_repeating_last_served_at_boundary() {
        let mut pool = Pool::new(Category::Recent);
        pool.last_served = Some("a".into());
        // Identity shuffle keeps "a" first, then the swap draw picks index 1 + 0.
        let mut rng = SequenceRandom::new(vec![0.99, 0.99, 0.0]);
        pool.install(
            vec![recent("a"), recent("b"), recent("c")],
            &mut rng,
            now(),
            now().date_naive(),
        );
        assert_eq!(pool.order().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn install_drops_duplicate_ids() {
        let mut pool = Pool::new(Category::Recent);
        pool.install(
            vec![recent("a"), recent("a"), recent("b")],
            &mut StdRandom::seeded(1),
            now(),
            now().date_naive(),
        );
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn take_portrait_keeps_skipped_records() {
        let mut pool = Pool::new(Category::Recent);
        let portrait = recent("p").with_dimensions(3000, 4000);
        pool.records = vec![recent("l1"), recent("l2"), portrait];
        pool.built_at = Some(now());

        assert!(pool.take_portrait("x", 2).is_none());
        let found = pool.take_portrait("x", 3).unwrap();
        assert_eq!(found.id, "p");
        assert_eq!(pool.remaining(), 2);
        let rest: Vec<_> = std::iter::from_fn(|| pool.take_next())
            .map(|r| r.id)
            .collect();
        assert_eq!(rest.len(), 2);
        assert!(rest.contains(&"l1".to_string()) && rest.contains(&"l2".to_string()));
    }

    #[test]
    fn take_portrait_clamps_huge_attempt_counts() {
        let mut pool = Pool::new(Category::Recent);
        pool.records = vec![recent("l1"), recent("p").with_dimensions(3000, 4000)];
        pool.built_at = Some(now());
        pool.take_next();

        let found = pool.take_portrait("x", usize::MAX).unwrap();
        assert_eq!(found.id, "p");
        assert!(pool.take_portrait("x", usize::MAX).is_none());
    }

    #[test]
    fn requeue_only_rewinds_the_last_draw() {
        let mut pool = Pool::new(Category::Recent);
        pool.records = vec![recent("a"), recent("b"), recent("c")];
        pool.built_at = Some(now());

        assert!(!pool.requeue("a"));
        pool.take_next();
        pool.take_next();
        assert!(!pool.requeue("a"));
        assert!(pool.requeue("b"));
        assert_eq!(pool.remaining(), 2);
        assert_eq!(pool.take_next().unwrap().id, "b");
    }

    #[tokio::test]
    async fn expired_pool_is_refetched() {
        let library = Arc::new(InMemoryLibrary::new(
            vec![recent("a"), recent("b"), recent("c")],
            vec![],
        ));
        let mut manager = PoolManager::new(library.clone(), options());
        let mut rng = StdRandom::seeded(3);

        manager
            .next_from(Category::Recent, now(), &mut rng)
            .await
            .unwrap();
        assert_eq!(library.recent_fetches(), 1);

        let later = now() + chrono::Duration::hours(7);
        manager
            .next_from(Category::Recent, later, &mut rng)
            .await
            .unwrap();
        assert_eq!(library.recent_fetches(), 2);
    }

    #[tokio::test]
    async fn empty_category_waits_before_refetching() {
        let library = Arc::new(InMemoryLibrary::new(vec![recent("a")], vec![]));
        let mut manager = PoolManager::new(library.clone(), options());
        let mut rng = StdRandom::seeded(3);

        for _ in 0..3 {
            let err = manager
                .next_from(Category::Memory, now(), &mut rng)
                .await
                .unwrap_err();
            assert!(matches!(err, SelectionError::EmptyPool(Category::Memory)));
        }
        assert_eq!(library.memory_fetches(), 1);

        let later = now() + chrono::Duration::minutes(6);
        let _ = manager.next_from(Category::Memory, later, &mut rng).await;
        assert_eq!(library.memory_fetches(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_pool_untouched() {
        let library = Arc::new(InMemoryLibrary::new(vec![recent("a")], vec![]));
        let mut manager = PoolManager::new(library.clone(), options());
        let mut rng = StdRandom::seeded(3);

        library.set_failing(true);
        let err = manager
            .next_from(Category::Recent, now(), &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::Fetch(_)));

        library.set_failing(false);
        let record = manager
            .next_from(Category::Recent, now(), &mut rng)
            .await
            .unwrap();
        assert_eq!(record.id, "a");
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let library = Arc::new(InMemoryLibrary::new(
            vec![recent("a"), recent("b")],
            vec![],
        ));
        let mut manager = PoolManager::new(library.clone(), options());
        let mut rng = StdRandom::seeded(5);

        manager
            .next_from(Category::Recent, now(), &mut rng)
            .await
            .unwrap();
        manager.invalidate();
        manager
            .next_from(Category::Recent, now(), &mut rng)
            .await
            .unwrap();
        assert_eq!(library.recent_fetches(), 2);
    }
}
