use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::config::{Configuration, SelectionOptions};
use crate::error::SelectionError;
use crate::events::{PhotoRecord, Selection};
use crate::library::PhotoFetcher;
use crate::mix::{MixRatio, MixSelector};
use crate::pairing::PortraitPairing;
use crate::pool::{PoolManager, PoolOptions};
use crate::random::{RandomSource, StdRandom};

/// Decides what to show on each tick.
///
/// Rules:
/// - Pick a category with the mix ratio, then draw from that pool.
/// - If the chosen pool has nothing to offer, draw from the other one.
/// - Pairing runs after that fallback, so it searches the category the first
///   photo actually came from.
pub struct SelectionEngine {
    pools: PoolManager,
    mix: MixSelector,
    pairing: PortraitPairing,
    rng: Box<dyn RandomSource>,
}

impl SelectionEngine {
    pub fn new(
        fetcher: Arc<dyn PhotoFetcher>,
        options: &SelectionOptions,
        timezone: Tz,
        rng: Box<dyn RandomSource>,
    ) -> Result<Self> {
        let mix = MixSelector::new(MixRatio::new(options.mix_ratio)?);
        let pairing = PortraitPairing {
            enabled: options.dual_portrait,
            max_attempts: options.pairing_attempts,
        };
        let pools = PoolManager::new(fetcher, PoolOptions::from_selection(options, timezone));
        info!(
            mix_ratio = options.mix_ratio,
            recent_days = options.recent_days,
            memory_years = options.memory_years,
            favorites = ?options.favorites,
            dual_portrait = options.dual_portrait,
            "selection engine ready"
        );
        Ok(Self {
            pools,
            mix,
            pairing,
            rng,
        })
    }

    /// Builds an engine from a full configuration; `seed` overrides the
    /// configured seed.
    pub fn from_config(
        fetcher: Arc<dyn PhotoFetcher>,
        cfg: &Configuration,
        seed: Option<u64>,
    ) -> Result<Self> {
        let rng = StdRandom::from_seed_option(seed.or(cfg.seed));
        Self::new(fetcher, &cfg.selection, cfg.timezone(), Box::new(rng))
    }

    /// Force both pools to re-fetch on their next draw.
    pub fn invalidate(&mut self) {
        self.pools.invalidate();
    }

    /// First photo of a tick: ratio draw with fallback to the other category.
    pub async fn draw(&mut self, now: DateTime<Utc>) -> Result<PhotoRecord, SelectionError> {
        let chosen = self.mix.select_category(self.rng.as_mut());
        match self.pools.next_from(chosen, now, self.rng.as_mut()).await {
            Err(SelectionError::EmptyPool(_)) => {
                let fallback = chosen.other();
                debug!(chosen = %chosen, fallback = %fallback, "pool empty; falling back");
                self.pools.next_from(fallback, now, self.rng.as_mut()).await
            }
            other => other,
        }
    }

    /// Computes the selection for one tick.
    pub async fn advance(&mut self, now: DateTime<Utc>) -> Result<Selection, SelectionError> {
        let first = self.draw(now).await?;
        let selection = self
            .pairing
            .pair(first, &mut self.pools, now, self.rng.as_mut())
            .await;
        debug!(
            ids = ?selection.ids(),
            source = %selection.first().category,
            dual = selection.is_dual(),
            "selection advanced"
        );
        Ok(selection)
    }

    /// Hands the records of a selection that was never shown back to their
    /// pools, so the pass still covers them.
    pub fn requeue(&mut self, selection: &Selection) {
        self.pools.requeue(selection);
    }

    /// Runs `ticks` selections spaced `interval` apart starting at `start`,
    /// stopping at the first error.
    pub async fn plan(
        &mut self,
        start: DateTime<Utc>,
        ticks: usize,
        interval: Duration,
    ) -> Result<Vec<Selection>, SelectionError> {
        let step = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
        let mut plan = Vec::with_capacity(ticks);
        let mut now = start;
        for _ in 0..ticks {
            plan.push(self.advance(now).await?);
            now += step;
        }
        Ok(plan)
    }
}
