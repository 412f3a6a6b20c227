use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::engine::SelectionEngine;
use crate::events::{Frame, SlideshowCommand};
use crate::library::{AssetSource, PhotoFetcher};
use crate::render::FrameRenderer;

/// Source of refresh ticks. Returns `false` once no more ticks will come.
pub trait TickSource: Send {
    fn tick(&mut self) -> impl Future<Output = bool> + Send;

    /// Called after a reconfiguration with the new refresh interval.
    fn reset(&mut self, _period: Duration) {}
}

/// Wall-clock ticks. Overdue ticks are delayed rather than bursted.
pub struct IntervalTicks(Interval);

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self(ticks)
    }
}

impl TickSource for IntervalTicks {
    async fn tick(&mut self) -> bool {
        self.0.tick().await;
        true
    }

    fn reset(&mut self, period: Duration) {
        *self = Self::new(period);
    }
}

impl TickSource for mpsc::Receiver<()> {
    async fn tick(&mut self) -> bool {
        self.recv().await.is_some()
    }
}

/// Current time, optionally shifted so the slideshow believes it started at
/// a chosen instant.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: TimeDelta,
}

impl Clock {
    pub fn system() -> Self {
        Self {
            offset: TimeDelta::zero(),
        }
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            offset: start - Utc::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }
}

/// Engine plus renderer for the current configuration.
pub struct Slideshow {
    fetcher: Arc<dyn PhotoFetcher>,
    assets: Arc<dyn AssetSource>,
    clock: Clock,
    seed: Option<u64>,
    timezone: Tz,
    engine: SelectionEngine,
    renderer: FrameRenderer,
}

impl Slideshow {
    /// `seed` overrides the configured seed, including across reconfigurations.
    pub fn new(
        cfg: &Configuration,
        fetcher: Arc<dyn PhotoFetcher>,
        assets: Arc<dyn AssetSource>,
        clock: Clock,
        seed: Option<u64>,
    ) -> Result<Self> {
        let engine = SelectionEngine::from_config(Arc::clone(&fetcher), cfg, seed)?;
        let renderer = FrameRenderer::new(
            Arc::clone(&assets),
            cfg.resolutions.clone(),
            cfg.output.jpeg_quality,
        );
        Ok(Self {
            fetcher,
            assets,
            clock,
            seed,
            timezone: cfg.timezone(),
            engine,
            renderer,
        })
    }

    /// Replaces engine and renderer; pools start empty and refill lazily.
    pub fn reconfigure(&mut self, cfg: &Configuration) -> Result<()> {
        let rebuilt = Self::new(
            cfg,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.assets),
            self.clock,
            self.seed,
        )?;
        *self = rebuilt;
        Ok(())
    }

    pub fn refresh_pools(&mut self) {
        self.engine.invalidate();
    }

    /// Selects and renders one frame. Records of a frame that fails to
    /// render go back to their pools.
    pub async fn tick(&mut self) -> Result<Frame> {
        let now = self.clock.now();
        let selection = self
            .engine
            .advance(now)
            .await
            .context("selection failed")?;
        let today = now.with_timezone(&self.timezone).date_naive();
        match self.renderer.render(selection.clone(), today).await {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.engine.requeue(&selection);
                Err(err)
            }
        }
    }
}

enum TickOutcome {
    Rendered(Result<Frame>),
    Interrupted(SlideshowCommand),
}

/// Drives the slideshow until cancelled or the tick source runs dry.
///
/// Every rendered frame is published on `frames` and, when present, handed
/// to `to_output`. A failed tick leaves the previous frame published. A
/// command that arrives while a tick is in flight abandons that tick.
pub async fn run<T: TickSource>(
    mut slideshow: Slideshow,
    mut ticks: T,
    mut control: Receiver<SlideshowCommand>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    to_output: Option<Sender<Arc<Frame>>>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("slideshow started");
    loop {
        let more = select! {
            _ = cancel.cancelled() => break,
            Some(cmd) = control.recv() => {
                apply(&mut slideshow, &mut ticks, cmd);
                continue;
            }
            more = ticks.tick() => more,
        };
        if !more {
            debug!("tick source closed");
            break;
        }

        let outcome = select! {
            _ = cancel.cancelled() => break,
            Some(cmd) = control.recv() => TickOutcome::Interrupted(cmd),
            rendered = slideshow.tick() => TickOutcome::Rendered(rendered),
        };

        match outcome {
            TickOutcome::Rendered(Ok(frame)) => {
                let frame = Arc::new(frame);
                info!(
                    ids = ?frame.selection.ids(),
                    source = %frame.selection.first().category,
                    dual = frame.selection.is_dual(),
                    "frame published"
                );
                frames.send_replace(Some(Arc::clone(&frame)));
                if let Some(tx) = &to_output {
                    if let Err(err) = tx.try_send(frame) {
                        warn!("frame writer is not keeping up: {err}");
                    }
                }
            }
            TickOutcome::Rendered(Err(err)) => {
                warn!("tick failed; keeping previous frame: {err:#}");
            }
            TickOutcome::Interrupted(cmd) => {
                info!("tick abandoned by control command");
                apply(&mut slideshow, &mut ticks, cmd);
            }
        }
    }
    info!("slideshow stopped");
    Ok(())
}

fn apply<T: TickSource>(slideshow: &mut Slideshow, ticks: &mut T, cmd: SlideshowCommand) {
    match cmd {
        SlideshowCommand::Reconfigure(cfg) => match slideshow.reconfigure(&cfg) {
            Ok(()) => {
                ticks.reset(cfg.refresh_interval);
                info!("slideshow reconfigured");
            }
            Err(err) => warn!("reconfiguration rejected; keeping current settings: {err:#}"),
        },
        SlideshowCommand::RefreshPools => {
            slideshow.refresh_pools();
            info!("pools invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_requested_instant() {
        let start = DateTime::parse_from_rfc3339("2020-02-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = Clock::starting_at(start);
        let drift = clock.now() - start;
        assert!(drift >= TimeDelta::zero());
        assert!(drift < TimeDelta::seconds(5));
    }

    #[tokio::test]
    async fn channel_ticks_end_when_sender_drops() {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        tx.send(()).await.unwrap();
        drop(tx);
        assert!(TickSource::tick(&mut rx).await);
        assert!(!TickSource::tick(&mut rx).await);
    }
}
