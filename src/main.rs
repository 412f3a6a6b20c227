use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use humantime::{format_rfc3339, parse_rfc3339};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use immich_slideshow::config::Configuration;
use immich_slideshow::engine::SelectionEngine;
use immich_slideshow::events::{Frame, Selection, SlideshowCommand};
use immich_slideshow::library::ImmichClient;
use immich_slideshow::tasks;
use immich_slideshow::tasks::slideshow::{Clock, IntervalTicks, Slideshow};

#[derive(Debug, Parser)]
#[command(
    name = "immich-slideshow",
    version,
    about = "Rotating Immich slideshow with recent photos and memories"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Pretend the slideshow starts at this RFC 3339 instant
    #[arg(long = "now", value_name = "RFC3339")]
    now: Option<String>,
    /// Print the next N selections without rendering anything
    #[arg(long = "dry-run", value_name = "TICKS")]
    dry_run: Option<usize>,
    /// Deterministic RNG seed (overrides `seed` in the config)
    #[arg(long = "seed", value_name = "SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        now,
        dry_run,
        seed,
    } = Args::parse();

    let now_override: Option<DateTime<Utc>> = match now {
        Some(ts) => Some(parse_rfc3339(&ts).context("failed to parse --now")?.into()),
        None => None,
    };

    let cfg = load_config(&config)?;
    tracing::info!(
        url = %cfg.library.url,
        resolutions = cfg.resolutions.len(),
        interval = ?cfg.refresh_interval,
        "loaded configuration from {}",
        config.display()
    );

    let client = Arc::new(ImmichClient::new(&cfg.library).context("failed to build HTTP client")?);
    if !client
        .authenticate()
        .await
        .context("failed to reach the Immich server")?
    {
        bail!("Immich rejected the configured API key");
    }

    if let Some(ticks) = dry_run {
        let start = now_override.unwrap_or_else(Utc::now);
        return run_dry_run(&cfg, client, start, ticks, seed).await;
    }

    let clock = now_override.map_or_else(Clock::system, Clock::starting_at);
    let slideshow = Slideshow::new(&cfg, client.clone(), client, clock, seed)?;

    let (control_tx, control_rx) = mpsc::channel::<SlideshowCommand>(8);
    let (frames_tx, mut frames_rx) = watch::channel::<Option<Arc<Frame>>>(None);
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = control_tx.clone();
        let config_path = config.clone();
        let library = cfg.library.clone();
        tokio::spawn(async move {
            match signal(SignalKind::hangup()) {
                Ok(mut sighup) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sighup.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGHUP received; reloading configuration");
                            let reloaded = match load_config(&config_path) {
                                Ok(cfg) => cfg,
                                Err(err) => {
                                    tracing::warn!("keeping current configuration: {err:#}");
                                    continue;
                                }
                            };
                            if reloaded.library != library {
                                tracing::warn!("library settings changed; restart to apply them");
                            }
                            if let Err(err) = control.send(SlideshowCommand::Reconfigure(Box::new(reloaded))).await {
                                tracing::warn!("failed to forward reconfiguration: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGHUP handler: {err}"),
            }
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = control_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; refreshing pools");
                            if let Err(err) = control.send(SlideshowCommand::RefreshPools).await {
                                tracing::warn!("failed to forward pool refresh: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    let to_output = if cfg.output.write_files {
        let (output_tx, output_rx) = mpsc::channel::<Arc<Frame>>(4);
        tasks.spawn({
            let options = cfg.output.clone();
            let cancel = cancel.clone();
            async move {
                tasks::output::run(options, output_rx, cancel)
                    .await
                    .context("output task failed")
            }
        });
        Some(output_tx)
    } else {
        None
    };

    tasks.spawn({
        let ticks = IntervalTicks::new(cfg.refresh_interval);
        let cancel = cancel.clone();
        async move {
            tasks::slideshow::run(slideshow, ticks, control_rx, frames_tx, to_output, cancel)
                .await
                .context("slideshow task failed")
        }
    });

    // held so the control channel stays open while the slideshow runs
    let _control = control_tx;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = frames_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(frame) = frames_rx.borrow_and_update().as_ref() {
                    tracing::debug!(attributes = %serde_json::Value::Object(frame.attributes.clone()), "current frame");
                }
            }
        }
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Configuration> {
    Configuration::from_yaml_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?
        .validated()
        .context("invalid configuration values")
}

async fn run_dry_run(
    cfg: &Configuration,
    client: Arc<ImmichClient>,
    start: DateTime<Utc>,
    ticks: usize,
    seed: Option<u64>,
) -> Result<()> {
    let mut engine = SelectionEngine::from_config(client, cfg, seed)?;
    let plan = engine.plan(start, ticks, cfg.refresh_interval).await?;

    println!(
        "# selection dry run\n# now: {}\n# ticks: {}\n# mix-ratio: {}\n# seed: {}\n",
        format_rfc3339(start.into()),
        ticks,
        cfg.selection.mix_ratio,
        seed.or(cfg.seed)
            .map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    if plan.is_empty() {
        println!("(nothing to show)");
        return Ok(());
    }
    for (idx, selection) in plan.iter().enumerate() {
        println!("  {:>4}: {}", idx + 1, describe(selection));
    }
    Ok(())
}

fn describe(selection: &Selection) -> String {
    selection
        .slots()
        .map(|(_, record)| {
            let name = record.file_name.as_deref().unwrap_or(&record.id);
            match record.memory_year {
                Some(year) => format!("[{} {year}] {name}", record.category),
                None => format!("[{}] {name}", record.category),
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
