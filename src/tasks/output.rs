use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tokio::sync::mpsc::Receiver;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::OutputOptions;
use crate::events::Frame;
use crate::processing::layout::Resolution;

const FILE_PREFIX: &str = "immich_";

/// Writes every frame received into the output directory, one JPEG per
/// resolution, and prunes older files beyond `keep`.
#[instrument(skip_all, fields(dir = %options.directory.display()))]
pub async fn run(
    options: OutputOptions,
    mut frames: Receiver<Arc<Frame>>,
    cancel: CancellationToken,
) -> Result<()> {
    info!(keep = options.keep, "frame writer started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = frames.recv() => {
                let Some(frame) = maybe else { break };
                let options = options.clone();
                match task::spawn_blocking(move || write_frame(&options, &frame)).await {
                    Ok(Ok(paths)) => debug!(written = paths.len(), "frame files written"),
                    Ok(Err(err)) => warn!("failed to write frame: {err:#}"),
                    Err(err) => warn!("frame writer task failed: {err}"),
                }
            }
        }
    }
    info!("frame writer stopped");
    Ok(())
}

/// Writes the frame's images and prunes each resolution down to `keep` files.
pub fn write_frame(options: &OutputOptions, frame: &Frame) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&options.directory)
        .with_context(|| format!("failed to create {}", options.directory.display()))?;
    let mut written = Vec::with_capacity(frame.images.len());
    for image in &frame.images {
        let path = next_path(&options.directory, image.resolution);
        fs::write(&path, image.jpeg.as_slice())
            .with_context(|| format!("failed to write {}", path.display()))?;
        prune(&options.directory, image.resolution, options.keep)?;
        written.push(path);
    }
    Ok(written)
}

fn next_path(dir: &Path, res: Resolution) -> PathBuf {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let path = dir.join(format!("{FILE_PREFIX}{res}_{millis}.jpg"));
        if !path.exists() {
            return path;
        }
        millis += 1;
    }
}

/// Removes the oldest frame files of `res`, keeping the newest `keep`.
pub fn prune(dir: &Path, res: Resolution, keep: usize) -> Result<usize> {
    let prefix = format!("{FILE_PREFIX}{res}_");
    let mut files: Vec<(SystemTime, PathBuf)> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.starts_with(&prefix) && name.ends_with(".jpg")
        })
        .map(|e| {
            let modified = e
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.into_path())
        })
        .collect();
    if files.len() <= keep {
        return Ok(0);
    }
    // newest first; the millisecond stamp in the name breaks mtime ties
    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| stamp(&b.1).cmp(&stamp(&a.1))));
    let mut removed = 0;
    for (_, path) in files.into_iter().skip(keep) {
        fs::remove_file(&path)
            .map_err(|err| anyhow!("failed to remove {}: {err}", path.display()))?;
        debug!(path = %path.display(), "pruned frame file");
        removed += 1;
    }
    Ok(removed)
}

fn stamp(path: &Path) -> i64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
