use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use futures::future::try_join_all;
use image::RgbaImage;
use tokio::task;
use tracing::debug;

use crate::attributes::frame_attributes;
use crate::events::{Frame, RenderedImage, Selection};
use crate::library::AssetSource;
use crate::processing::compose::{cover_crop, decode_oriented, encode_jpeg, side_by_side};
use crate::processing::layout::Resolution;

const CACHE_CAPACITY: usize = 16;

type CacheKey = (Vec<String>, Resolution);

/// Turns selections into frames: download, decode, compose and encode one
/// JPEG per configured resolution.
///
/// Encoded output is cached per (asset ids, resolution), so showing the same
/// selection again skips both the download and the encode.
pub struct FrameRenderer {
    assets: Arc<dyn AssetSource>,
    resolutions: Vec<Resolution>,
    jpeg_quality: u8,
    cache: HashMap<CacheKey, Arc<Vec<u8>>>,
    cache_order: VecDeque<CacheKey>,
}

impl FrameRenderer {
    pub fn new(assets: Arc<dyn AssetSource>, resolutions: Vec<Resolution>, jpeg_quality: u8) -> Self {
        Self {
            assets,
            resolutions,
            jpeg_quality,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
        }
    }

    pub async fn render(&mut self, selection: Selection, today: NaiveDate) -> Result<Frame> {
        let ids: Vec<String> = selection.ids().into_iter().map(str::to_owned).collect();
        let missing: Vec<Resolution> = self
            .resolutions
            .iter()
            .copied()
            .filter(|res| !self.cache.contains_key(&(ids.clone(), *res)))
            .collect();

        if !missing.is_empty() {
            let downloads = ids.iter().map(|id| {
                let assets = Arc::clone(&self.assets);
                async move {
                    assets
                        .download(id)
                        .await
                        .with_context(|| format!("failed to download asset {id}"))
                }
            });
            let originals = try_join_all(downloads).await?;
            let quality = self.jpeg_quality;
            let targets = missing.clone();
            let encoded = task::spawn_blocking(move || -> Result<Vec<Vec<u8>>> {
                let decoded = originals
                    .iter()
                    .map(|bytes| decode_oriented(bytes))
                    .collect::<Result<Vec<_>>>()?;
                targets
                    .iter()
                    .map(|res| encode_jpeg(compose(&decoded, *res)?, quality))
                    .collect()
            })
            .await
            .map_err(|err| anyhow!("render task failed: {err}"))??;

            for (res, jpeg) in missing.into_iter().zip(encoded) {
                debug!(ids = ?ids, resolution = %res, bytes = jpeg.len(), "rendered");
                self.remember((ids.clone(), res), Arc::new(jpeg));
            }
        }

        let images = self
            .resolutions
            .iter()
            .map(|res| {
                self.cache
                    .get(&(ids.clone(), *res))
                    .map(|jpeg| RenderedImage {
                        resolution: *res,
                        jpeg: Arc::clone(jpeg),
                    })
                    .ok_or_else(|| anyhow!("no rendered image for {res}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let assets = Arc::clone(&self.assets);
        let attributes = frame_attributes(&selection, today, |id| assets.asset_url(id));
        Ok(Frame {
            selection,
            images,
            attributes,
            rendered_at: Instant::now(),
        })
    }

    fn remember(&mut self, key: CacheKey, jpeg: Arc<Vec<u8>>) {
        if self.cache.insert(key.clone(), jpeg).is_none() {
            self.cache_order.push_back(key);
        }
        while self.cache_order.len() > CACHE_CAPACITY {
            if let Some(oldest) = self.cache_order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
    }
}

fn compose(decoded: &[RgbaImage], res: Resolution) -> Result<RgbaImage> {
    match decoded {
        [single] => cover_crop(single, res.width, res.height),
        [left, right] => side_by_side(left, right, res),
        other => Err(anyhow!("cannot compose {} images", other.len())),
    }
}
