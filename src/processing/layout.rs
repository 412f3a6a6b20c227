use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, ensure};
use tracing::warn;

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("resolution {s:?} must look like WIDTHxHEIGHT"))?;
        let width: u32 = w
            .trim()
            .parse()
            .with_context(|| format!("invalid width in {s:?}"))?;
        let height: u32 = h
            .trim()
            .parse()
            .with_context(|| format!("invalid height in {s:?}"))?;
        ensure!(width > 0 && height > 0, "resolution {s:?} must be non-zero");
        Ok(Self { width, height })
    }
}

/// Parses `"1920x1080, 2048x1536"`; malformed entries are skipped.
pub fn parse_resolutions(input: &str) -> Vec<Resolution> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(res) => Some(res),
            Err(err) => {
                warn!(entry, "ignoring resolution: {err:#}");
                None
            }
        })
        .collect()
}

/// Size that covers `canvas` while keeping the source aspect ratio.
pub fn resize_to_cover(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas_w.max(1) as f64;
    let ch = canvas_h.max(1) as f64;
    let scale = (cw / iw).max(ch / ih);
    let w = (iw * scale).round().max(cw);
    let h = (ih * scale).round().max(ch);
    (w as u32, h as u32)
}

/// Crop origin inside a covering image: centered horizontally, biased toward
/// the top vertically so faces in portraits stay in frame.
pub fn cover_crop_origin(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = inner_w.saturating_sub(outer_w) / 2;
    let oy = (inner_h.saturating_sub(outer_h) as f64 * TOP_BIAS) as u32;
    (ox, oy)
}

const TOP_BIAS: f64 = 0.3;

/// Widths of the left and right panels of a side-by-side frame.
pub fn split_halves(width: u32) -> (u32, u32) {
    let left = width / 2;
    (left, width - left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_list() {
        let parsed = parse_resolutions("1920x1080, 2048x1536 ,bogus, 0x10");
        assert_eq!(
            parsed,
            vec![Resolution::new(1920, 1080), Resolution::new(2048, 1536)]
        );
    }

    #[test]
    fn cover_fills_both_axes() {
        // portrait 3000x4000 into half of a 1920x1080 frame
        let (w, h) = resize_to_cover(960, 1080, 3000, 4000);
        assert_eq!((w, h), (960, 1280));
        let (w, h) = resize_to_cover(1920, 1080, 4000, 3000);
        assert_eq!((w, h), (1920, 1440));
    }

    #[test]
    fn crop_origin_is_top_biased() {
        assert_eq!(cover_crop_origin(960, 1280, 960, 1080), (0, 60));
        assert_eq!(cover_crop_origin(1940, 1080, 1920, 1080), (10, 0));
    }

    #[test]
    fn odd_widths_keep_every_column() {
        assert_eq!(split_halves(1921), (960, 961));
    }
}
