use std::io::Cursor;

use anyhow::{Context, Result, anyhow, bail};
use fast_image_resize as fir;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage, imageops};
use tracing::debug;

use crate::processing::layout::{Resolution, cover_crop_origin, resize_to_cover, split_halves};

/// Decodes an image to RGBA8 and applies its EXIF orientation.
///
/// Missing or unreadable EXIF data leaves the pixels as stored.
pub fn decode_oriented(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .decode()
        .context("failed to decode image")?;
    let img = img.to_rgba8();

    let orientation = read_orientation(bytes).unwrap_or(1);
    Ok(match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    })
}

fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, "exif orientation");
    Some(orientation)
}

/// Scales `source` to cover `width`x`height` and crops the overflow
/// (centered horizontally, top-biased vertically).
pub fn cover_crop(source: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        bail!("crop dimensions must be positive");
    }
    let (scaled_w, scaled_h) = resize_to_cover(width, height, source.width(), source.height());
    let scaled = resize_rgba(source, scaled_w, scaled_h)?;
    let (x, y) = cover_crop_origin(scaled_w, scaled_h, width, height);
    Ok(imageops::crop_imm(&scaled, x, y, width, height).to_image())
}

/// Two images side by side, each cover-cropped into half of the frame.
pub fn side_by_side(left: &RgbaImage, right: &RgbaImage, size: Resolution) -> Result<RgbaImage> {
    let (left_w, right_w) = split_halves(size.width);
    if left_w == 0 {
        bail!("frame {size} is too narrow to split");
    }
    let left = cover_crop(left, left_w, size.height)?;
    let right = cover_crop(right, right_w, size.height)?;
    let mut canvas = RgbaImage::new(size.width, size.height);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(left_w), 0);
    Ok(canvas)
}

pub fn encode_jpeg(image: RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .context("failed to encode JPEG")?;
    Ok(out)
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
}
