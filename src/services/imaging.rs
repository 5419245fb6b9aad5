//! Image loading, orientation, cropping, and thumbnail persistence.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open an image with its EXIF orientation applied, as RGB.
pub fn load_oriented(path: &Path) -> Result<RgbImage, ImagingError> {
    let img = image::open(path)
        .map_err(|source| ImagingError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgb8();
    Ok(apply_orientation(img, read_orientation(path)))
}

/// Read the EXIF orientation tag, defaulting to 1 (upright) when absent.
fn read_orientation(path: &Path) -> u16 {
    let Ok(file) = File::open(path) else {
        return 1;
    };
    let mut reader = std::io::BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|v| v as u16)
        .unwrap_or(1)
}

fn apply_orientation(img: RgbImage, orientation: u16) -> RgbImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

/// Downscale so the long edge is at most `max_edge`; smaller images pass
/// through untouched.
pub fn ensure_max_edge(img: RgbImage, max_edge: u32) -> RgbImage {
    if max_edge == 0 {
        return img;
    }
    let (w, h) = img.dimensions();
    let long_edge = w.max(h);
    if long_edge <= max_edge {
        return img;
    }
    let scale = f64::from(max_edge) / f64::from(long_edge);
    let new_w = (f64::from(w) * scale).round() as u32;
    let new_h = (f64::from(h) * scale).round() as u32;
    imageops::resize(&img, new_w.max(1), new_h.max(1), FilterType::Lanczos3)
}

/// Crop a face region with a fractional margin and return a square image
/// with edge `max(w, h)` of the original box.
pub fn crop_face(img: &RgbImage, bbox: (i32, i32, i32, i32), margin: f32) -> RgbImage {
    let (x, y, w, h) = bbox;
    let cx = x as f32 + w as f32 / 2.0;
    let cy = y as f32 + h as f32 / 2.0;
    let size = (w.max(h) as f32) * (1.0 + margin);
    let half = size / 2.0;

    let left = (cx - half).max(0.0) as u32;
    let upper = (cy - half).max(0.0) as u32;
    let right = ((cx + half) as u32).min(img.width());
    let lower = ((cy + half) as u32).min(img.height());
    let crop_w = right.saturating_sub(left).max(1);
    let crop_h = lower.saturating_sub(upper).max(1);

    let cropped = imageops::crop_imm(img, left, upper, crop_w, crop_h).to_image();
    let edge = (w.max(h).max(1)) as u32;
    fit_square(&cropped, edge)
}

/// Scale and center-crop to a square of the given edge (cover fit).
fn fit_square(img: &RgbImage, edge: u32) -> RgbImage {
    DynamicImage::ImageRgb8(img.clone())
        .resize_to_fill(edge, edge, FilterType::Lanczos3)
        .into_rgb8()
}

/// Persist a square photo thumbnail under `<static>/thumbs/<id>.jpg`.
pub fn save_photo_thumbnail(
    static_dir: &Path,
    photo_id: Uuid,
    img: &RgbImage,
    edge: u32,
    quality: u8,
) -> Result<PathBuf, ImagingError> {
    save_square_jpeg(&static_dir.join("thumbs"), photo_id, img, edge, quality)
}

/// Persist a square face thumbnail under `<static>/faces/<id>.jpg`.
pub fn save_face_thumbnail(
    static_dir: &Path,
    face_id: Uuid,
    img: &RgbImage,
    edge: u32,
    quality: u8,
) -> Result<PathBuf, ImagingError> {
    save_square_jpeg(&static_dir.join("faces"), face_id, img, edge, quality)
}

fn save_square_jpeg(
    dir: &Path,
    id: Uuid,
    img: &RgbImage,
    edge: u32,
    quality: u8,
) -> Result<PathBuf, ImagingError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{id}.jpg"));
    let thumb = fit_square(img, edge.max(1));
    let file = BufWriter::new(File::create(&path)?);
    let encoder = JpegEncoder::new_with_quality(file, quality);
    thumb
        .write_with_encoder(encoder)
        .map_err(ImagingError::Encode)?;
    Ok(path)
}
