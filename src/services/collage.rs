//! Print-ready collage rendering.
//!
//! Lays the selected faces out on a grid, either on a fixed paper size
//! (A5/A4/A3 at 300 DPI, portrait) or on a canvas sized to the content.
//! Preview renders reuse the cached face thumbnails; final renders re-crop
//! each face from the original photo, scaling the detection-space bounding
//! box back up to the original resolution.

use chrono::Utc;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Settings;
use crate::models::{FaceRecord, RunContext};
use crate::services::imaging;
use crate::services::selection::SortMode;

#[derive(Debug, Error)]
pub enum CollageError {
    #[error("No faces available for collage")]
    NoFaces,

    #[error(transparent)]
    Imaging(#[from] imaging::ImagingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode collage: {0}")]
    Encode(image::ImageError),
}

/// Output paper size, portrait at 300 DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperFormat {
    A5,
    A4,
    A3,
}

impl PaperFormat {
    /// Pixel dimensions at 300 DPI.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PaperFormat::A5 => (1748, 2480),
            PaperFormat::A4 => (2480, 3508),
            PaperFormat::A3 => (3508, 4961),
        }
    }
}

/// Layout and quality knobs for one render.
#[derive(Debug, Clone)]
pub struct CollageOptions {
    pub tile_size: u32,
    pub columns: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub margin: u32,
    pub background: String,
    pub sort: SortMode,
    pub max_faces: usize,
    pub output_format: PaperFormat,
    /// Use cached thumbnails instead of re-cropping originals.
    pub preview: bool,
}

/// A rendered collage on disk.
#[derive(Debug, Clone)]
pub struct CollageOutput {
    pub output_path: PathBuf,
    pub static_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Render the given (already selected and ordered) faces into a collage.
pub fn render_collage(
    ctx: &RunContext,
    bucket: &str,
    faces: &[&FaceRecord],
    options: &CollageOptions,
    settings: &Settings,
) -> Result<CollageOutput, CollageError> {
    let faces: Vec<&FaceRecord> = faces.iter().take(options.max_faces).copied().collect();
    if faces.is_empty() {
        return Err(CollageError::NoFaces);
    }

    let columns = options.columns.max(1);
    let (width, height) = options.output_format.dimensions();
    let background = parse_background(&options.background);
    let mut canvas = RgbImage::from_pixel(width, height, background);

    // Center an incomplete last row.
    let total = faces.len() as u32;
    let full_rows = total / columns;
    let last_row_count = total % columns;

    for (index, face) in faces.iter().enumerate() {
        let row = index as u32 / columns;
        let col = index as u32 % columns;

        let x = if row == full_rows && last_row_count > 0 {
            let empty = columns - last_row_count;
            let offset = empty * (options.tile_size + options.padding_x) / 2;
            options.margin + offset + col * (options.tile_size + options.padding_x)
        } else {
            options.margin + col * (options.tile_size + options.padding_x)
        };
        let y = options.margin + row * (options.tile_size + options.padding_y);

        let Some(tile) = load_tile(ctx, face, options) else {
            continue;
        };
        imageops::replace(&mut canvas, &tile, i64::from(x), i64::from(y));
    }

    let filename = format!(
        "faceloom_collage_{}_{}.jpg",
        bucket,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let output_dir = settings.output_dir.join(ctx.run_id.to_string());
    let output_path = save_jpeg(&output_dir, &filename, &canvas)?;
    let static_path = save_jpeg(&settings.collages_dir(), &filename, &canvas)?;

    Ok(CollageOutput {
        output_path,
        static_path,
        width,
        height,
    })
}

/// Load one face tile at tile size: the cached thumbnail in preview mode,
/// or a fresh crop from the original photo otherwise.
fn load_tile(ctx: &RunContext, face: &FaceRecord, options: &CollageOptions) -> Option<RgbImage> {
    if options.preview {
        let thumb = image::open(&face.thumb_path).ok()?.into_rgb8();
        return Some(fit_tile(&thumb, options.tile_size));
    }

    let photo = ctx.photos.get(&face.photo_id)?;
    let original = imaging::load_oriented(&photo.path).ok()?;

    // The bbox lives in detector input space; scale it back up when the
    // original is larger than the detection size.
    let max_edge = ctx.parameters.max_edge;
    let long_edge = original.width().max(original.height());
    let scale = if ctx.parameters.downscale_detector && long_edge > max_edge && max_edge > 0 {
        f64::from(long_edge) / f64::from(max_edge)
    } else {
        1.0
    };
    let (bx, by, bw, bh) = face.bbox;
    let scaled_bbox = (
        (f64::from(bx) * scale) as i32,
        (f64::from(by) * scale) as i32,
        (f64::from(bw) * scale) as i32,
        (f64::from(bh) * scale) as i32,
    );

    let crop = imaging::crop_face(&original, scaled_bbox, 0.25);
    Some(fit_tile(&crop, options.tile_size))
}

fn fit_tile(img: &RgbImage, tile_size: u32) -> RgbImage {
    DynamicImage::ImageRgb8(img.clone())
        .resize_to_fill(tile_size.max(1), tile_size.max(1), FilterType::Lanczos3)
        .into_rgb8()
}

fn parse_background(name: &str) -> Rgb<u8> {
    match name.to_ascii_lowercase().as_str() {
        "white" => Rgb([255, 255, 255]),
        "black" => Rgb([0, 0, 0]),
        hex => parse_hex(hex).unwrap_or(Rgb([255, 255, 255])),
    }
}

fn parse_hex(value: &str) -> Option<Rgb<u8>> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb([r, g, b]))
}

fn save_jpeg(dir: &Path, filename: &str, canvas: &RgbImage) -> Result<PathBuf, CollageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    let file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 95);
    canvas
        .write_with_encoder(encoder)
        .map_err(CollageError::Encode)?;
    Ok(path)
}
