use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::pnm::{PnmSubtype, SampleEncoding};
use image::codecs::tga::TgaEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, ImageOutputFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::canvas::Canvas;
use crate::error::OpError;
use crate::ops::Operation;

/// Largest edge an ICO entry can hold.
const ICO_MAX_DIM: u32 = 256;

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for decoding, encoding and recipe loading.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("recipe error: {0}")]
    Recipe(#[from] serde_json::Error),

    #[error(transparent)]
    Op(#[from] OpError),
}

pub type IoResult<T> = Result<T, IoError>;

// ============================================================================
// IMAGE FORMAT ENUM
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Ico,
    Tiff,
    Pnm,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Ico => "ico",
            SaveFormat::Tiff => "tiff",
            SaveFormat::Pnm => "ppm",
        }
    }

    /// Match a format name or file extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_lowercase().as_str() {
            "png" => SaveFormat::Png,
            "jpeg" | "jpg" => SaveFormat::Jpeg,
            "webp" => SaveFormat::Webp,
            "bmp" => SaveFormat::Bmp,
            "tga" => SaveFormat::Tga,
            "ico" => SaveFormat::Ico,
            "tiff" | "tif" => SaveFormat::Tiff,
            "pnm" | "pgm" | "ppm" | "pbm" | "pam" => SaveFormat::Pnm,
            _ => return None,
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_name)
    }
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode a file into a canvas. Sources without color information stay
/// single-channel; everything else is flattened to 8-bit RGB.
pub fn load_canvas(path: &Path) -> IoResult<Canvas> {
    let img = image::open(path)?;
    let canvas = if img.color().has_color() {
        Canvas::Rgb(img.to_rgb8())
    } else {
        Canvas::Gray(img.to_luma8())
    };
    canvas.ensure_non_empty()?;
    log::debug!(
        "loaded {} ({}x{}, {} channel(s))",
        path.display(),
        canvas.width(),
        canvas.height(),
        canvas.channels()
    );
    Ok(canvas)
}

/// Read a JSON array of operations, e.g.
/// `[{"op": "median", "kernel_size": 5}, {"op": "otsu"}]`.
pub fn load_recipe(path: &Path) -> IoResult<Vec<Operation>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

// ============================================================================
// ENCODE
// ============================================================================

fn to_dynamic(canvas: &Canvas) -> DynamicImage {
    match canvas {
        Canvas::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
        Canvas::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
    }
}

fn raw_parts(canvas: &Canvas) -> (&[u8], ColorType) {
    match canvas {
        Canvas::Gray(img) => (img.as_raw().as_slice(), ColorType::L8),
        Canvas::Rgb(img) => (img.as_raw().as_slice(), ColorType::Rgb8),
    }
}

/// Encode and write a canvas to `path`. `quality` applies to JPEG only.
pub fn save_canvas(canvas: &Canvas, path: &Path, format: SaveFormat, quality: u8) -> IoResult<()> {
    canvas.ensure_non_empty()?;
    let (w, h) = (canvas.width(), canvas.height());

    if format == SaveFormat::Webp {
        to_dynamic(canvas).save_with_format(path, ImageFormat::WebP)?;
        return Ok(());
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (raw, color) = raw_parts(canvas);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(raw, w, h, color)?;
        }
        SaveFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(raw, w, h, color)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(raw, w, h, color)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(raw, w, h, color)?;
        }
        SaveFormat::Ico => {
            // ICO entries limited to 256×256; scale down if needed
            let img = to_dynamic(canvas).to_rgba8();
            let dyn_img = if w > ICO_MAX_DIM || h > ICO_MAX_DIM {
                let scale = ICO_MAX_DIM as f32 / w.max(h) as f32;
                let new_w = ((w as f32 * scale) as u32).max(1);
                let new_h = ((h as f32 * scale) as u32).max(1);
                DynamicImage::ImageRgba8(image::imageops::resize(
                    &img,
                    new_w,
                    new_h,
                    image::imageops::FilterType::Lanczos3,
                ))
            } else {
                DynamicImage::ImageRgba8(img)
            };
            dyn_img.write_to(&mut writer, ImageOutputFormat::Ico)?;
        }
        SaveFormat::Tiff => {
            to_dynamic(canvas).write_to(&mut writer, ImageOutputFormat::Tiff)?;
        }
        SaveFormat::Pnm => {
            let subtype = match canvas {
                Canvas::Gray(_) => PnmSubtype::Graymap(SampleEncoding::Binary),
                Canvas::Rgb(_) => PnmSubtype::Pixmap(SampleEncoding::Binary),
            };
            to_dynamic(canvas).write_to(&mut writer, ImageOutputFormat::Pnm(subtype))?;
        }
        SaveFormat::Webp => {}
    }

    log::debug!("wrote {} as {:?}", path.display(), format);
    Ok(())
}
