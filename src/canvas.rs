// ============================================================================
// CANVAS - image buffers handed between the shell and the operations
// ============================================================================
//
// A `Canvas` is either single-channel intensity data or three-channel color.
// Filters, thresholds and morphology work on `GrayImage`; the geometric
// operations accept either variant. `BinaryMask` is a grayscale buffer that
// is guaranteed to hold only 0 and 255.

use image::{GrayImage, Luma, RgbImage};
use rayon::prelude::*;

use crate::error::{OpError, OpResult};

/// Foreground sample value of a binary mask.
pub const FOREGROUND: u8 = 255;
/// Background sample value of a binary mask.
pub const BACKGROUND: u8 = 0;

/// An image buffer owned by the current document.
#[derive(Clone, Debug, PartialEq)]
pub enum Canvas {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl Canvas {
    /// Build a canvas from raw row-major samples.
    /// `channels` must be 1 (grayscale) or 3 (interleaved RGB).
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> OpResult<Self> {
        if width == 0 || height == 0 {
            return Err(OpError::InvalidShape(format!("{}x{} buffer is empty", width, height)));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(OpError::InvalidShape(format!(
                "expected {} samples for {}x{}x{}, got {}",
                expected, width, height, channels, data.len()
            )));
        }
        match channels {
            1 => GrayImage::from_raw(width, height, data)
                .map(Canvas::Gray)
                .ok_or_else(|| OpError::InvalidShape("grayscale buffer rejected".into())),
            3 => RgbImage::from_raw(width, height, data)
                .map(Canvas::Rgb)
                .ok_or_else(|| OpError::InvalidShape("rgb buffer rejected".into())),
            n => Err(OpError::InvalidShape(format!("unsupported channel count {}", n))),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Canvas::Gray(img) => img.width(),
            Canvas::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Canvas::Gray(img) => img.height(),
            Canvas::Rgb(img) => img.height(),
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            Canvas::Gray(_) => 1,
            Canvas::Rgb(_) => 3,
        }
    }

    /// Bytes held by the pixel buffer (used by the history memory budget).
    pub fn byte_size(&self) -> usize {
        self.width() as usize * self.height() as usize * self.channels() as usize
    }

    /// Intensity view of the canvas. RGB is reduced with ITU-R 601 luma
    /// weights (the same weights a "convert to L" step uses).
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Canvas::Gray(img) => img.clone(),
            Canvas::Rgb(img) => {
                let w = img.width() as usize;
                let h = img.height() as usize;
                let src_raw = img.as_raw();
                let mut dst_raw = vec![0u8; w * h];
                if w == 0 || h == 0 {
                    return GrayImage::new(w as u32, h as u32);
                }
                dst_raw.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
                    let row_in = &src_raw[y * w * 3..(y + 1) * w * 3];
                    for x in 0..w {
                        let pi = x * 3;
                        let r = row_in[pi] as u32;
                        let g = row_in[pi + 1] as u32;
                        let b = row_in[pi + 2] as u32;
                        row_out[x] = ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8;
                    }
                });
                GrayImage::from_raw(w as u32, h as u32, dst_raw)
                    .unwrap_or_else(|| GrayImage::new(w as u32, h as u32))
            }
        }
    }

    /// Reject empty buffers before any processing happens.
    pub fn ensure_non_empty(&self) -> OpResult<()> {
        ensure_non_empty(self.width(), self.height())
    }
}

impl From<GrayImage> for Canvas {
    fn from(img: GrayImage) -> Self {
        Canvas::Gray(img)
    }
}

impl From<RgbImage> for Canvas {
    fn from(img: RgbImage) -> Self {
        Canvas::Rgb(img)
    }
}

impl From<BinaryMask> for Canvas {
    fn from(mask: BinaryMask) -> Self {
        Canvas::Gray(mask.into_inner())
    }
}

pub(crate) fn ensure_non_empty(width: u32, height: u32) -> OpResult<()> {
    if width == 0 || height == 0 {
        Err(OpError::InvalidShape(format!("{}x{} buffer is empty", width, height)))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
//  Binary mask
// ---------------------------------------------------------------------------

/// Grayscale buffer whose samples are all [`BACKGROUND`] or [`FOREGROUND`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// All-background mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        BinaryMask(GrayImage::new(width, height))
    }

    /// Promote a grayscale buffer, failing on the first sample that is
    /// neither 0 nor 255.
    pub fn from_gray(img: GrayImage) -> OpResult<Self> {
        ensure_non_empty(img.width(), img.height())?;
        if let Some((x, y, p)) = img
            .enumerate_pixels()
            .find(|(_, _, p)| p[0] != FOREGROUND && p[0] != BACKGROUND)
        {
            return Err(OpError::NotBinary { x, y, value: p[0] });
        }
        Ok(BinaryMask(img))
    }

    /// Build from a per-pixel predicate; `true` becomes foreground.
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> bool,
    {
        BinaryMask(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { FOREGROUND } else { BACKGROUND }])
        }))
    }

    /// Wrap a buffer the caller has just produced with only 0/255 samples.
    pub(crate) fn from_raw_unchecked(img: GrayImage) -> Self {
        debug_assert!(img.pixels().all(|p| p[0] == FOREGROUND || p[0] == BACKGROUND));
        BinaryMask(img)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[inline]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] == FOREGROUND
    }

    /// Number of foreground samples.
    pub fn count_foreground(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v == FOREGROUND).count()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_inner(self) -> GrayImage {
        self.0
    }
}
