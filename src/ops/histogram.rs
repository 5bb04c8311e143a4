// ============================================================================
// HISTOGRAM OPERATIONS - 256-bin distributions and lookup-table remaps
// ============================================================================
//
// Equalization and contrast stretching both reduce to "build a 256-entry
// LUT, then remap every pixel". A flat image has no dynamic range; both
// operations then return an unchanged copy instead of dividing by zero.

use image::GrayImage;
use rayon::prelude::*;

use crate::canvas::ensure_non_empty;
use crate::error::OpResult;
use crate::ops::filters::gray_from_raw;

/// Lower percentile used by [`stretch_contrast`].
pub const STRETCH_LOW_PERCENTILE: f64 = 1.0;
/// Upper percentile used by [`stretch_contrast`].
pub const STRETCH_HIGH_PERCENTILE: f64 = 99.0;

/// Intensity distribution of a grayscale buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    bins: [u32; 256],
}

impl Default for Histogram {
    fn default() -> Self {
        Self { bins: [0; 256] }
    }
}

impl Histogram {
    /// Count occurrences of every intensity.
    pub fn from_image(image: &GrayImage) -> Self {
        let mut bins = [0u32; 256];
        for &v in image.as_raw() {
            bins[v as usize] += 1;
        }
        Self { bins }
    }

    pub fn from_bins(bins: [u32; 256]) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u32; 256] {
        &self.bins
    }

    pub fn count(&self, value: u8) -> u32 {
        self.bins[value as usize]
    }

    /// Number of samples counted; equals the source pixel count.
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&c| c as u64).sum()
    }

    /// Running sum of the bins.
    pub fn cumulative(&self) -> [u64; 256] {
        let mut cdf = [0u64; 256];
        let mut acc = 0u64;
        for (i, &c) in self.bins.iter().enumerate() {
            acc += c as u64;
            cdf[i] = acc;
        }
        cdf
    }

    pub fn mean(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let weighted: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &c)| i as f64 * c as f64)
            .sum();
        weighted / total as f64
    }

    /// The `k`-th smallest sample (0-based).
    fn order_statistic(&self, k: u64) -> u8 {
        let mut acc = 0u64;
        for (v, &c) in self.bins.iter().enumerate() {
            acc += c as u64;
            if acc > k {
                return v as u8;
            }
        }
        255
    }

    /// Percentile `p` in [0, 100], linearly interpolated between the two
    /// nearest order statistics.
    pub fn percentile(&self, p: f64) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let rank = p.clamp(0.0, 100.0) / 100.0 * (total - 1) as f64;
        let lo = rank.floor() as u64;
        let hi = rank.ceil() as u64;
        let v_lo = self.order_statistic(lo) as f64;
        let v_hi = self.order_statistic(hi) as f64;
        v_lo + (v_hi - v_lo) * (rank - lo as f64)
    }
}

// ---------------------------------------------------------------------------
//  LUT helpers
// ---------------------------------------------------------------------------

/// Build a LUT from a mapping over intensities; results are rounded and
/// clipped to [0, 255].
pub fn build_lut<F>(f: F) -> [u8; 256]
where
    F: Fn(f64) -> f64,
{
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = f(i as f64).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Remap every pixel through `lut`.
pub fn apply_lut(image: &GrayImage, lut: &[u8; 256]) -> OpResult<GrayImage> {
    ensure_non_empty(image.width(), image.height())?;
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src_raw = image.as_raw();
    let mut dst_raw = vec![0u8; w * h];

    dst_raw.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * w..(y + 1) * w];
        for (out, &v) in row_out.iter_mut().zip(row_in) {
            *out = lut[v as usize];
        }
    });

    gray_from_raw(w, h, dst_raw)
}

// ---------------------------------------------------------------------------
//  Equalization / contrast stretch
// ---------------------------------------------------------------------------

/// Histogram equalization. The cumulative distribution is normalized over
/// its non-zero range to [0, 255].
pub fn equalize_histogram(image: &GrayImage) -> OpResult<GrayImage> {
    ensure_non_empty(image.width(), image.height())?;
    let hist = Histogram::from_image(image);
    let cdf = hist.cumulative();
    let total = hist.total();
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);

    if total <= cdf_min {
        log::debug!("equalize: single intensity, returning input unchanged");
        return Ok(image.clone());
    }

    let range = (total - cdf_min) as f64;
    let lut = build_lut(|v| {
        let c = cdf[v as usize];
        if c < cdf_min {
            0.0
        } else {
            (c - cdf_min) as f64 * 255.0 / range
        }
    });
    apply_lut(image, &lut)
}

/// Linear remap of the [p1, p99] intensity band onto [0, 255].
pub fn stretch_contrast(image: &GrayImage) -> OpResult<GrayImage> {
    ensure_non_empty(image.width(), image.height())?;
    let hist = Histogram::from_image(image);
    let low = hist.percentile(STRETCH_LOW_PERCENTILE);
    let high = hist.percentile(STRETCH_HIGH_PERCENTILE);

    if high <= low {
        log::debug!("stretch: p1 == p99 ({:.2}), returning input unchanged", low);
        return Ok(image.clone());
    }

    let scale = 255.0 / (high - low);
    let lut = build_lut(|v| (v - low) * scale);
    apply_lut(image, &lut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    #[test]
    fn flat_image_histogram_and_equalize() {
        let img = GrayImage::from_pixel(4, 4, Luma([128]));
        let hist = Histogram::from_image(&img);
        assert_eq!(hist.count(128), 16);
        assert_eq!(hist.total(), 16);
        assert!(hist.bins().iter().enumerate().all(|(i, &c)| i == 128 || c == 0));
        assert_eq!(equalize_histogram(&img).unwrap(), img);
        assert_eq!(stretch_contrast(&img).unwrap(), img);
    }

    #[test]
    fn equalize_spreads_two_levels() {
        let img = GrayImage::from_raw(2, 2, vec![50, 50, 200, 200]).unwrap();
        let out = equalize_histogram(&img).unwrap();
        assert_eq!(out.as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn equalize_is_monotonic() {
        let img = GrayImage::from_fn(16, 4, |x, y| Luma([(60 + x * 3 + y) as u8]));
        let out = equalize_histogram(&img).unwrap();
        let mut pairs: Vec<(u8, u8)> = img.as_raw().iter().copied().zip(out.as_raw().iter().copied()).collect();
        pairs.sort();
        assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(pairs.last().map(|p| p.1), Some(255));
    }

    #[test]
    fn percentile_interpolates() {
        let img = GrayImage::from_fn(100, 1, |x, _| Luma([x as u8]));
        let hist = Histogram::from_image(&img);
        assert_relative_eq!(hist.percentile(0.0), 0.0);
        assert_relative_eq!(hist.percentile(100.0), 99.0);
        assert_relative_eq!(hist.percentile(1.0), 0.99, epsilon = 1e-9);
        assert_relative_eq!(hist.percentile(99.0), 98.01, epsilon = 1e-9);
        assert_relative_eq!(hist.mean(), 49.5);
    }

    #[test]
    fn stretch_maps_band_to_full_range() {
        let img = GrayImage::from_fn(100, 1, |x, _| Luma([(100 + x / 2) as u8]));
        let out = stretch_contrast(&img).unwrap();
        let raw = out.as_raw();
        assert_eq!(raw[0], 0);
        assert_eq!(raw[99], 255);
        assert!(raw.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn cumulative_ends_at_total() {
        let img = GrayImage::from_fn(5, 3, |x, y| Luma([(x * y) as u8]));
        let hist = Histogram::from_image(&img);
        assert_eq!(hist.cumulative()[255], 15);
    }
}
