// ============================================================================
// THRESHOLDING - global binarization (manual, Otsu, Kapur)
// ============================================================================
//
// Foreground is everything strictly brighter than the threshold. Otsu and
// Kapur pick the threshold from the histogram by exhaustive search; both
// skip candidate splits that leave one side empty.

use image::GrayImage;
use rayon::prelude::*;

use crate::canvas::{BACKGROUND, BinaryMask, FOREGROUND, ensure_non_empty};
use crate::error::{OpError, OpResult};
use crate::ops::cancel::CancelFlag;
use crate::ops::filters::gray_from_raw;
use crate::ops::histogram::Histogram;

/// Added inside the logarithm of the Kapur entropy.
pub const ENTROPY_EPSILON: f64 = 1e-12;

/// Validate a caller-supplied threshold.
pub fn checked_level(value: i64) -> OpResult<u8> {
    u8::try_from(value).map_err(|_| {
        OpError::ParameterOutOfRange(format!("threshold must be within 0..=255, got {}", value))
    })
}

/// 255 where `image > level`, 0 elsewhere.
pub fn manual_threshold(image: &GrayImage, level: u8) -> OpResult<BinaryMask> {
    ensure_non_empty(image.width(), image.height())?;
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src_raw = image.as_raw();
    let mut dst_raw = vec![0u8; w * h];

    dst_raw.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * w..(y + 1) * w];
        for (out, &v) in row_out.iter_mut().zip(row_in) {
            *out = if v > level { FOREGROUND } else { BACKGROUND };
        }
    });

    Ok(BinaryMask::from_raw_unchecked(gray_from_raw(w, h, dst_raw)?))
}

// ---------------------------------------------------------------------------
//  Otsu
// ---------------------------------------------------------------------------

/// Threshold maximizing the between-class variance
/// `w_bg · w_fg · (μ_bg − μ_fg)²`. Ties keep the lowest threshold.
/// Returns 0 when no split has both classes populated.
pub fn otsu_level(hist: &Histogram) -> u8 {
    otsu_level_with(hist, &CancelFlag::never()).unwrap_or(0)
}

fn otsu_level_with(hist: &Histogram, cancel: &CancelFlag) -> OpResult<u8> {
    let total = hist.total();
    if total == 0 {
        return Ok(0);
    }
    let total_f = total as f64;
    let sum_total: f64 = hist
        .bins()
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut max_variance = 0.0f64;
    let mut best = 0u8;

    for (t, &count) in hist.bins().iter().enumerate() {
        cancel.check()?;
        weight_bg += count as u64;
        sum_bg += t as f64 * count as f64;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_total - sum_bg) / weight_fg as f64;
        let w_bg = weight_bg as f64 / total_f;
        let w_fg = weight_fg as f64 / total_f;
        let variance = w_bg * w_fg * (mean_bg - mean_fg).powi(2);

        if variance > max_variance {
            max_variance = variance;
            best = t as u8;
        }
    }

    Ok(best)
}

pub fn otsu_threshold(image: &GrayImage) -> OpResult<BinaryMask> {
    otsu_threshold_with(image, &CancelFlag::never())
}

pub fn otsu_threshold_with(image: &GrayImage, cancel: &CancelFlag) -> OpResult<BinaryMask> {
    ensure_non_empty(image.width(), image.height())?;
    let level = otsu_level_with(&Histogram::from_image(image), cancel)?;
    log::debug!("otsu: selected threshold {}", level);
    manual_threshold(image, level)
}

// ---------------------------------------------------------------------------
//  Kapur (maximum entropy)
// ---------------------------------------------------------------------------

/// Threshold maximizing the summed Shannon entropy of the renormalized
/// `[0, t)` and `[t, 256)` partitions, for t in 1..=254. Ties keep the
/// lowest threshold. Returns 0 when every split leaves a side empty.
pub fn kapur_level(hist: &Histogram) -> u8 {
    kapur_level_with(hist, &CancelFlag::never()).unwrap_or(0)
}

fn kapur_level_with(hist: &Histogram, cancel: &CancelFlag) -> OpResult<u8> {
    let total = hist.total();
    if total == 0 {
        return Ok(0);
    }
    let prob: Vec<f64> = hist
        .bins()
        .iter()
        .map(|&c| c as f64 / total as f64)
        .collect();

    let entropy = |part: &[f64], mass: f64| -> f64 {
        part.iter()
            .map(|&p| {
                let q = p / mass;
                -q * (q + ENTROPY_EPSILON).ln()
            })
            .sum()
    };

    let mut best = 0u8;
    let mut max_entropy = f64::NEG_INFINITY;

    for t in 1..=254usize {
        cancel.check()?;
        let (low, high) = prob.split_at(t);
        let mass_low: f64 = low.iter().sum();
        let mass_high: f64 = high.iter().sum();
        if mass_low <= 0.0 || mass_high <= 0.0 {
            continue;
        }

        let h = entropy(low, mass_low) + entropy(high, mass_high);
        if h > max_entropy {
            max_entropy = h;
            best = t as u8;
        }
    }

    Ok(best)
}

pub fn kapur_threshold(image: &GrayImage) -> OpResult<BinaryMask> {
    kapur_threshold_with(image, &CancelFlag::never())
}

pub fn kapur_threshold_with(image: &GrayImage, cancel: &CancelFlag) -> OpResult<BinaryMask> {
    ensure_non_empty(image.width(), image.height())?;
    let level = kapur_level_with(&Histogram::from_image(image), cancel)?;
    log::debug!("kapur: selected threshold {}", level);
    manual_threshold(image, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Two clusters: 8..=12 and 238..=242.
    fn bimodal() -> GrayImage {
        GrayImage::from_fn(20, 10, |x, y| {
            let spread = (x % 5) as u8;
            Luma([if y < 5 { 8 + spread } else { 238 + spread }])
        })
    }

    #[test]
    fn manual_is_strictly_greater() {
        let img = GrayImage::from_raw(3, 1, vec![99, 100, 101]).unwrap();
        let mask = manual_threshold(&img, 100).unwrap();
        assert_eq!(mask.as_gray().as_raw(), &vec![0, 0, 255]);
        assert_eq!(manual_threshold(&img, 255).unwrap().count_foreground(), 0);
        assert_eq!(manual_threshold(&img, 0).unwrap().count_foreground(), 3);
    }

    #[test]
    fn checked_level_bounds() {
        assert_eq!(checked_level(0), Ok(0));
        assert_eq!(checked_level(255), Ok(255));
        assert!(matches!(checked_level(256), Err(OpError::ParameterOutOfRange(_))));
        assert!(matches!(checked_level(-1), Err(OpError::ParameterOutOfRange(_))));
    }

    #[test]
    fn otsu_separates_clusters() {
        let img = bimodal();
        let level = otsu_level(&Histogram::from_image(&img));
        assert!(level > 10 && level < 240, "level {}", level);
        let mask = otsu_threshold(&img).unwrap();
        assert_eq!(mask.count_foreground(), 100);
        assert!(mask.is_foreground(0, 9));
        assert!(!mask.is_foreground(0, 0));
    }

    #[test]
    fn otsu_keeps_first_plateau_threshold() {
        // Every split between the two point masses has the same variance.
        let mut bins = [0u32; 256];
        bins[10] = 50;
        bins[240] = 50;
        assert_eq!(otsu_level(&Histogram::from_bins(bins)), 10);
    }

    #[test]
    fn kapur_separates_clusters() {
        let img = bimodal();
        let level = kapur_level(&Histogram::from_image(&img));
        assert!(level > 10 && level < 240, "level {}", level);
        let mask = kapur_threshold(&img).unwrap();
        assert_eq!(mask.count_foreground(), 100);
    }

    #[test]
    fn flat_images_do_not_fault() {
        let img = GrayImage::from_pixel(4, 4, Luma([128]));
        let hist = Histogram::from_image(&img);
        assert_eq!(otsu_level(&hist), 0);
        assert_eq!(kapur_level(&hist), 0);
        assert_eq!(otsu_threshold(&img).unwrap().count_foreground(), 16);
        let black = GrayImage::new(3, 3);
        assert_eq!(kapur_threshold(&black).unwrap().count_foreground(), 0);
    }

    #[test]
    fn cancellation_is_observed() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert_eq!(otsu_threshold_with(&bimodal(), &flag), Err(OpError::Cancelled));
        assert_eq!(kapur_threshold_with(&bimodal(), &flag), Err(OpError::Cancelled));
    }
}
