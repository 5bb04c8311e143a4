// ============================================================================
// IMAGE FILTERS - neighborhood-weighted and neighborhood-rank filtering
// ============================================================================
//
// Every linear filter goes through `correlate`, which rounds and clips the
// weighted sum to [0, 255] before writing the 8-bit sample. Named kernels
// (mean, edge, smoothing, sharpen) never return unclipped intermediates.

use image::GrayImage;
use rayon::prelude::*;

use crate::canvas::ensure_non_empty;
use crate::error::{OpError, OpResult};
use crate::ops::cancel::CancelFlag;

/// Default neighborhood size for the mean and median filters.
pub const DEFAULT_KERNEL_SIZE: usize = 3;

/// How samples outside the image are synthesized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Border {
    /// Half-sample symmetric: `d c b a | a b c d | d c b a`.
    #[default]
    Reflect,
    /// Whole-sample symmetric, edge not repeated: `d c b | a b c d | c b a`.
    Mirror,
    /// Edge sample replicated.
    Clamp,
    /// Fixed value outside the image.
    Constant(u8),
}

impl Border {
    /// Map a coordinate that may lie outside `0..n` to a source index.
    /// `None` means "use the constant fill".
    #[inline]
    pub fn resolve(self, i: isize, n: usize) -> Option<usize> {
        let len = n as isize;
        if i >= 0 && i < len {
            return Some(i as usize);
        }
        match self {
            Border::Reflect => {
                let period = 2 * len;
                let m = i.rem_euclid(period);
                Some(if m < len { m } else { period - 1 - m } as usize)
            }
            Border::Mirror => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * len - 2;
                let m = i.rem_euclid(period);
                Some(if m < len { m } else { period - m } as usize)
            }
            Border::Clamp => Some(i.clamp(0, len - 1) as usize),
            Border::Constant(_) => None,
        }
    }

    fn fill(self) -> f32 {
        match self {
            Border::Constant(v) => v as f32,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
//  Kernels
// ---------------------------------------------------------------------------

/// Square correlation kernel with an odd side length.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
}

impl Kernel {
    /// `weights` are row-major and must hold `size * size` entries.
    pub fn new(size: usize, weights: Vec<f32>) -> OpResult<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(OpError::ParameterOutOfRange(format!(
                "kernel size must be odd and positive, got {}",
                size
            )));
        }
        if weights.len() != size * size {
            return Err(OpError::InvalidShape(format!(
                "{}x{} kernel needs {} weights, got {}",
                size,
                size,
                size * size,
                weights.len()
            )));
        }
        Ok(Self { size, weights })
    }

    fn from_rows(rows: [[f32; 3]; 3]) -> Self {
        Self {
            size: 3,
            weights: rows.iter().flatten().copied().collect(),
        }
    }

    /// 1×1 kernel with weight 1.
    pub fn identity() -> Self {
        Self { size: 1, weights: vec![1.0] }
    }

    /// Uniform k×k box; weights sum to 1.
    pub fn mean(size: usize) -> OpResult<Self> {
        let size = check_kernel_size(size)?;
        let w = 1.0 / (size * size) as f32;
        Ok(Self { size, weights: vec![w; size * size] })
    }

    /// Laplacian-style edge detector.
    pub fn edge() -> Self {
        Self::from_rows([[-1.0, -1.0, -1.0], [-1.0, 8.0, -1.0], [-1.0, -1.0, -1.0]])
    }

    /// 3×3 uniform smoothing, 1/9 per tap.
    pub fn smoothing() -> Self {
        Self::from_rows([[1.0 / 9.0; 3]; 3])
    }

    pub fn sharpen() -> Self {
        Self::from_rows([[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]])
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }

    #[inline]
    pub fn weight(&self, kx: usize, ky: usize) -> f32 {
        self.weights[ky * self.size + kx]
    }
}

/// Neighborhood sizes for the mean and median filters must be odd and ≥ 3.
pub fn check_kernel_size(size: usize) -> OpResult<usize> {
    if size < 3 || size % 2 == 0 {
        Err(OpError::ParameterOutOfRange(format!(
            "kernel size must be an odd integer >= 3, got {}",
            size
        )))
    } else {
        Ok(size)
    }
}

// ---------------------------------------------------------------------------
//  Correlation (rayon, one output row per task)
// ---------------------------------------------------------------------------

/// Weighted sum of each pixel's neighborhood under `kernel`.
/// The result is rounded and clipped to [0, 255].
pub fn correlate(image: &GrayImage, kernel: &Kernel, border: Border) -> OpResult<GrayImage> {
    ensure_non_empty(image.width(), image.height())?;
    let w = image.width() as usize;
    let h = image.height() as usize;
    let size = kernel.size();
    let radius = kernel.radius() as isize;
    let src_raw = image.as_raw();
    let fill = border.fill();

    // Column lookup shared by every row: cols[x * size + kx].
    let cols: Vec<Option<usize>> = (0..w)
        .flat_map(|x| (0..size).map(move |kx| (x, kx)))
        .map(|(x, kx)| border.resolve(x as isize + kx as isize - radius, w))
        .collect();

    let mut dst_raw = vec![0u8; w * h];
    dst_raw.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let rows: Vec<Option<usize>> = (0..size)
            .map(|ky| border.resolve(y as isize + ky as isize - radius, h))
            .collect();
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ky, sy) in rows.iter().enumerate() {
                for kx in 0..size {
                    let v = match (sy, cols[x * size + kx]) {
                        (Some(sy), Some(sx)) => src_raw[sy * w + sx] as f32,
                        _ => fill,
                    };
                    acc += kernel.weight(kx, ky) * v;
                }
            }
            *out = acc.round().clamp(0.0, 255.0) as u8;
        }
    });

    gray_from_raw(w, h, dst_raw)
}

/// Uniform k×k average.
pub fn mean_filter(image: &GrayImage, kernel_size: usize) -> OpResult<GrayImage> {
    let kernel = Kernel::mean(kernel_size)?;
    correlate(image, &kernel, Border::Reflect)
}

pub fn edge_filter(image: &GrayImage) -> OpResult<GrayImage> {
    correlate(image, &Kernel::edge(), Border::Reflect)
}

pub fn smoothing_filter(image: &GrayImage) -> OpResult<GrayImage> {
    correlate(image, &Kernel::smoothing(), Border::Reflect)
}

pub fn sharpen_filter(image: &GrayImage) -> OpResult<GrayImage> {
    correlate(image, &Kernel::sharpen(), Border::Reflect)
}

// ---------------------------------------------------------------------------
//  Median (rank) filter
// ---------------------------------------------------------------------------

pub fn median_filter(image: &GrayImage, kernel_size: usize) -> OpResult<GrayImage> {
    median_filter_with(image, kernel_size, &CancelFlag::never())
}

/// k×k median with whole-sample mirror padding. The flag is polled once
/// per output row.
pub fn median_filter_with(
    image: &GrayImage,
    kernel_size: usize,
    cancel: &CancelFlag,
) -> OpResult<GrayImage> {
    let size = check_kernel_size(kernel_size)?;
    ensure_non_empty(image.width(), image.height())?;
    let w = image.width() as usize;
    let h = image.height() as usize;
    let r = (size / 2) as isize;
    let src_raw = image.as_raw();

    let mut dst_raw = vec![0u8; w * h];
    dst_raw
        .par_chunks_mut(w)
        .enumerate()
        .try_for_each(|(y, row_out)| -> OpResult<()> {
            cancel.check()?;
            let mut window: Vec<u8> = Vec::with_capacity(size * size);
            for (x, out) in row_out.iter_mut().enumerate() {
                window.clear();
                for dy in -r..=r {
                    let sy = Border::Mirror.resolve(y as isize + dy, h).unwrap_or(0);
                    for dx in -r..=r {
                        let sx = Border::Mirror.resolve(x as isize + dx, w).unwrap_or(0);
                        window.push(src_raw[sy * w + sx]);
                    }
                }
                window.sort_unstable();
                *out = window[window.len() / 2];
            }
            Ok(())
        })?;

    gray_from_raw(w, h, dst_raw)
}

pub(crate) fn gray_from_raw(w: usize, h: usize, raw: Vec<u8>) -> OpResult<GrayImage> {
    GrayImage::from_raw(w as u32, h as u32, raw)
        .ok_or_else(|| OpError::InvalidShape(format!("{}x{} output buffer mismatch", w, h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([(x * 17 + y * 31) as u8]))
    }

    #[test]
    fn border_resolution() {
        // a b c d
        assert_eq!(Border::Reflect.resolve(-1, 4), Some(0));
        assert_eq!(Border::Reflect.resolve(-2, 4), Some(1));
        assert_eq!(Border::Reflect.resolve(4, 4), Some(3));
        assert_eq!(Border::Mirror.resolve(-1, 4), Some(1));
        assert_eq!(Border::Mirror.resolve(4, 4), Some(2));
        assert_eq!(Border::Mirror.resolve(-3, 1), Some(0));
        assert_eq!(Border::Clamp.resolve(-5, 4), Some(0));
        assert_eq!(Border::Constant(9).resolve(-1, 4), None);
        assert_eq!(Border::Constant(9).resolve(2, 4), Some(2));
    }

    #[test]
    fn identity_kernel_is_identity() {
        let img = gradient(7, 5);
        for border in [Border::Reflect, Border::Mirror, Border::Clamp, Border::Constant(0)] {
            assert_eq!(correlate(&img, &Kernel::identity(), border).unwrap(), img);
        }
    }

    #[test]
    fn named_kernels_keep_constant_images() {
        let img = GrayImage::from_pixel(6, 4, Luma([128]));
        assert_eq!(mean_filter(&img, 3).unwrap(), img);
        assert_eq!(mean_filter(&img, 5).unwrap(), img);
        assert_eq!(smoothing_filter(&img).unwrap(), img);
        assert_eq!(sharpen_filter(&img).unwrap(), img);
        assert!(edge_filter(&img).unwrap().pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn sharpen_output_is_clipped() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([100]));
        img.put_pixel(2, 2, Luma([200]));
        let out = sharpen_filter(&img).unwrap();
        // 5*200 - 4*100 = 600 → 255; 5*100 - 200 - 3*100 = 0.
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        assert_eq!(out.get_pixel(2, 1)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn edge_filter_highlights_step() {
        let img = GrayImage::from_fn(6, 3, |x, _| Luma([if x < 3 { 10 } else { 60 }]));
        let out = edge_filter(&img).unwrap();
        // Bright side of the step: 8*60 - 3*10 - 5*60 = 150.
        assert_eq!(out.get_pixel(3, 1)[0], 150);
        // Dark side goes negative and is clipped to 0.
        assert_eq!(out.get_pixel(2, 1)[0], 0);
        assert_eq!(out.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn mean_filter_rounds_instead_of_truncating() {
        let img = GrayImage::from_fn(3, 3, |x, y| Luma([if x == 1 && y == 1 { 5 } else { 0 }]));
        // Centre: 5/9 = 0.56 → 1.
        assert_eq!(mean_filter(&img, 3).unwrap().get_pixel(1, 1)[0], 1);
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([40]));
        img.put_pixel(2, 2, Luma([255]));
        img.put_pixel(0, 0, Luma([255]));
        let out = median_filter(&img, 3).unwrap();
        assert!(out.pixels().all(|p| p[0] == 40));
    }

    #[test]
    fn kernel_size_validation() {
        let img = gradient(4, 4);
        for bad in [0, 1, 2, 4] {
            assert!(matches!(mean_filter(&img, bad), Err(OpError::ParameterOutOfRange(_))));
            assert!(matches!(median_filter(&img, bad), Err(OpError::ParameterOutOfRange(_))));
        }
        assert!(matches!(Kernel::new(3, vec![1.0; 8]), Err(OpError::InvalidShape(_))));
        assert!(matches!(correlate(&GrayImage::new(0, 3), &Kernel::edge(), Border::Reflect),
            Err(OpError::InvalidShape(_))));
    }

    #[test]
    fn cancelled_median_stops() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert_eq!(median_filter_with(&gradient(8, 8), 3, &flag), Err(OpError::Cancelled));
    }
}
