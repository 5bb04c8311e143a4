// ============================================================================
// TRANSFORM OPERATIONS - flip, rotate, shear via inverse affine resampling
// ============================================================================
//
// Every output pixel is mapped back into the source through an
// `AffineDescriptor` (output → input) and sampled there. Samples that land
// outside the source take the fill value. Color canvases are resampled one
// channel at a time and re-stacked.

use image::{GrayImage, RgbImage, imageops};
use rayon::prelude::*;

use crate::canvas::{Canvas, ensure_non_empty};
use crate::error::{OpError, OpResult};
use crate::ops::filters::gray_from_raw;

/// Value written where the inverse map falls outside the source (white).
pub const OUTSIDE_FILL: u8 = 255;
pub const DEFAULT_SHEAR_X: f64 = 0.2;
pub const DEFAULT_SHEAR_Y: f64 = 0.0;
/// Canvas growth factor applied by [`shear`] on both axes.
pub const SHEAR_CANVAS_SCALE: f64 = 1.5;

/// Slack on canvas sizing and source bounds so that exact multiples of 90°
/// neither grow the canvas nor lose edge pixels to rounding noise.
const GEOMETRY_EPS: f64 = 1e-6;

/// Interpolation method used by [`warp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    /// Catmull-Rom cubic.
    Bicubic,
}

/// Inverse affine map plus output canvas size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineDescriptor {
    /// 2×2 linear part acting on output (x, y).
    pub matrix: [[f64; 2]; 2],
    /// Translation added after the linear part.
    pub offset: [f64; 2],
    pub out_width: u32,
    pub out_height: u32,
}

impl AffineDescriptor {
    /// Build a descriptor whose output center maps onto the input center.
    fn centered(matrix: [[f64; 2]; 2], in_w: u32, in_h: u32, out_w: u32, out_h: u32) -> Self {
        let cx_in = (in_w as f64 - 1.0) * 0.5;
        let cy_in = (in_h as f64 - 1.0) * 0.5;
        let cx_out = (out_w as f64 - 1.0) * 0.5;
        let cy_out = (out_h as f64 - 1.0) * 0.5;
        let offset = [
            cx_in - (matrix[0][0] * cx_out + matrix[0][1] * cy_out),
            cy_in - (matrix[1][0] * cx_out + matrix[1][1] * cy_out),
        ];
        Self { matrix, offset, out_width: out_w, out_height: out_h }
    }

    /// Rotation by `angle_deg` (positive = counter-clockwise on screen).
    /// The canvas grows to `|h·sin a| + |w·cos a|` × `|h·cos a| + |w·sin a|`
    /// so no rotated content is cropped.
    pub fn rotation(width: u32, height: u32, angle_deg: f64) -> OpResult<Self> {
        if !angle_deg.is_finite() {
            return Err(OpError::ParameterOutOfRange(format!(
                "rotation angle must be finite, got {}",
                angle_deg
            )));
        }
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let (w, h) = (width as f64, height as f64);
        let new_w = canvas_dim((h * sin).abs() + (w * cos).abs());
        let new_h = canvas_dim((h * cos).abs() + (w * sin).abs());
        Ok(Self::centered([[cos, -sin], [sin, cos]], width, height, new_w, new_h))
    }

    /// Shear with matrix `[[1, shear_x], [shear_y, 1]]` on a canvas 1.5×
    /// the source on both axes.
    pub fn shear(width: u32, height: u32, shear_x: f64, shear_y: f64) -> OpResult<Self> {
        if !shear_x.is_finite() || !shear_y.is_finite() {
            return Err(OpError::ParameterOutOfRange(format!(
                "shear factors must be finite, got ({}, {})",
                shear_x, shear_y
            )));
        }
        let new_w = ((width as f64 * SHEAR_CANVAS_SCALE).floor() as u32).max(1);
        let new_h = ((height as f64 * SHEAR_CANVAS_SCALE).floor() as u32).max(1);
        Ok(Self::centered([[1.0, shear_x], [shear_y, 1.0]], width, height, new_w, new_h))
    }

    /// Source coordinate sampled for output pixel (x, y).
    #[inline]
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + self.offset[0],
            m[1][0] * x + m[1][1] * y + self.offset[1],
        )
    }
}

fn canvas_dim(extent: f64) -> u32 {
    ((extent - GEOMETRY_EPS).ceil().max(1.0)) as u32
}

// ---------------------------------------------------------------------------
//  Resampling
// ---------------------------------------------------------------------------

/// Catmull-Rom basis functions (cardinal spline, tau = 0.5).
/// Returns weights for P_{i-1}, P_i, P_{i+1}, P_{i+2} given t in [0,1].
#[inline]
fn catmull_rom_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

#[inline]
fn px(raw: &[u8], w: usize, x: isize, y: isize, max_x: isize, max_y: isize) -> f64 {
    let cx = x.clamp(0, max_x) as usize;
    let cy = y.clamp(0, max_y) as usize;
    raw[cy * w + cx] as f64
}

/// Sample `src` at a fractional coordinate already known to lie inside.
fn sample(src: &GrayImage, x: f64, y: f64, interp: Interpolation) -> f64 {
    let w = src.width() as usize;
    let max_x = src.width() as isize - 1;
    let max_y = src.height() as isize - 1;
    let raw = src.as_raw();

    match interp {
        Interpolation::Nearest => px(raw, w, x.round() as isize, y.round() as isize, max_x, max_y),
        Interpolation::Bilinear => {
            let x0 = (x.floor() as isize).clamp(0, max_x);
            let y0 = (y.floor() as isize).clamp(0, max_y);
            let fx = (x - x0 as f64).clamp(0.0, 1.0);
            let fy = (y - y0 as f64).clamp(0.0, 1.0);

            let tl = px(raw, w, x0, y0, max_x, max_y);
            let tr = px(raw, w, x0 + 1, y0, max_x, max_y);
            let bl = px(raw, w, x0, y0 + 1, max_x, max_y);
            let br = px(raw, w, x0 + 1, y0 + 1, max_x, max_y);

            let top = tl + (tr - tl) * fx;
            let bot = bl + (br - bl) * fx;
            top + (bot - top) * fy
        }
        Interpolation::Bicubic => {
            let x0 = x.floor() as isize;
            let y0 = y.floor() as isize;
            let wx = catmull_rom_weights(x - x0 as f64);
            let wy = catmull_rom_weights(y - y0 as f64);
            let mut acc = 0.0;
            for (j, wyj) in wy.iter().enumerate() {
                let sy = y0 + j as isize - 1;
                let mut row = 0.0;
                for (i, wxi) in wx.iter().enumerate() {
                    row += wxi * px(raw, w, x0 + i as isize - 1, sy, max_x, max_y);
                }
                acc += wyj * row;
            }
            acc
        }
    }
}

/// Resample a single channel through `desc`.
pub fn warp(
    src: &GrayImage,
    desc: &AffineDescriptor,
    interp: Interpolation,
    fill: u8,
) -> OpResult<GrayImage> {
    ensure_non_empty(src.width(), src.height())?;
    let out_w = desc.out_width as usize;
    let out_h = desc.out_height as usize;
    ensure_non_empty(desc.out_width, desc.out_height)?;
    let limit_x = src.width() as f64 - 1.0 + GEOMETRY_EPS;
    let limit_y = src.height() as f64 - 1.0 + GEOMETRY_EPS;

    let mut dst_raw = vec![fill; out_w * out_h];
    dst_raw.par_chunks_mut(out_w).enumerate().for_each(|(dy, row)| {
        for (dx, out) in row.iter_mut().enumerate() {
            let (sx, sy) = desc.map(dx as f64, dy as f64);
            if sx < -GEOMETRY_EPS || sy < -GEOMETRY_EPS || sx > limit_x || sy > limit_y {
                continue;
            }
            *out = sample(src, sx, sy, interp).round().clamp(0.0, 255.0) as u8;
        }
    });

    gray_from_raw(out_w, out_h, dst_raw)
}

/// Apply `f` to every channel of a canvas independently and re-stack.
fn per_channel<F>(canvas: &Canvas, f: F) -> OpResult<Canvas>
where
    F: Fn(&GrayImage) -> OpResult<GrayImage>,
{
    match canvas {
        Canvas::Gray(img) => Ok(Canvas::Gray(f(img)?)),
        Canvas::Rgb(img) => {
            let planes = split_channels(img)
                .iter()
                .map(&f)
                .collect::<OpResult<Vec<_>>>()?;
            Ok(Canvas::Rgb(merge_channels(&planes)?))
        }
    }
}

fn split_channels(img: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = img.dimensions();
    [0usize, 1, 2].map(|c| GrayImage::from_fn(w, h, |x, y| image::Luma([img.get_pixel(x, y)[c]])))
}

fn merge_channels(planes: &[GrayImage]) -> OpResult<RgbImage> {
    let (w, h) = planes[0].dimensions();
    let mut raw = Vec::with_capacity(w as usize * h as usize * 3);
    for i in 0..(w as usize * h as usize) {
        for plane in planes.iter().take(3) {
            raw.push(plane.as_raw()[i]);
        }
    }
    RgbImage::from_raw(w, h, raw)
        .ok_or_else(|| OpError::InvalidShape("channel planes disagree in size".into()))
}

// ---------------------------------------------------------------------------
//  Public operations
// ---------------------------------------------------------------------------

/// Rotate by `angle_deg` with bilinear sampling on an enlarged canvas;
/// uncovered area is white.
pub fn rotate(canvas: &Canvas, angle_deg: f64) -> OpResult<Canvas> {
    canvas.ensure_non_empty()?;
    let desc = AffineDescriptor::rotation(canvas.width(), canvas.height(), angle_deg)?;
    per_channel(canvas, |plane| warp(plane, &desc, Interpolation::Bilinear, OUTSIDE_FILL))
}

/// Shear with bicubic sampling on a 1.5× canvas; uncovered area is white.
pub fn shear(canvas: &Canvas, shear_x: f64, shear_y: f64) -> OpResult<Canvas> {
    canvas.ensure_non_empty()?;
    let desc = AffineDescriptor::shear(canvas.width(), canvas.height(), shear_x, shear_y)?;
    per_channel(canvas, |plane| warp(plane, &desc, Interpolation::Bicubic, OUTSIDE_FILL))
}

/// Mirror left↔right.
pub fn flip_horizontal(canvas: &Canvas) -> Canvas {
    match canvas {
        Canvas::Gray(img) => Canvas::Gray(imageops::flip_horizontal(img)),
        Canvas::Rgb(img) => Canvas::Rgb(imageops::flip_horizontal(img)),
    }
}

/// Mirror top↔bottom.
pub fn flip_vertical(canvas: &Canvas) -> Canvas {
    match canvas {
        Canvas::Gray(img) => Canvas::Gray(imageops::flip_vertical(img)),
        Canvas::Rgb(img) => Canvas::Rgb(imageops::flip_vertical(img)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn ramp(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([(10 + x * 20 + y * 7) as u8]))
    }

    #[test]
    fn zero_rotation_is_identity() {
        let gray = Canvas::Gray(ramp(7, 4));
        assert_eq!(rotate(&gray, 0.0).unwrap(), gray);
        let rgb = Canvas::Rgb(RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8, y as u8, 200])));
        assert_eq!(rotate(&rgb, 0.0).unwrap(), rgb);
    }

    #[test]
    fn quarter_turn_is_exact_and_counter_clockwise() {
        let img = GrayImage::from_raw(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let out = rotate(&Canvas::Gray(img), 90.0).unwrap();
        let Canvas::Gray(out) = out else { panic!("expected grayscale") };
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(out.as_raw(), &vec![3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn half_turn_equals_double_flip() {
        let canvas = Canvas::Gray(ramp(6, 5));
        let twice = rotate(&rotate(&canvas, 90.0).unwrap(), 90.0).unwrap();
        assert_eq!(twice, flip_vertical(&flip_horizontal(&canvas)));
    }

    #[test]
    fn canvas_grows_to_hold_rotated_content() {
        let desc = AffineDescriptor::rotation(10, 10, 45.0).unwrap();
        assert_eq!((desc.out_width, desc.out_height), (15, 15));
        let desc = AffineDescriptor::rotation(40, 10, 90.0).unwrap();
        assert_eq!((desc.out_width, desc.out_height), (10, 40));

        let out = rotate(&Canvas::Gray(GrayImage::from_pixel(10, 10, Luma([0]))), 45.0).unwrap();
        let Canvas::Gray(out) = out else { panic!("expected grayscale") };
        assert_eq!(out.get_pixel(0, 0)[0], OUTSIDE_FILL);
        assert_eq!(out.get_pixel(7, 7)[0], 0);
    }

    #[test]
    fn shear_expands_canvas_and_keeps_flat_interior() {
        let canvas = Canvas::Gray(GrayImage::from_pixel(10, 8, Luma([80])));
        let out = shear(&canvas, DEFAULT_SHEAR_X, DEFAULT_SHEAR_Y).unwrap();
        assert_eq!((out.width(), out.height()), (15, 12));
        let Canvas::Gray(out) = out else { panic!("expected grayscale") };
        assert_eq!(out.get_pixel(7, 6)[0], 80);
        assert_eq!(out.get_pixel(0, 0)[0], OUTSIDE_FILL);
        assert_eq!(out.get_pixel(14, 11)[0], OUTSIDE_FILL);
    }

    #[test]
    fn shear_maps_rows_sideways() {
        let desc = AffineDescriptor::shear(10, 10, 0.5, 0.0).unwrap();
        let (x0, y0) = desc.map(7.0, 3.0);
        let (x1, y1) = desc.map(7.0, 5.0);
        assert!((x1 - x0 - 1.0).abs() < 1e-12);
        assert!((y1 - y0 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn flips_are_involutions() {
        let canvas = Canvas::Rgb(RgbImage::from_fn(4, 3, |x, y| Rgb([x as u8, y as u8, (x * y) as u8])));
        let h = flip_horizontal(&canvas);
        assert_ne!(h, canvas);
        assert_eq!(flip_horizontal(&h), canvas);
        assert_eq!(flip_vertical(&flip_vertical(&canvas)), canvas);
        let Canvas::Rgb(h) = h else { panic!("expected rgb") };
        assert_eq!(h.get_pixel(0, 1), &Rgb([3, 1, 3]));
    }

    #[test]
    fn color_rotation_matches_each_channel() {
        let rgb = RgbImage::from_fn(9, 6, |x, y| Rgb([(x * 25) as u8, (y * 40) as u8, 90]));
        let rotated = rotate(&Canvas::Rgb(rgb.clone()), 33.0).unwrap();
        let Canvas::Rgb(rotated) = rotated else { panic!("expected rgb") };
        for (c, plane) in split_channels(&rgb).iter().enumerate() {
            let single = rotate(&Canvas::Gray(plane.clone()), 33.0).unwrap();
            let Canvas::Gray(single) = single else { panic!("expected grayscale") };
            assert!(rotated.enumerate_pixels().all(|(x, y, p)| p[c] == single.get_pixel(x, y)[0]));
        }
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let canvas = Canvas::Gray(ramp(3, 3));
        assert!(matches!(rotate(&canvas, f64::NAN), Err(OpError::ParameterOutOfRange(_))));
        assert!(matches!(shear(&canvas, f64::INFINITY, 0.0), Err(OpError::ParameterOutOfRange(_))));
    }
}
