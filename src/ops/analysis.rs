// ============================================================================
// BINARY ANALYSIS - centroid and skeleton of a mask
// ============================================================================

use std::convert::Infallible;

use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;

use crate::canvas::{BACKGROUND, BinaryMask, FOREGROUND};
use crate::error::OpResult;
use crate::ops::cancel::CancelFlag;

/// Integer pixel position (`x` = column, `y` = row).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Mean position of all foreground pixels, rounded to the nearest pixel.
/// `None` for a mask without foreground.
pub fn centroid(mask: &BinaryMask) -> Option<Point> {
    let w = mask.width() as usize;
    if w == 0 {
        return None;
    }
    let (count, sum_x, sum_y) = mask
        .as_gray()
        .as_raw()
        .par_chunks(w)
        .enumerate()
        .map(|(y, row)| {
            let mut n = 0u64;
            let mut sx = 0u64;
            for (x, &v) in row.iter().enumerate() {
                if v == FOREGROUND {
                    n += 1;
                    sx += x as u64;
                }
            }
            (n, sx, n * y as u64)
        })
        .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    if count == 0 {
        return None;
    }
    Some(Point {
        x: (sum_x as f64 / count as f64).round() as u32,
        y: (sum_y as f64 / count as f64).round() as u32,
    })
}

// ---------------------------------------------------------------------------
//  Thinning
// ---------------------------------------------------------------------------
//
// Two-subiteration parallel thinning. A pixel is a candidate when its
// neighbourhood has crossing number 1 (G1) and it is neither an endpoint nor
// an interior point (G2); it is removed when it also faces the side the
// current subiteration peels (G3 / G3'). Components stay connected and keep
// their ends, 2-pixel-thick strokes included.

/// Neighbour offsets by code bit, counter-clockwise from east.
const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Clone, Copy)]
enum Pass {
    /// Peels the south-east boundary and north-west corners.
    First,
    /// Peels the north-west boundary and south-east corners.
    Second,
}

impl Pass {
    fn lut_bit(self) -> u8 {
        match self {
            Pass::First => 0b01,
            Pass::Second => 0b10,
        }
    }
}

#[inline]
const fn bit(code: usize, i: usize) -> bool {
    (code >> (i % 8)) & 1 == 1
}

/// G1: number of 4-neighbours that start a run of foreground.
const fn crossing_number(code: usize) -> u32 {
    let mut s = 0;
    let mut i = 0;
    while i < 8 {
        if !bit(code, i) && (bit(code, i + 1) || bit(code, i + 2)) {
            s += 1;
        }
        i += 2;
    }
    s
}

/// G2: min(n1, n2), the number of occupied neighbour pairs.
const fn thickness(code: usize) -> u32 {
    let mut n1 = 0;
    let mut n2 = 0;
    let mut k = 1;
    while k < 8 {
        if bit(code, k) || bit(code, k - 1) {
            n1 += 1;
        }
        if bit(code, k) || bit(code, k + 1) {
            n2 += 1;
        }
        k += 2;
    }
    if n1 < n2 { n1 } else { n2 }
}

const fn build_thin_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut code = 0;
    while code < 256 {
        let t = thickness(code);
        if crossing_number(code) == 1 && t >= 2 && t <= 3 {
            // G3: (p2 | p3 | !p8) & p1 == 0
            if !((bit(code, 1) || bit(code, 2) || !bit(code, 7)) && bit(code, 0)) {
                lut[code] |= 0b01;
            }
            // G3': (p6 | p7 | !p4) & p5 == 0
            if !((bit(code, 5) || bit(code, 6) || !bit(code, 3)) && bit(code, 4)) {
                lut[code] |= 0b10;
            }
        }
        code += 1;
    }
    lut
}

/// Removal table indexed by neighbourhood code.
static THIN_LUT: [u8; 256] = build_thin_lut();

/// Neighbourhood code of `(x, y)`. Outside the image counts as background.
#[inline]
fn neighbour_code(cells: &[u8], w: usize, h: usize, x: usize, y: usize) -> usize {
    let mut code = 0;
    for (i, &(dx, dy)) in NEIGHBOUR_OFFSETS.iter().enumerate() {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx >= 0 && ny >= 0 && nx < w as isize && ny < h as isize && cells[ny as usize * w + nx as usize] == 1 {
            code |= 1 << i;
        }
    }
    code
}

/// One subiteration; returns the number of pixels removed.
fn thin_pass(cells: &mut [u8], w: usize, h: usize, pass: Pass) -> usize {
    let src = cells.to_vec();
    let mask = pass.lut_bit();
    cells
        .par_chunks_mut(w)
        .enumerate()
        .map(|(y, row)| {
            let mut n = 0usize;
            for (x, cell) in row.iter_mut().enumerate() {
                if *cell == 1 && THIN_LUT[neighbour_code(&src, w, h, x, y)] & mask != 0 {
                    *cell = 0;
                    n += 1;
                }
            }
            n
        })
        .sum()
}

/// Reduce foreground regions to one-pixel-wide centre lines.
pub fn skeletonize(mask: &BinaryMask) -> BinaryMask {
    let mut cells = cells_of(mask);
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    if w > 0 && h > 0 {
        let Ok(iterations) = thin_to_convergence(&mut cells, w, h, || Ok::<(), Infallible>(()));
        log::debug!("skeletonize: converged after {} iterations", iterations);
    }
    mask_from_cells(mask.width(), mask.height(), &cells)
}

/// [`skeletonize`] with a cancellation point before every subiteration.
pub fn skeletonize_with(mask: &BinaryMask, cancel: &CancelFlag) -> OpResult<BinaryMask> {
    let mut cells = cells_of(mask);
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    if w > 0 && h > 0 {
        let iterations = thin_to_convergence(&mut cells, w, h, || cancel.check())?;
        log::debug!("skeletonize: converged after {} iterations", iterations);
    }
    Ok(mask_from_cells(mask.width(), mask.height(), &cells))
}

/// Alternate subiterations until neither removes a pixel, calling `check`
/// before each one. Returns the number of full iterations.
fn thin_to_convergence<E, F>(cells: &mut [u8], w: usize, h: usize, mut check: F) -> Result<usize, E>
where
    F: FnMut() -> Result<(), E>,
{
    let mut iterations = 0usize;
    loop {
        check()?;
        let first = thin_pass(cells, w, h, Pass::First);
        check()?;
        let second = thin_pass(cells, w, h, Pass::Second);
        iterations += 1;
        if first + second == 0 {
            return Ok(iterations);
        }
    }
}

fn cells_of(mask: &BinaryMask) -> Vec<u8> {
    mask.as_gray().as_raw().iter().map(|&v| u8::from(v == FOREGROUND)).collect()
}

fn mask_from_cells(width: u32, height: u32, cells: &[u8]) -> BinaryMask {
    let mut out = GrayImage::new(width, height);
    for (dst, &c) in out.iter_mut().zip(cells) {
        *dst = if c == 1 { FOREGROUND } else { BACKGROUND };
    }
    BinaryMask::from_raw_unchecked(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpError;

    #[test]
    fn centroid_of_single_pixel() {
        let mask = BinaryMask::from_fn(6, 5, |x, y| x == 3 && y == 2);
        assert_eq!(centroid(&mask), Some(Point { x: 3, y: 2 }));
    }

    #[test]
    fn centroid_rounds_to_nearest() {
        // columns 1 and 2 → mean 1.5 rounds to 2; rows 0..=2 → mean 1
        let mask = BinaryMask::from_fn(5, 4, |x, y| (1..=2).contains(&x) && y <= 2);
        assert_eq!(centroid(&mask), Some(Point { x: 2, y: 1 }));
    }

    #[test]
    fn centroid_of_empty_mask_is_none() {
        assert_eq!(centroid(&BinaryMask::new(4, 4)), None);
    }

    #[test]
    fn thin_line_is_fixed_point() {
        let line = BinaryMask::from_fn(9, 5, |x, y| y == 2 && (1..=7).contains(&x));
        assert_eq!(skeletonize(&line), line);
    }

    #[test]
    fn thick_bar_thins_to_single_row() {
        let bar = BinaryMask::from_fn(14, 7, |x, y| (2..=11).contains(&x) && (2..=4).contains(&y));
        let skel = skeletonize(&bar);
        assert!(skel.count_foreground() > 0);
        for x in 0..14 {
            let column = (0..7).filter(|&y| skel.is_foreground(x, y)).count();
            assert!(column <= 1, "column {} has {} pixels", x, column);
        }
        for y in 0..7 {
            for x in 0..14 {
                if skel.is_foreground(x, y) {
                    assert!(bar.is_foreground(x, y));
                }
            }
        }
        assert_eq!(skeletonize(&skel), skel);
    }

    /// Number of 8-connected foreground components.
    fn components(mask: &BinaryMask) -> usize {
        let (w, h) = (mask.width() as i64, mask.height() as i64);
        let mut seen = vec![false; (w * h) as usize];
        let mut count = 0;
        for start in 0..w * h {
            if seen[start as usize] || !mask.is_foreground((start % w) as u32, (start / w) as u32) {
                continue;
            }
            count += 1;
            let mut stack = vec![start];
            seen[start as usize] = true;
            while let Some(i) = stack.pop() {
                let (x, y) = (i % w, i / w);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let j = ny * w + nx;
                        if !seen[j as usize] && mask.is_foreground(nx as u32, ny as u32) {
                            seen[j as usize] = true;
                            stack.push(j);
                        }
                    }
                }
            }
        }
        count
    }

    fn is_subset(inner: &BinaryMask, outer: &BinaryMask) -> bool {
        (0..inner.height())
            .all(|y| (0..inner.width()).all(|x| !inner.is_foreground(x, y) || outer.is_foreground(x, y)))
    }

    #[test]
    fn two_by_two_block_keeps_one_pixel() {
        let block = BinaryMask::from_fn(6, 6, |x, y| (2..=3).contains(&x) && (2..=3).contains(&y));
        let skel = skeletonize(&block);
        assert_eq!(skel.count_foreground(), 1);
        assert!(skel.is_foreground(2, 3));
    }

    #[test]
    fn thick_diagonal_keeps_both_ends_connected() {
        // rows 1..=12, two pixels per row at columns y and y + 1
        let stroke = BinaryMask::from_fn(14, 14, |x, y| (1..=12).contains(&y) && (x == y || x == y + 1));
        assert_eq!(stroke.count_foreground(), 24);
        let skel = skeletonize(&stroke);

        assert!(skel.is_foreground(1, 1));
        assert!(skel.is_foreground(13, 12));
        assert_eq!(components(&skel), 1);
        assert!(is_subset(&skel, &stroke));
        assert!(skel.count_foreground() >= 12 && skel.count_foreground() < 24);
        for y in 1..=12 {
            assert!((0..14).any(|x| skel.is_foreground(x, y)), "row {} lost", y);
        }
    }

    #[test]
    fn thick_l_thins_to_connected_l() {
        let l = BinaryMask::from_fn(14, 14, |x, y| {
            ((2..=4).contains(&x) && (2..=11).contains(&y)) || ((2..=11).contains(&x) && (9..=11).contains(&y))
        });
        let skel = skeletonize(&l);

        assert_eq!(components(&skel), 1);
        assert!(is_subset(&skel, &l));
        // both arms still reach their far ends
        assert!((0..14).any(|x| skel.is_foreground(x, 3)));
        assert!((0..14).any(|y| skel.is_foreground(10, y)));
        assert!(skel.count_foreground() < l.count_foreground() / 3);
        assert_eq!(skeletonize(&skel), skel);
    }

    #[test]
    fn cancellable_variant_matches() {
        let bar = BinaryMask::from_fn(12, 6, |x, y| (1..=10).contains(&x) && (1..=4).contains(&y));
        assert_eq!(skeletonize_with(&bar, &CancelFlag::never()), Ok(skeletonize(&bar)));
    }

    #[test]
    fn isolated_pixel_survives() {
        let dot = BinaryMask::from_fn(3, 3, |x, y| x == 1 && y == 1);
        assert_eq!(skeletonize(&dot), dot);
    }

    #[test]
    fn cancellation_is_observed() {
        let flag = CancelFlag::new();
        flag.cancel();
        let mask = BinaryMask::from_fn(4, 4, |_, _| true);
        assert_eq!(skeletonize_with(&mask, &flag), Err(OpError::Cancelled));
    }
}
