// ============================================================================
// MORPHOLOGY - binary dilation / erosion with a 3×3 structuring element
// ============================================================================
//
// The border is padded with one ring of background, so erosion always
// clears the outermost pixels. Both operators are single-pass.

use image::GrayImage;
use rayon::prelude::*;

use crate::canvas::{BACKGROUND, BinaryMask, FOREGROUND};
use crate::ops::filters::Border;

/// 3×3 all-ones structuring element.
const STRUCTURING_ELEMENT: [[bool; 3]; 3] = [[true; 3]; 3];

#[derive(Clone, Copy)]
enum Rule {
    Any,
    All,
}

fn apply(mask: &BinaryMask, rule: Rule) -> BinaryMask {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    if w == 0 || h == 0 {
        return mask.clone();
    }
    let src_raw = mask.as_gray().as_raw();
    let pad = Border::Constant(BACKGROUND);
    let mut dst = GrayImage::new(mask.width(), mask.height());

    dst.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut hits = 0usize;
            let mut taps = 0usize;
            for (ky, se_row) in STRUCTURING_ELEMENT.iter().enumerate() {
                let sy = pad.resolve(y as isize + ky as isize - 1, h);
                for (kx, &on) in se_row.iter().enumerate() {
                    if !on {
                        continue;
                    }
                    taps += 1;
                    let sx = pad.resolve(x as isize + kx as isize - 1, w);
                    if let (Some(sy), Some(sx)) = (sy, sx) {
                        if src_raw[sy * w + sx] != BACKGROUND {
                            hits += 1;
                        }
                    }
                }
            }
            let set = match rule {
                Rule::Any => hits > 0,
                Rule::All => hits == taps,
            };
            *out = if set { FOREGROUND } else { BACKGROUND };
        }
    });

    BinaryMask::from_raw_unchecked(dst)
}

/// Foreground wherever any sample of the 3×3 window is foreground.
pub fn dilate(mask: &BinaryMask) -> BinaryMask {
    apply(mask, Rule::Any)
}

/// Foreground only where every sample of the 3×3 window is foreground.
pub fn erode(mask: &BinaryMask) -> BinaryMask {
    apply(mask, Rule::All)
}
