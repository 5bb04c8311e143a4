// ============================================================================
// OPERATIONS - every user-facing image action and its dispatcher
// ============================================================================
//
// `Operation` names one action with its parameters. It parses from the short
// command-line spelling (`mean:5`, `rotate:45`, `shear:0.2,0`, `otsu`) and
// from JSON recipes (`{"op": "mean", "kernel_size": 5}`), and `apply` routes
// it to the matching component. Intensity operations see the canvas as
// grayscale; mask operations additionally require a 0/255 buffer.

pub mod analysis;
pub mod cancel;
pub mod filters;
pub mod histogram;
pub mod morphology;
pub mod threshold;
pub mod transform;

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::canvas::{BinaryMask, Canvas};
use crate::error::{OpError, OpResult};

use self::analysis::Point;
use self::cancel::CancelFlag;
use self::filters::DEFAULT_KERNEL_SIZE;
use self::histogram::Histogram;
use self::transform::{DEFAULT_SHEAR_X, DEFAULT_SHEAR_Y};

/// Angle used by `rotate` when none is given.
pub const DEFAULT_ROTATION_DEG: f64 = 90.0;

fn default_kernel_size() -> usize {
    DEFAULT_KERNEL_SIZE
}
fn default_angle() -> f64 {
    DEFAULT_ROTATION_DEG
}
fn default_shear_x() -> f64 {
    DEFAULT_SHEAR_X
}
fn default_shear_y() -> f64 {
    DEFAULT_SHEAR_Y
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Mean {
        #[serde(default = "default_kernel_size")]
        kernel_size: usize,
    },
    Median {
        #[serde(default = "default_kernel_size")]
        kernel_size: usize,
    },
    Edge,
    Smooth,
    Sharpen,
    Equalize,
    Stretch,
    Threshold {
        level: u8,
    },
    Otsu,
    Kapur,
    Dilate,
    Erode,
    Centroid,
    Skeleton,
    Histogram,
    Rotate {
        #[serde(default = "default_angle")]
        angle: f64,
    },
    Shear {
        #[serde(default = "default_shear_x")]
        x: f64,
        #[serde(default = "default_shear_y")]
        y: f64,
    },
    FlipH,
    FlipV,
}

/// What an operation produced.
#[derive(Clone, Debug, PartialEq)]
pub enum OpOutput {
    /// A new buffer that replaces the current one.
    Image(Canvas),
    /// Centroid report; the buffer is left alone.
    Centroid(Option<Point>),
    /// Histogram report; the buffer is left alone.
    Histogram(Histogram),
}

impl Operation {
    /// Short lowercase name, as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Mean { .. } => "mean",
            Operation::Median { .. } => "median",
            Operation::Edge => "edge",
            Operation::Smooth => "smooth",
            Operation::Sharpen => "sharpen",
            Operation::Equalize => "equalize",
            Operation::Stretch => "stretch",
            Operation::Threshold { .. } => "threshold",
            Operation::Otsu => "otsu",
            Operation::Kapur => "kapur",
            Operation::Dilate => "dilate",
            Operation::Erode => "erode",
            Operation::Centroid => "centroid",
            Operation::Skeleton => "skeleton",
            Operation::Histogram => "histogram",
            Operation::Rotate { .. } => "rotate",
            Operation::Shear { .. } => "shear",
            Operation::FlipH => "flip_h",
            Operation::FlipV => "flip_v",
        }
    }

    /// Human-readable label used for undo history entries.
    pub fn label(&self) -> String {
        match self {
            Operation::Mean { kernel_size } => format!("Mean Filter {0}×{0}", kernel_size),
            Operation::Median { kernel_size } => format!("Median Filter {0}×{0}", kernel_size),
            Operation::Edge => "Edge Filter".into(),
            Operation::Smooth => "Smoothing Filter".into(),
            Operation::Sharpen => "Sharpen".into(),
            Operation::Equalize => "Equalize Histogram".into(),
            Operation::Stretch => "Stretch Contrast".into(),
            Operation::Threshold { level } => format!("Threshold {}", level),
            Operation::Otsu => "Otsu Threshold".into(),
            Operation::Kapur => "Kapur Threshold".into(),
            Operation::Dilate => "Dilate".into(),
            Operation::Erode => "Erode".into(),
            Operation::Centroid => "Centroid".into(),
            Operation::Skeleton => "Skeletonize".into(),
            Operation::Histogram => "Histogram".into(),
            Operation::Rotate { angle } => format!("Rotate {}°", angle),
            Operation::Shear { x, y } => format!("Shear ({}, {})", x, y),
            Operation::FlipH => "Flip Horizontal".into(),
            Operation::FlipV => "Flip Vertical".into(),
        }
    }

    /// Reports leave the canvas untouched.
    pub fn is_report(&self) -> bool {
        matches!(self, Operation::Centroid | Operation::Histogram)
    }

    /// Run the operation against `canvas`.
    pub fn apply(&self, canvas: &Canvas, cancel: &CancelFlag) -> OpResult<OpOutput> {
        canvas.ensure_non_empty()?;
        let image = |img: GrayImage| -> OpResult<OpOutput> { Ok(OpOutput::Image(Canvas::Gray(img))) };
        let mask = |m: BinaryMask| -> OpResult<OpOutput> { Ok(OpOutput::Image(Canvas::from(m))) };

        match self {
            Operation::Mean { kernel_size } => image(filters::mean_filter(&canvas.to_gray(), *kernel_size)?),
            Operation::Median { kernel_size } => {
                image(filters::median_filter_with(&canvas.to_gray(), *kernel_size, cancel)?)
            }
            Operation::Edge => image(filters::edge_filter(&canvas.to_gray())?),
            Operation::Smooth => image(filters::smoothing_filter(&canvas.to_gray())?),
            Operation::Sharpen => image(filters::sharpen_filter(&canvas.to_gray())?),
            Operation::Equalize => image(histogram::equalize_histogram(&canvas.to_gray())?),
            Operation::Stretch => image(histogram::stretch_contrast(&canvas.to_gray())?),
            Operation::Threshold { level } => mask(threshold::manual_threshold(&canvas.to_gray(), *level)?),
            Operation::Otsu => mask(threshold::otsu_threshold_with(&canvas.to_gray(), cancel)?),
            Operation::Kapur => mask(threshold::kapur_threshold_with(&canvas.to_gray(), cancel)?),
            Operation::Dilate => mask(morphology::dilate(&BinaryMask::from_gray(canvas.to_gray())?)),
            Operation::Erode => mask(morphology::erode(&BinaryMask::from_gray(canvas.to_gray())?)),
            Operation::Skeleton => {
                mask(analysis::skeletonize_with(&BinaryMask::from_gray(canvas.to_gray())?, cancel)?)
            }
            Operation::Centroid => {
                let m = BinaryMask::from_gray(canvas.to_gray())?;
                Ok(OpOutput::Centroid(analysis::centroid(&m)))
            }
            Operation::Histogram => Ok(OpOutput::Histogram(Histogram::from_image(&canvas.to_gray()))),
            Operation::Rotate { angle } => Ok(OpOutput::Image(transform::rotate(canvas, *angle)?)),
            Operation::Shear { x, y } => Ok(OpOutput::Image(transform::shear(canvas, *x, *y)?)),
            Operation::FlipH => Ok(OpOutput::Image(transform::flip_horizontal(canvas))),
            Operation::FlipV => Ok(OpOutput::Image(transform::flip_vertical(canvas))),
        }
    }
}

// ---------------------------------------------------------------------------
//  Command-line spelling
// ---------------------------------------------------------------------------

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Mean { kernel_size } | Operation::Median { kernel_size } => {
                write!(f, "{}:{}", self.name(), kernel_size)
            }
            Operation::Threshold { level } => write!(f, "threshold:{}", level),
            Operation::Rotate { angle } => write!(f, "rotate:{}", angle),
            Operation::Shear { x, y } => write!(f, "shear:{},{}", x, y),
            _ => f.write_str(self.name()),
        }
    }
}

fn bad(msg: String) -> OpError {
    OpError::ParameterOutOfRange(msg)
}

fn parse_kernel(name: &str, args: &[&str]) -> OpResult<usize> {
    let size = match args.first() {
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| bad(format!("{}: kernel size '{}' is not a positive integer", name, s)))?,
        None => DEFAULT_KERNEL_SIZE,
    };
    filters::check_kernel_size(size)
}

fn parse_real(name: &str, arg: Option<&&str>, default: f64) -> OpResult<f64> {
    let value = match arg {
        Some(s) => s
            .parse::<f64>()
            .map_err(|_| bad(format!("{}: '{}' is not a number", name, s)))?,
        None => default,
    };
    if !value.is_finite() {
        return Err(bad(format!("{}: parameter must be finite, got {}", name, value)));
    }
    Ok(value)
}

impl FromStr for Operation {
    type Err = OpError;

    /// `name[:arg[,arg]]`, case-insensitive, with a few common aliases.
    fn from_str(s: &str) -> OpResult<Self> {
        let s = s.trim();
        let (name, rest) = match s.split_once(':') {
            Some((n, r)) => (n, Some(r)),
            None => (s, None),
        };
        let name = name.trim().to_lowercase();
        let args: Vec<&str> = rest
            .map(|r| r.split(',').map(str::trim).filter(|a| !a.is_empty()).collect())
            .unwrap_or_default();

        let op = match name.as_str() {
            "mean" | "box" => Operation::Mean { kernel_size: parse_kernel("mean", &args)? },
            "median" => Operation::Median { kernel_size: parse_kernel("median", &args)? },
            "edge" | "edges" => Operation::Edge,
            "smooth" | "smoothing" => Operation::Smooth,
            "sharpen" => Operation::Sharpen,
            "equalize" | "equalise" => Operation::Equalize,
            "stretch" | "contrast" => Operation::Stretch,
            "threshold" => {
                let raw = args
                    .first()
                    .ok_or_else(|| bad("threshold: a level in 0..=255 is required".into()))?;
                let value = raw
                    .parse::<i64>()
                    .map_err(|_| bad(format!("threshold: '{}' is not an integer", raw)))?;
                Operation::Threshold { level: threshold::checked_level(value)? }
            }
            "otsu" => Operation::Otsu,
            "kapur" | "entropy" => Operation::Kapur,
            "dilate" => Operation::Dilate,
            "erode" => Operation::Erode,
            "centroid" => Operation::Centroid,
            "skeleton" | "skeletonize" | "thin" => Operation::Skeleton,
            "histogram" | "hist" => Operation::Histogram,
            "rotate" => Operation::Rotate { angle: parse_real("rotate", args.first(), DEFAULT_ROTATION_DEG)? },
            "shear" => Operation::Shear {
                x: parse_real("shear", args.first(), DEFAULT_SHEAR_X)?,
                y: parse_real("shear", args.get(1), DEFAULT_SHEAR_Y)?,
            },
            "flip_h" | "fliph" | "flip-h" | "mirror" => Operation::FlipH,
            "flip_v" | "flipv" | "flip-v" => Operation::FlipV,
            other => return Err(bad(format!("unknown operation '{}'", other))),
        };
        Ok(op)
    }
}
