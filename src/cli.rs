// ============================================================================
// FilterFE CLI - headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   filterfe -i photo.png --op median:5 --op otsu -o mask.png
//   filterfe -i scans/*.jpg --recipe clean.json --output-dir out/ --format png
//   filterfe -i shape.png --op otsu --op centroid --op skeleton
//   filterfe -i a.png b.png --op rotate:30 --output-dir rotated/
//
// Recipe steps run first, then every `--op` in the order given. Centroid and
// histogram steps print a report line and leave the image unchanged.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::history::HistoryManager;
use crate::io::{self, IoResult, SaveFormat};
use crate::ops::Operation;
use crate::ops::cancel::CancelFlag;
use crate::project::{Applied, Document};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// FilterFE headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "filterfe",
    version,
    about = "FilterFE headless batch image processor",
    long_about = "Apply filters, thresholds, morphology and geometric transforms to image\n\
                  files without opening an editor. Reads and writes PNG, JPEG, WEBP, BMP,\n\
                  TGA, ICO, TIFF and PNM.\n\n\
                  Operations: mean[:k] median[:k] edge smooth sharpen equalize stretch\n\
                  threshold:T otsu kapur dilate erode skeleton centroid histogram\n\
                  rotate[:deg] shear[:x[,y]] flip_h flip_v\n\n\
                  Example:\n  \
                  filterfe --input scan.png --op median:3 --op otsu --output mask.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Operation to apply, e.g. "mean:5", "rotate:45", "otsu". Repeatable;
    /// steps run in the order given.
    #[arg(long = "op", value_name = "OP", value_parser = parse_operation)]
    pub ops: Vec<Operation>,

    /// JSON file holding an array of operations, applied before any --op.
    #[arg(long, value_name = "FILE.json")]
    pub recipe: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, ico, tiff, pnm.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Undo depth kept per document.
    #[arg(long, default_value_t = crate::history::DEFAULT_HISTORY_SIZE, value_name = "STEPS")]
    pub history: usize,

    /// Mirror every log record to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_operation(s: &str) -> Result<Operation, String> {
    s.parse::<Operation>().map_err(|e| e.to_string())
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        log::error!("no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        log::error!(
            "{} input files given but --output only accepts a single file path. \
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    // Recipe steps first, then --op steps
    let mut steps: Vec<Operation> = Vec::new();
    if let Some(path) = &args.recipe {
        match io::load_recipe(path) {
            Ok(ops) => steps.extend(ops),
            Err(e) => {
                log::error!("could not read recipe '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }
    steps.extend(args.ops.iter().cloned());
    log::info!(
        "pipeline: [{}]",
        steps.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(", ")
    );

    // Create output directory if specified
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        log::error!("could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let cancel = CancelFlag::new();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        log::info!("[{}/{}] {}", idx + 1, total, input_path.display());

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            log::error!("cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let job = Job {
            input: input_path,
            output: &output_path,
            steps: &steps,
            format: save_format,
            quality: args.quality,
            history: args.history,
        };
        match run_one(&job, &cancel) {
            Ok(reports) => {
                for line in reports {
                    println!("{}: {}", input_path.display(), line);
                }
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log::error!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

struct Job<'a> {
    input: &'a Path,
    output: &'a Path,
    steps: &'a [Operation],
    format: SaveFormat,
    quality: u8,
    history: usize,
}

/// Load, apply every step, save. Returns the report lines produced by
/// centroid / histogram steps.
fn run_one(job: &Job<'_>, cancel: &CancelFlag) -> IoResult<Vec<String>> {
    // -- Step 1: Load ----------------------------------------------------
    let mut doc = Document::open(job.input)?.with_history(HistoryManager::new(job.history));

    // -- Step 2: Apply operations ----------------------------------------
    let mut reports = Vec::new();
    for op in job.steps {
        let started = Instant::now();
        match doc.apply(op, cancel)? {
            Applied::Image => {}
            Applied::Centroid(Some(p)) => reports.push(format!("centroid x={} y={}", p.x, p.y)),
            Applied::Centroid(None) => reports.push("centroid none (empty mask)".to_string()),
            Applied::Histogram(hist) => {
                let bins = serde_json::to_string(&hist.bins()[..])?;
                reports.push(format!("histogram {}", bins));
            }
        }
        log::debug!("  {} took {:.1}ms", op, started.elapsed().as_secs_f64() * 1000.0);
    }

    // -- Step 3: Save ----------------------------------------------------
    doc.save_as(job.output, job.format, job.quality)?;
    Ok(reports)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path - use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    log::warn!("pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                log::warn!("invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).unwrap_or_else(|| {
            log::warn!("unknown format '{}', writing png", f);
            SaveFormat::Png
        });
    }

    output.and_then(SaveFormat::from_path).unwrap_or_default()
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_operations_in_order() {
        let args = CliArgs::try_parse_from([
            "filterfe", "-i", "a.png", "--op", "median:5", "--op", "otsu", "-q", "70",
        ])
        .unwrap();
        assert_eq!(args.ops, vec![Operation::Median { kernel_size: 5 }, Operation::Otsu]);
        assert_eq!(args.quality, 70);
        assert_eq!(args.history, 50);
        assert!(!args.verbose);
    }

    #[test]
    fn args_reject_bad_values() {
        assert!(CliArgs::try_parse_from(["filterfe", "-i", "a.png", "--op", "mean:4"]).is_err());
        assert!(CliArgs::try_parse_from(["filterfe", "-i", "a.png", "-q", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["filterfe", "--op", "otsu"]).is_err());
    }

    #[test]
    fn format_from_flag_or_extension() {
        assert_eq!(parse_format(Some("JPEG"), None), SaveFormat::Jpeg);
        assert_eq!(parse_format(Some("nonsense"), None), SaveFormat::Png);
        assert_eq!(parse_format(None, Some(Path::new("x/out.tif"))), SaveFormat::Tiff);
        assert_eq!(parse_format(None, Some(Path::new("x/out"))), SaveFormat::Png);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("shots/cat.png");
        assert_eq!(
            build_output_path(input, Some(Path::new("o.bmp")), Some(Path::new("d")), SaveFormat::Png),
            Some(PathBuf::from("o.bmp"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("d")), SaveFormat::Jpeg),
            Some(PathBuf::from("d/cat.jpg"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Png),
            Some(PathBuf::from("shots/cat_out.png"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Tiff),
            Some(PathBuf::from("shots/cat.tiff"))
        );
    }

    #[test]
    fn inputs_expand_globs_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let literal = dir.path().join("a.png").to_string_lossy().into_owned();
        let pattern = dir.path().join("*.png").to_string_lossy().into_owned();
        let missing = dir.path().join("*.gif").to_string_lossy().into_owned();

        let found = resolve_inputs(&[literal, pattern, missing]);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.png"));
        assert!(found[1].ends_with("b.png"));
    }
}
