//! driftmark CLI — drift correction and track-overlay rendering for
//! microscopy image stacks.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use driftmark_core::{
    apply_alignment, draw_markers, normalize_stack, read_alignment_file, read_track_file,
    to_color, MarkerConfig, MarkerPalette, NormalizeConfig, PipelineError, RawStack, RunReport,
};

mod stack_io;
use stack_io::{write_color_stack, write_gray_stack, FileSource};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "driftmark")]
#[command(about = "Post-process microscopy stacks: correct drift from offset tables, \
                   render tracked-spot markers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rescale a stack to 8-bit grayscale.
    Normalize(NormalizeArgs),

    /// Apply a drift-offset table to a stack.
    Apply(ApplyArgs),

    /// Draw tracked-spot markers onto a stack.
    Mark(MarkArgs),
}

#[derive(Debug, Clone, Args)]
struct NormalizeArgs {
    /// Input image file(s); multipage TIFFs contribute all their planes.
    #[arg(required = true)]
    input_file: Vec<PathBuf>,

    /// Output multipage-tiff file ([basename]_norm.tif if not specified).
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,

    /// Invert the image look-up table.
    #[arg(short = 'i', long)]
    invert_image: bool,
}

#[derive(Debug, Clone, Args)]
struct ApplyArgs {
    /// Input image file(s) to correct, concatenated in order.
    #[arg(required = true)]
    input_file: Vec<PathBuf>,

    /// Alignment tsv file to apply.
    #[arg(short = 'f', long, default_value = "align.txt")]
    alignment_file: PathBuf,

    /// Output multipage-tiff file ([basename]_aligned.tif if not specified).
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,

    /// Invert the image look-up table.
    #[arg(short = 'i', long)]
    invert_image: bool,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct MarkArgs {
    /// Input multipage-tiff file to plot markers on.
    input_file: PathBuf,

    /// Marker tsv file to read ([basename].txt if not specified).
    #[arg(short = 'f', long)]
    marker_file: Option<PathBuf>,

    /// Output multipage-tiff file ([basename]_marked.tif if not specified).
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,

    /// Marker radius in pixels.
    #[arg(short = 'z', long, default_value_t = 4)]
    marker_size: u32,

    /// Marker colors for new/continued/end spots (names or #RRGGBB).
    #[arg(short = 'c', long, num_args = 3, value_names = ["NEW", "CONT", "END"],
          default_values = ["red", "orange", "blue"])]
    marker_colors: Vec<String>,

    /// Color markers per track instead of per status.
    #[arg(short = 'r', long)]
    rainbow_colors: bool,

    /// Also draw regression-interpolated spots.
    #[arg(short = 'R', long)]
    mark_regression: bool,

    /// Always draw a track's first interpolated appearance.
    #[arg(short = 'E', long)]
    force_mark_emerge: bool,

    /// Invert the image look-up table.
    #[arg(short = 'i', long)]
    invert_image: bool,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize(args) => run_normalize(&args),
        Commands::Apply(args) => run_apply(&args),
        Commands::Mark(args) => run_mark(&args),
    }
}

// ── normalize ──────────────────────────────────────────────────────────

fn run_normalize(args: &NormalizeArgs) -> CliResult<()> {
    let output = resolve_output(&args.output_file, &args.input_file, "_norm")?;

    let stack = assemble_inputs(&args.input_file)?;
    let gray = normalize_stack(
        &stack,
        &NormalizeConfig {
            invert: args.invert_image,
        },
    );

    write_gray_stack(&output, &gray)?;
    tracing::info!("Output image file to {}.", output.display());
    Ok(())
}

// ── apply ──────────────────────────────────────────────────────────────

fn run_apply(args: &ApplyArgs) -> CliResult<()> {
    let output = resolve_output(&args.output_file, &args.input_file, "_aligned")?;

    let stack = assemble_inputs(&args.input_file)?;
    let gray = normalize_stack(
        &stack,
        &NormalizeConfig {
            invert: args.invert_image,
        },
    );

    tracing::info!("Read alignments from {}.", args.alignment_file.display());
    let table = read_alignment_file(&args.alignment_file)?;

    let (corrected, warnings) = apply_alignment(&gray, &table.records);

    let mut report = RunReport::new("apply", args.input_file[0].display().to_string(), gray.len());
    report.record_warnings(warnings);
    finish_report(&report, args.report.as_deref())?;

    write_gray_stack(&output, &corrected)?;
    tracing::info!("Output image file to {}.", output.display());
    Ok(())
}

// ── mark ───────────────────────────────────────────────────────────────

fn run_mark(args: &MarkArgs) -> CliResult<()> {
    let inputs = std::slice::from_ref(&args.input_file);
    let output = resolve_output(&args.output_file, inputs, "_marked")?;
    let marker_file = resolve_marker_file(args);
    let palette = parse_palette(&args.marker_colors)?;

    let config = MarkerConfig::new(args.marker_size, palette)?
        .with_rainbow(args.rainbow_colors)
        .with_regression_marks(args.mark_regression)
        .with_forced_emerge(args.force_mark_emerge);

    let stack = assemble_inputs(inputs)?;
    let color = to_color(&normalize_stack(
        &stack,
        &NormalizeConfig {
            invert: args.invert_image,
        },
    ));

    tracing::info!("Read spots from {}.", marker_file.display());
    let table = read_track_file(&marker_file)?;
    tracing::info!(
        "Marking {} spots on {}.",
        table.len(),
        args.input_file.display()
    );

    let (marked, warnings) = draw_markers(&color, &table, &config);

    let mut report = RunReport::new("mark", args.input_file.display().to_string(), color.len());
    report.record_warnings(warnings);
    finish_report(&report, args.report.as_deref())?;

    write_color_stack(&output, &marked)?;
    tracing::info!("Output image file to {}.", output.display());
    Ok(())
}

// ── shared helpers ─────────────────────────────────────────────────────

fn assemble_inputs(inputs: &[PathBuf]) -> Result<RawStack, PipelineError> {
    RawStack::assemble(inputs.iter().map(|path| FileSource::new(path)))
}

/// Pick the output path, defaulting to `<first input basename><suffix>.tif`
/// and refusing to overwrite any input.
fn resolve_output(
    output: &Option<PathBuf>,
    inputs: &[PathBuf],
    suffix: &str,
) -> Result<PathBuf, PipelineError> {
    let output = match output {
        Some(path) => path.clone(),
        None => default_output_name(&inputs[0], suffix),
    };
    if inputs.iter().any(|input| *input == output) {
        return Err(PipelineError::Config(format!(
            "output file {} would overwrite an input file",
            output.display()
        )));
    }
    Ok(output)
}

fn default_output_name(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stack");
    PathBuf::from(format!("{stem}{suffix}.tif"))
}

/// Default the marker file to `<input dir>/<basename>.txt`; a `.tif`/`.stk`
/// value is rewritten to its `.txt` sibling.
fn resolve_marker_file(args: &MarkArgs) -> PathBuf {
    match &args.marker_file {
        None => args.input_file.with_extension("txt"),
        Some(path) => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            if matches!(ext.as_deref(), Some("tif" | "tiff" | "stk")) {
                let fixed = path.with_extension("txt");
                tracing::info!(
                    "Reading {} instead of {}.",
                    fixed.display(),
                    path.display()
                );
                fixed
            } else {
                path.clone()
            }
        }
    }
}

fn parse_palette(colors: &[String]) -> Result<MarkerPalette, PipelineError> {
    if colors.len() != 3 {
        return Err(PipelineError::Config(format!(
            "expected exactly three marker colors (new/continued/end), got {}",
            colors.len()
        )));
    }
    Ok(MarkerPalette {
        new: parse_color(&colors[0])?,
        continued: parse_color(&colors[1])?,
        end: parse_color(&colors[2])?,
    })
}

fn parse_color(name: &str) -> Result<image::Rgb<u8>, PipelineError> {
    let rgb = match name.to_ascii_lowercase().as_str() {
        "red" => [255, 0, 0],
        "green" => [0, 255, 0],
        "blue" => [0, 0, 255],
        "orange" => [255, 128, 0],
        "yellow" => [255, 255, 0],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        hex => parse_hex_color(hex).ok_or_else(|| {
            PipelineError::Config(format!("unknown marker color '{name}'"))
        })?,
    };
    Ok(image::Rgb(rgb))
}

fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Log the skip summary and optionally write the JSON report.
fn finish_report(report: &RunReport, path: Option<&Path>) -> CliResult<()> {
    if report.skipped_count() > 0 {
        tracing::warn!(
            "Skipped {} record(s) due to out-of-range indices.",
            report.skipped_count()
        );
    }
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)?;
        tracing::info!("Run report written to {}.", path.display());
    }
    Ok(())
}
