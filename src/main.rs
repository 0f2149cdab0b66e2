use clap::{Parser, Subcommand};
use imgfit::batch::{self, BatchEvent, BatchMode, BatchReport};
use imgfit::compress::Compressor;
use imgfit::config::{self, CompressorConfig};
use imgfit::format::FormatHint;
use imgfit::intake::{self, Tool};
use imgfit::naming::{self, OutputNames};
use imgfit::output;
use imgfit::types::{CancelToken, CompressionResult, ResultSummary, ValidationError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing_subscriber::EnvFilter;

const REPORT_FILE: &str = "report.json";

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

/// How per-image targets are chosen. Defaults to `--adaptive`.
#[derive(clap::Args, Clone)]
#[group(required = false, multiple = false)]
struct ModeArgs {
    /// Same target for every image, in KB
    #[arg(long, value_name = "KB")]
    target_kb: Option<u64>,

    /// Shrink every image by this percentage
    #[arg(long, value_name = "PERCENT")]
    reduce: Option<f64>,

    /// Per-image target from the image's own size
    #[arg(long)]
    adaptive: bool,
}

impl ModeArgs {
    fn mode(&self) -> Result<BatchMode, ValidationError> {
        if let Some(kb) = self.target_kb {
            BatchMode::uniform_kb(kb)
        } else if let Some(percent) = self.reduce {
            Ok(BatchMode::Proportional {
                reduction_percent: percent,
            })
        } else {
            Ok(BatchMode::Adaptive)
        }
    }
}

#[derive(Parser)]
#[command(name = "imgfit")]
#[command(about = "Recompress images to a target file size")]
#[command(long_about = "\
Recompress images to a target file size

Each image is decoded once, then re-encoded at decreasing quality until its
size lands within 5% of the target. If quality alone cannot get there, the
image is also scaled down. The result is never larger than the original when
the target is below it.

Target modes (pick one, --adaptive is the default):

  --target-kb 200   every image aims for 200 KB
  --reduce 40       every image aims for 60% of its own size
  --adaptive        small files shrink a little, large files a lot

Compression accepts JPG, PNG, WEBP, and AVIF. Conversion to WebP accepts JPG,
PNG, GIF, BMP, and SVG. Directories are searched recursively.

Run 'imgfit gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress images toward a target size
    Compress {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        mode: ModeArgs,

        /// Output format: same, jpeg, png, webp, or avif
        #[arg(long, default_value = "same")]
        format: FormatHint,

        /// Proceed even when some targets are very aggressive
        #[arg(long, short = 'y')]
        yes: bool,

        /// Output directory
        #[arg(long, short = 'o', default_value = "compressed")]
        output: PathBuf,
    },
    /// Convert images to WebP at a fixed quality
    Convert {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// WebP quality in (0, 1] (default: convert.quality from config)
        #[arg(long)]
        quality: Option<f32>,

        /// Output directory
        #[arg(long, short = 'o', default_value = "compressed")]
        output: PathBuf,
    },
    /// Show the targets a compress run would use, without encoding
    Plan {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        mode: ModeArgs,

        /// Output format: same, jpeg, png, webp, or avif
        #[arg(long, default_value = "same")]
        format: FormatHint,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgfit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compress {
            paths,
            mode,
            format,
            yes,
            output: out_dir,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let images = admit(Tool::Compress, &paths)?;
            let plan = batch::plan_batch(&images, mode.mode()?, format, &config)?;

            if plan.needs_confirmation() && !yes {
                output::print_plan(&plan, None);
                return Err(format!(
                    "Some targets are below {:.0}% of the original size. Re-run with --yes to proceed.",
                    config.batch.aggressive_ratio * 100.0
                )
                .into());
            }

            let compressor = Compressor::new(config);
            let cancel = cancel_on_ctrlc()?;
            let report = run_with_printer(|tx| {
                batch::run_batch(&compressor, &images, &plan, &cancel, Some(tx))
            })?;
            write_outputs(&report, &out_dir, |result| {
                result
                    .format
                    .map(|f| naming::compressed_file_name(&result.name, f))
            })?;
        }
        Command::Convert {
            paths,
            quality,
            output: out_dir,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let quality = quality.unwrap_or(config.convert.quality);
            if !(quality > 0.0 && quality <= 1.0) {
                return Err(format!("Quality must be within (0, 1], got {quality}").into());
            }
            let images = admit(Tool::Convert, &paths)?;
            if images.is_empty() {
                return Err(ValidationError::NoImages.into());
            }

            let compressor = Compressor::new(config);
            let cancel = cancel_on_ctrlc()?;
            let report = run_with_printer(|tx| {
                batch::run_conversion(&compressor, &images, quality, &cancel, Some(tx))
            })?;
            write_outputs(&report, &out_dir, |result| {
                Some(naming::converted_file_name(&result.name))
            })?;
        }
        Command::Plan {
            paths,
            mode,
            format,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let images = admit(Tool::Compress, &paths)?;
            let mut plan = batch::plan_batch(&images, mode.mode()?, format, &config)?;
            plan.identify(&Compressor::new(config), &images);
            output::print_plan(&plan, batch::recommend_target(&images));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Explicit `--config` must exist; otherwise `./config.toml` is optional.
fn resolve_config(path: Option<&Path>) -> Result<CompressorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) if !path.is_file() => {
            Err(format!("Config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config_file(path)?),
        None => Ok(config::load_config(Path::new("."))?),
    }
}

fn admit(
    tool: Tool,
    paths: &[PathBuf],
) -> Result<Vec<imgfit::types::SourceImage>, Box<dyn std::error::Error>> {
    let intake = intake::load(tool, paths)?;
    output::print_intake(&intake, tool);
    Ok(intake.accepted)
}

/// Ctrl+C stops the batch after the current encode; finished files are kept.
fn cancel_on_ctrlc() -> Result<CancelToken, ctrlc::Error> {
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling after the current encode...");
        handler.cancel();
    })?;
    Ok(cancel)
}

/// Run a batch while a printer thread renders its progress events.
fn run_with_printer<F>(run: F) -> Result<BatchReport, Box<dyn std::error::Error>>
where
    F: FnOnce(&Sender<BatchEvent>) -> BatchReport,
{
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let report = run(&tx);
    drop(tx);
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    Ok(report)
}

/// One `report.json` entry: the result summary plus the file it was written to.
#[derive(Serialize)]
struct ReportEntry {
    #[serde(flatten)]
    summary: ResultSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
}

/// Write every completed output plus `report.json`, then print the totals.
///
/// Outputs that would share a name are numbered instead of overwritten.
fn write_outputs<F>(
    report: &BatchReport,
    out_dir: &Path,
    file_name: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Fn(&CompressionResult) -> Option<String>,
{
    std::fs::create_dir_all(out_dir)?;
    let mut names = OutputNames::new();
    names.reserve(REPORT_FILE);

    let mut entries = Vec::with_capacity(report.results.len());
    for result in &report.results {
        let mut output_file = None;
        if let Some(blob) = &result.output
            && let Some(name) = file_name(result)
        {
            let name = names.claim(&name);
            blob.write_to(&out_dir.join(&name))?;
            output_file = Some(name);
        }
        entries.push(ReportEntry {
            summary: result.summary(),
            output_file,
        });
    }

    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(out_dir.join(REPORT_FILE), json)?;

    output::print_summary(&report.summaries(), report.cancelled);
    println!("Output: {}", out_dir.display());
    Ok(())
}
