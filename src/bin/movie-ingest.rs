use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use movie_ingest::{
    CompressionCodec, ConversionOptions, FfmpegLogLevel, HandleOptions, JsonManifestWriter,
    MovieConverter, OperationType, ProgressCallback, ProgressInfo, SeriesMode, SeriesPlacement,
    VideoHandle, compute_timestamps,
};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  movie-ingest probe session1.avi --json\n  movie-ingest timestamps session1.avi\n  movie-ingest frame session1.avi --index 120 --out frame.png\n  movie-ingest convert session1.avi session2.avi --out converted --embed --progress\n  movie-ingest completions zsh > _movie-ingest";

#[derive(Debug, Parser)]
#[command(
    name = "movie-ingest",
    version,
    about = "Stream behavioural videos into a data container",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print stream properties of a video.
    #[command(
        visible_alias = "info",
        after_help = "Examples:\n  movie-ingest probe session1.avi\n  movie-ingest probe session1.avi --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Report at most ten frames.
        #[arg(long)]
        stub: bool,
    },

    /// Compute per-frame timestamps and classify them.
    #[command(
        after_help = "Examples:\n  movie-ingest timestamps session1.avi\n  movie-ingest timestamps session1.avi --json --all"
    )]
    Timestamps {
        /// Input video path.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Include every timestamp in JSON output.
        #[arg(long)]
        all: bool,
        /// Offset added to every timestamp, in seconds.
        #[arg(long, default_value_t = 0.0)]
        starting_time: f64,
    },

    /// Save one decoded frame as an image.
    #[command(after_help = "Examples:\n  movie-ingest frame session1.avi --index 120 --out frame.png")]
    Frame {
        /// Input video path.
        input: PathBuf,
        /// Frame index, from 0.
        #[arg(long, default_value_t = 0)]
        index: u64,
        /// Output image path (png, jpg, bmp, tiff).
        #[arg(long)]
        out: PathBuf,
    },

    /// Convert videos into a manifest directory.
    #[command(
        after_help = "Examples:\n  movie-ingest convert a.avi b.avi --out converted\n  movie-ingest convert a.avi --out converted --embed --memory-budget-mb 256 --progress\n  movie-ingest convert a.avi --out converted --embed --chunk-shape 10,480,640,3"
    )]
    Convert {
        /// Input video paths, converted in order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Embed decoded frames instead of linking the files.
        #[arg(long)]
        embed: bool,
        /// Request loading each video in one piece (overridden when memory is short).
        #[arg(long)]
        eager: bool,
        /// Convert at most ten frames per video.
        #[arg(long)]
        stub: bool,
        /// Memory budget per chunk, in megabytes.
        #[arg(long)]
        memory_budget_mb: Option<u64>,
        /// Explicit chunk shape, comma separated.
        #[arg(long, value_delimiter = ',')]
        chunk_shape: Vec<usize>,
        /// Compression for embedded data (gzip, lzf, none).
        #[arg(long, default_value = "gzip")]
        compression: CompressionCodec,
        /// Start time of each video in seconds, comma separated.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        starting_times: Vec<f64>,
        /// JSON metadata merged over the defaults.
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Place series in this processing module instead of acquisition.
        #[arg(long)]
        module: Option<String>,
        /// Description for a newly created processing module.
        #[arg(long, requires = "module")]
        module_description: Option<String>,
        /// Override the compressed-to-decoded size ratio.
        #[arg(long)]
        inflation_factor: Option<u64>,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?;
        movie_ingest::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn megabytes_to_bytes(megabytes: u64) -> Result<u64, Box<dyn std::error::Error>> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| format!("memory budget of {megabytes} MB is too large").into())
}

fn read_metadata(path: Option<&Path>) -> Result<Value, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(json!({})),
    }
}

/// Drives an `indicatif` bar from frame-writing progress.
struct BarProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    fn new(verbose: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar, verbose })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.operation {
            OperationType::FrameWriting => {
                if let Some(total) = info.total {
                    self.bar.set_length(total);
                }
                self.bar.set_position(info.current);
                if let Some(file) = &info.current_file {
                    self.bar.set_message(file.clone());
                }
            }
            OperationType::FileConversion => {
                if self.verbose {
                    self.bar.println(format!(
                        "converted {}/{} file(s)",
                        info.current,
                        info.total.unwrap_or(info.current)
                    ));
                }
            }
            _ => {}
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json, stub } => {
            let handle =
                VideoHandle::open_with(&input, HandleOptions::new().with_stub_mode(stub))?;
            let info = handle.stream_info();
            let shape = handle.frame_shape();
            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "frame_count": handle.frame_count(),
                    "frame_count_origin": format!("{:?}", info.frame_count_origin),
                    "fps": handle.frames_per_second(),
                    "frame_shape": [shape.height, shape.width, shape.channels],
                    "dtype": handle.frame_dtype().name(),
                    "bytes_per_frame": handle.bytes_per_frame(),
                    "codec": info.codec,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Frames: {} ({:?})", handle.frame_count(), info.frame_count_origin);
                println!("Frame rate: {:.3} fps", handle.frames_per_second());
                println!("Frame shape: {shape} [{}]", handle.frame_dtype());
                println!("Codec: {}", info.codec);
            }
        }
        Commands::Timestamps {
            input,
            json,
            all,
            starting_time,
        } => {
            let mut handle = VideoHandle::open(&input)?;
            let series = compute_timestamps(&mut handle)?.shifted(starting_time);
            let regular = series.is_regular();
            if json {
                let mut payload = json!({
                    "path": input.display().to_string(),
                    "count": series.len(),
                    "first": series.first(),
                    "last": series.last(),
                    "regular": regular,
                    "rate": regular.then(|| handle.frames_per_second()),
                });
                if all {
                    payload["timestamps"] = json!(series.values());
                }
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Timestamps: {}", series.len());
                if let (Some(first), Some(last)) = (series.first(), series.last()) {
                    println!("Span: {first:.6} s to {last:.6} s");
                }
                if regular {
                    println!(
                        "Timing: {} at {:.3} fps",
                        "regular".green(),
                        handle.frames_per_second()
                    );
                } else {
                    println!("Timing: {} (explicit timestamps)", "irregular".yellow());
                }
            }
        }
        Commands::Frame { input, index, out } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let mut handle = VideoHandle::open(&input)?;
            let frame = handle.read_frame(index)?;
            if frame.is_corrupt() {
                return Err(format!("frame {index} could not be decoded").into());
            }
            frame.to_image()?.save(&out)?;
            println!("{} {}", "saved".green().bold(), out.display());
        }
        Commands::Convert {
            inputs,
            out,
            embed,
            eager,
            stub,
            memory_budget_mb,
            chunk_shape,
            compression,
            starting_times,
            metadata,
            module,
            module_description,
            inflation_factor,
            progress,
        } => {
            let metadata = read_metadata(metadata.as_deref())?;
            let mut options = ConversionOptions::new()
                .with_reference_mode(!embed)
                .with_chunk_data(!eager)
                .with_stub_mode(stub)
                .with_compression(compression);
            if let Some(megabytes) = memory_budget_mb {
                options = options.with_memory_budget_bytes(megabytes_to_bytes(megabytes)?);
            }
            if !chunk_shape.is_empty() {
                options = options.with_chunk_shape(chunk_shape);
            }
            if !starting_times.is_empty() {
                options = options.with_starting_times(starting_times);
            }
            if let Some(name) = module {
                options = options.with_placement(SeriesPlacement::module(name, module_description));
            }
            if let Some(factor) = inflation_factor {
                options = options.with_inflation_factor(factor);
            }

            let bar = if progress && embed {
                let callback = Arc::new(BarProgress::new(cli.global.verbose)?);
                options = options.with_progress(callback.clone());
                Some(callback)
            } else {
                None
            };

            let mut writer = JsonManifestWriter::create(&out, cli.global.overwrite)?;
            let report = MovieConverter::from_paths(&inputs).run(&mut writer, &metadata, &options)?;
            let manifest = writer.finish()?;
            if let Some(callback) = bar {
                callback.bar.finish_with_message("done");
            }

            for warning in &report.warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning.to_string().yellow());
            }
            for series in &report.series {
                let mode = match series.mode {
                    SeriesMode::External => "linked",
                    SeriesMode::Embedded => "embedded",
                };
                let timing = if series.regular {
                    format!("{:.3} fps from {:.3} s", series.frames_per_second, series.starting_time)
                } else {
                    "explicit timestamps".to_string()
                };
                println!(
                    "{} {} ({} frames, {timing}, {mode})",
                    "series".cyan().bold(),
                    series.name,
                    series.frame_count
                );
                if cli.global.verbose {
                    if let Some(plan) = &series.chunk_plan {
                        eprintln!("  {} -> {plan:?}", series.source.display());
                    }
                }
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Wrote {} series to {}", report.series.len(), manifest.display()).green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "movie-ingest", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
