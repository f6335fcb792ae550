use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use stillframe::{
    EncodingSpec, ExportOptions, ExportOutcome, FfmpegLogLevel, FfmpegVideo, FrameExportEngine,
    FrameExportRequest, IndexingOptions, MediaTime, OutputFormat, ProgressCallback, ProgressInfo,
    RetryPolicy, SampleTimeIndexer, SampleTimingTable, VideoSource,
};

const CLI_AFTER_HELP: &str = "Examples:\n  stillframe index input.mp4 --json\n  stillframe nearest input.mp4 1.5 00:01:02.25\n  stillframe export input.mp4 --at 1.5 --at 3 --format jpg --exact --progress\n  stillframe completions zsh > _stillframe";

#[derive(Debug, Parser)]
#[command(
    name = "stillframe",
    version,
    about = "Index video sample timings and export frame-accurate stills",
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
    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index the sample timings of the primary video track.
    #[command(
        about = "Index sample timings",
        after_help = "Examples:\n  stillframe index input.mp4\n  stillframe index input.mp4 --json --limit 500000"
    )]
    Index {
        /// Input video path.
        input: PathBuf,
        /// Output the summary as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Abort when the track holds more samples than this.
        #[arg(long)]
        limit: Option<usize>,
        /// Restart a failed pass up to this many times.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Snap times to the frames displayed at them.
    #[command(
        about = "Find the frame shown at each time",
        after_help = "Examples:\n  stillframe nearest input.mp4 1.5 2.75\n  stillframe nearest input.mp4 00:01:02 --json"
    )]
    Nearest {
        /// Input video path.
        input: PathBuf,
        /// Times as seconds, mm:ss, or hh:mm:ss.
        #[arg(required = true)]
        times: Vec<String>,
        /// Output results as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export still frames at the given times.
    #[command(
        about = "Export still frames",
        after_help = "Examples:\n  stillframe export input.mp4 --at 1.5 --at 3 --out stills\n  stillframe export input.mp4 --at 0:10 --format jpg --quality 85 --max-width 640 --max-height 640"
    )]
    Export {
        /// Input video path.
        input: PathBuf,
        /// Time to export (repeatable). Seconds, mm:ss, or hh:mm:ss.
        #[arg(long = "at", required = true)]
        times: Vec<String>,
        /// Parent directory of the run directory (default: system temp).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Output image format (png, jpg, jpeg, bmp, tiff, webp).
        #[arg(long, default_value = "png")]
        format: String,
        /// JPEG quality (1-100).
        #[arg(long, default_value_t = 90)]
        quality: u8,
        /// Frames per processing chunk.
        #[arg(long, default_value_t = stillframe::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Maximum output width (requires --max-height).
        #[arg(long, requires = "max_height")]
        max_width: Option<u32>,
        /// Maximum output height (requires --max-width).
        #[arg(long, requires = "max_width")]
        max_height: Option<u32>,
        /// Index the video first and snap each time to the frame shown at it.
        #[arg(long)]
        exact: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds, trimmed);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds, trimmed)
}

fn seconds_to_duration(
    seconds: f64,
    original: &str,
) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() {
        return Err(format!("time value must be finite: {original}").into());
    }
    Duration::try_from_secs_f64(seconds.max(0.0))
        .map_err(|_| format!("time value out of range: {original}").into())
}

fn parse_times(values: &[String]) -> Result<Vec<MediaTime>, Box<dyn std::error::Error>> {
    values
        .iter()
        .map(|value| parse_timecode(value).map(MediaTime::from_duration))
        .collect()
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::from_name(level).ok_or(format!("unsupported --log-level: {level}"))?;
        stillframe::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

struct TerminalProgress;

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.total {
            Some(total) => eprintln!("{} {}/{}", "progress".cyan().bold(), info.current, total),
            None => eprintln!("{} {}", "progress".cyan().bold(), info.current),
        }
    }
}

fn build_index(
    video: Arc<FfmpegVideo>,
    global: &GlobalOptions,
    limit: Option<usize>,
    retries: u32,
) -> Result<SampleTimingTable, Box<dyn std::error::Error>> {
    let mut options = IndexingOptions::new().with_batch_size(10_000);
    if let Some(limit) = limit {
        options = options.with_sample_limit(limit);
    }
    if retries > 0 {
        options = options.with_retry_policy(RetryPolicy::Attempts(retries));
    }
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress));
    }

    let indexer = SampleTimeIndexer::new();
    Ok(indexer.start_indexing(video, options)?.wait()?)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Index {
            input,
            json,
            limit,
            retries,
        } => {
            let video = Arc::new(FfmpegVideo::open(&input)?);
            let track = video
                .primary_video_track()?
                .ok_or("no decodable video track")?;
            let table = build_index(Arc::clone(&video), &cli.global, limit, retries)?;

            let first = table.first().map(|sample| sample.presentation_time.as_seconds_f64());
            let last = table.last().map(|sample| sample.presentation_time.as_seconds_f64());
            if json {
                let payload = json!({
                    "track": track.index,
                    "width": track.width,
                    "height": track.height,
                    "timescale": table.timescale(),
                    "sample_count": table.len(),
                    "duration_seconds": table.duration().as_seconds_f64(),
                    "first_sample_seconds": first,
                    "last_sample_seconds": last,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Track: {} ({}x{})", track.index, track.width, track.height);
                println!("Timescale: {}", table.timescale());
                println!("Samples: {}", table.len());
                println!("Duration: {:.3}s", table.duration().as_seconds_f64());
            }
        }
        Commands::Nearest { input, times, json } => {
            let times = parse_times(&times)?;
            let video = Arc::new(FfmpegVideo::open(&input)?);
            let table = build_index(video, &cli.global, None, 0)?;

            let mut results = Vec::with_capacity(times.len());
            for time in times {
                let index = table.index_of_nearest_sample(time);
                let sample = table.nearest_sample_timing(time);
                let within_second = table.nearest_sample_index_within_second(time);
                if json {
                    results.push(json!({
                        "query_seconds": time.as_seconds_f64(),
                        "sample_index": index,
                        "presentation_seconds": sample.map(|s| s.presentation_time.as_seconds_f64()),
                        "duration_seconds": sample.map(|s| s.duration.as_seconds_f64()),
                        "index_within_second": within_second,
                    }));
                } else {
                    match (index, sample, within_second) {
                        (Some(index), Some(sample), Some(within_second)) => println!(
                            "{:.3}s -> sample {} at {:.3}s (#{} in second {})",
                            time.as_seconds_f64(),
                            index,
                            sample.presentation_time.as_seconds_f64(),
                            within_second,
                            sample.presentation_time.whole_seconds(),
                        ),
                        _ => println!("{:.3}s -> no samples", time.as_seconds_f64()),
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
        }
        Commands::Export {
            input,
            times,
            out,
            format,
            quality,
            chunk_size,
            max_width,
            max_height,
            exact,
        } => {
            let format = OutputFormat::from_extension(&format)
                .ok_or(format!("unsupported --format: {format}"))?;
            let mut times = parse_times(&times)?;
            let video = Arc::new(FfmpegVideo::open(&input)?);

            if exact {
                let table = build_index(Arc::clone(&video), &cli.global, None, 0)?;
                for time in &mut times {
                    if let Some(sample) = table.nearest_sample_timing(*time) {
                        *time = sample.presentation_time;
                    }
                }
            }

            let mut request = FrameExportRequest::new(video, times.clone())
                .with_encoding(EncodingSpec::new(format).with_jpeg_quality(quality))
                .with_chunk_size(chunk_size);
            if let Some(out) = out {
                request = request.with_output_directory(out);
            }
            if let (Some(width), Some(height)) = (max_width, max_height) {
                request = request.with_max_size(width, height);
            }

            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new(times.len() as u64);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            let engine = FrameExportEngine::new();
            let mut run = engine.start(request, ExportOptions::new())?;
            let mut terminal = None;
            while let Some(outcome) = run.recv_blocking() {
                if let (Some(pb), ExportOutcome::Progressed(paths)) = (&progress_bar, &outcome) {
                    pb.set_position(paths.len() as u64);
                }
                if cli.global.verbose {
                    if let Some(path) = outcome.paths().last() {
                        eprintln!("{} {}", "wrote".cyan(), path.display());
                    }
                }
                if outcome.is_terminal() {
                    terminal = Some(outcome);
                }
            }
            if let Some(pb) = &progress_bar {
                pb.finish_and_clear();
            }

            match terminal {
                Some(ExportOutcome::Succeeded(paths)) => {
                    let directory = paths
                        .first()
                        .and_then(|path| path.parent())
                        .map(|parent| parent.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "{} exported {} frame(s) to {}",
                        "success:".green().bold(),
                        paths.len(),
                        directory
                    );
                }
                Some(ExportOutcome::Failed(error)) => {
                    return Err(format!("export failed: {error}").into());
                }
                Some(ExportOutcome::Cancelled) => return Err("export cancelled".into()),
                Some(ExportOutcome::Progressed(_)) | None => {
                    return Err("export ended without a result".into());
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "stillframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
