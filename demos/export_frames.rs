//! Index a video, then export stills at a few requested times with progress
//! reporting.
//!
//! Usage:
//!   cargo run --example export_frames --features ffmpeg -- <input_file> [output_dir]

use std::error::Error;
use std::sync::Arc;

use stillframe::{
    EncodingSpec, ExportOptions, ExportOutcome, FfmpegVideo, FrameExportEngine,
    FrameExportRequest, IndexingOptions, MediaTime, OutputFormat, ProgressCallback, ProgressInfo,
    SampleTimeIndexer,
};

/// Simple progress callback that prints to stdout.
struct PrintProgress;

impl ProgressCallback for PrintProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let pct = info
            .percentage
            .map_or("??".to_string(), |p| format!("{p:.1}"));
        println!(
            "[{:?}] {}/{} ({pct}%) elapsed={:.1}s",
            info.operation,
            info.current,
            info.total.map_or("?".to_string(), |t| t.to_string()),
            info.elapsed.as_secs_f64(),
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "input.mp4".to_string());
    let output_dir = std::env::args().nth(2).unwrap_or_else(|| ".".to_string());

    let video = Arc::new(FfmpegVideo::open(&input_path)?);

    // ── Index sample times ─────────────────────────────────────────
    let indexer = SampleTimeIndexer::new();
    let table = indexer
        .start_indexing(video.clone(), IndexingOptions::new())?
        .wait()?;
    println!(
        "Indexed {} samples spanning {}",
        table.len(),
        table.duration()
    );

    // Snap a few evenly spaced times onto real sample boundaries.
    let span = table.duration().as_seconds_f64();
    let times: Vec<MediaTime> = (0..5)
        .filter_map(|step| {
            let query = MediaTime::from_seconds(span * f64::from(step) / 5.0, table.timescale());
            table.nearest_sample_timing(query)
        })
        .map(|sample| sample.presentation_time)
        .collect();

    // ── Export ─────────────────────────────────────────────────────
    let request = FrameExportRequest::new(video, times)
        .with_encoding(EncodingSpec::new(OutputFormat::Jpeg).with_jpeg_quality(85))
        .with_output_directory(output_dir)
        .with_chunk_size(2);
    let options = ExportOptions::new().with_progress(Arc::new(PrintProgress));

    match FrameExportEngine::new().start(request, options)?.wait() {
        ExportOutcome::Succeeded(paths) => {
            for path in paths {
                println!("wrote {}", path.display());
            }
        }
        ExportOutcome::Failed(error) => println!("Export failed: {error}"),
        other => println!("Export ended with {other:?}"),
    }

    Ok(())
}
