//! pedwatch - run one pedestrian detection session over a video source
//!
//! The runner:
//! 1. Loads configuration (file + environment + flags)
//! 2. Builds a frame source and an inference backend
//! 3. Loads the model (one attempt) with a progress bar
//! 4. Ticks the session to completion, Ctrl-C finalizes early
//! 5. Prints a summary and optionally exports the CSV result log

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use pedwatch::config::EngineConfig;
use pedwatch::detect::ScriptedBackend;
use pedwatch::results::DEFAULT_EXPORT_FILENAME;
use pedwatch::session::{TickOutcome, PLAYBACK_PRESETS};
use pedwatch::video::looks_like_video_path;
use pedwatch::{
    BoundingBox, Detection, FrameSource, ModelHandle, OverlayToggles, SessionController,
    SyntheticClipSource,
};

#[derive(Parser, Debug)]
#[command(name = "pedwatch", version, about = "Pedestrian detection session runner")]
struct Args {
    /// Video file or stub:// clip name (overrides configuration)
    #[arg(long)]
    source: Option<String>,

    /// Confidence threshold, 0.1 to 0.95
    #[arg(long)]
    threshold: Option<f32>,

    /// Playback speed preset: 0.25, 0.5, 1 or 2
    #[arg(long)]
    speed: Option<f32>,

    /// Stop after this many frames instead of the end of the source
    #[arg(long)]
    max_frames: Option<u64>,

    /// Export the result log as CSV, default file name when no path given
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_EXPORT_FILENAME)]
    export: Option<PathBuf>,

    /// Write the final overlay surface as a PNG
    #[arg(long)]
    dump_overlay: Option<PathBuf>,

    /// Font file for overlay text (overrides configuration)
    #[arg(long, env = "PEDWATCH_FONT")]
    font: Option<PathBuf>,

    #[arg(long)]
    no_boxes: bool,

    #[arg(long)]
    no_labels: bool,

    /// Draw motion trails (off by default)
    #[arg(long)]
    trails: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = EngineConfig::load()?;
    if let Some(source) = &args.source {
        if !looks_like_video_path(source) {
            return Err(anyhow!("'{source}' is not a playable video path"));
        }
        config.source = source.clone();
    }
    if let Some(speed) = args.speed {
        if !PLAYBACK_PRESETS.iter().any(|p| (p - speed).abs() < 1e-6) {
            return Err(anyhow!("--speed must be one of 0.25, 0.5, 1 or 2"));
        }
        config.playback_rate = speed;
    }

    let source = build_source(&config)?;
    let backend = build_backend(&config)?;
    let mut session = SessionController::new(source, ModelHandle::new(backend));

    session.set_confidence_threshold(args.threshold.unwrap_or(config.model.suggested_threshold));
    session.set_playback_rate(config.playback_rate);
    session.overlay_mut().set_toggles(OverlayToggles {
        boxes: !args.no_boxes,
        labels: !args.no_labels,
        trails: args.trails,
    });
    if let Some(font) = args.font.as_ref().or(config.overlay_font.as_ref()) {
        session.overlay_mut().load_font(font)?;
    } else {
        log::warn!("no overlay font configured; overlay text will be skipped");
    }

    load_model(&mut session, &config)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    log::info!(
        "processing '{}' (model {}, threshold {:.2}, speed {}x)",
        config.source,
        config.model.variant,
        session.confidence_threshold(),
        session.playback_rate()
    );

    session.start()?;
    let mut frames = 0u64;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            log::warn!("interrupted; finalizing session early");
            session.pause();
            break;
        }
        match session.tick()? {
            TickOutcome::Completed => break,
            TickOutcome::Inactive => break,
            TickOutcome::Processed | TickOutcome::Skipped => {
                frames += 1;
                if args.max_frames.is_some_and(|max| frames >= max) {
                    log::info!("reached --max-frames {frames}; stopping");
                    session.pause();
                    break;
                }
            }
        }
    }

    print_summary(&session, &config);

    if let Some(path) = &args.export {
        if session.results().is_empty() {
            log::warn!("nothing to export; result log is empty");
        } else {
            session.results().export_to_path(path)?;
            println!("results written to {}", path.display());
        }
    }
    if let Some(path) = &args.dump_overlay {
        session
            .overlay()
            .surface()
            .save(path)
            .with_context(|| format!("failed to write overlay image {}", path.display()))?;
        println!("overlay written to {}", path.display());
    }

    Ok(())
}

fn build_source(config: &EngineConfig) -> Result<Box<dyn FrameSource>> {
    if config.source.starts_with("stub://") {
        let clip = SyntheticClipSource::new(
            &config.source,
            config.clip.width,
            config.clip.height,
            config.clip.fps,
            config.clip.frames,
        )?;
        return Ok(Box::new(clip));
    }

    #[cfg(feature = "source-ffmpeg")]
    {
        Ok(Box::new(pedwatch::video::FfmpegFileSource::open(
            &config.source,
        )?))
    }
    #[cfg(not(feature = "source-ffmpeg"))]
    {
        Err(anyhow!(
            "file sources require the source-ffmpeg feature; try a stub:// clip"
        ))
    }
}

fn build_backend(config: &EngineConfig) -> Result<Box<dyn pedwatch::InferenceBackend>> {
    if let Some(onnx_path) = &config.model.onnx_path {
        #[cfg(feature = "backend-tract")]
        {
            let backend = pedwatch::detect::TractBackend::new(
                onnx_path,
                config.clip.width,
                config.clip.height,
            )
            .with_labels(vec!["person".to_string()]);
            return Ok(Box::new(backend));
        }
        #[cfg(not(feature = "backend-tract"))]
        return Err(anyhow!(
            "ONNX model {} requires the backend-tract feature",
            onnx_path.display()
        ));
    }
    Ok(Box::new(demo_backend(config.clip.frames)))
}

/// Scripted walkway scene: two pedestrians crossing, a third joining midway.
fn demo_backend(frames: u64) -> ScriptedBackend {
    let mut script = Vec::with_capacity(frames as usize);
    for n in 0..frames {
        let t = n as f32;
        let mut frame = vec![
            Detection::person(BoundingBox::new(40.0 + t * 2.0, 120.0, 46.0, 110.0), 0.91),
            Detection::person(BoundingBox::new(520.0 - t * 1.5, 140.0, 42.0, 100.0), 0.84),
        ];
        if n >= frames / 2 {
            frame.push(Detection::person(
                BoundingBox::new(300.0, 90.0 + (t % 40.0), 40.0, 95.0),
                0.72,
            ));
        }
        script.push(frame);
    }
    ScriptedBackend::new(script)
}

fn load_model(session: &mut SessionController, config: &EngineConfig) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:30}] {pos}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(format!("loading {}", config.model.variant));
    session.load_model(|pct| bar.set_position(pct as u64))?;
    bar.finish_and_clear();
    log::info!("model ready: {}", session.model_variant());
    Ok(())
}

fn print_summary(session: &SessionController, config: &EngineConfig) {
    let stats = session.stats();
    println!("session summary");
    println!("  source            {}", config.source);
    println!(
        "  model             {} ({})",
        config.model.variant, config.model.runtime
    );
    println!("  frames logged     {}", session.results().len());
    println!("  frames reached    {}", stats.processed_frames);
    println!("  current persons   {}", stats.current_count);
    println!("  max persons       {}", stats.max_count);
    match stats.avg_count {
        Some(avg) => println!("  avg per frame     {avg:.1}"),
        None => println!("  avg per frame     -"),
    }
    println!("  last inference    {}ms", stats.last_inference_ms);
    println!("  observed fps      {}", stats.observed_fps);
    if !session.results().is_empty() {
        let series = session.results().count_series(20);
        let sparkline: String = series
            .iter()
            .map(|&c| match c {
                0 => '.',
                1..=2 => ':',
                3..=5 => '|',
                _ => '#',
            })
            .collect();
        println!("  recent counts     {sparkline}");
    }
}
