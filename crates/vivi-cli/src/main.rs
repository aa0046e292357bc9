//! vivi: measure heart rate from face video

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use vivi_signals::vision::{
    FaceDetector, FaceRegion, FixedRegionDetector, ImageSequenceSource, RawVideoSource, SeetaConfig,
    SeetaFaceDetector, SyntheticClip, SyntheticPulseSource,
};
use vivi_signals::{CaptureMode, LiveMonitor, LiveUpdate, MeasurementConfig, MeasurementResult, RppgEngine, StopHandle};

#[derive(Parser, Debug)]
#[command(name = "vivi", author, version, about, long_about = None)]
struct Cli {
    /// Measurement settings (TOML); keys left out take the mode preset
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a recorded clip (raw RGB24 file or a directory of frames)
    Analyze {
        path: PathBuf,
        #[command(flatten)]
        video: VideoArgs,
        #[command(flatten)]
        face: FaceArgs,
    },
    /// Monitor a raw RGB24 stream on stdin until the target duration or Ctrl-C
    Live {
        #[command(flatten)]
        video: VideoArgs,
        #[command(flatten)]
        face: FaceArgs,
        /// Keep going past the target duration
        #[arg(long)]
        continuous: bool,
    },
    /// Run the pipeline on a generated clip with a known pulse
    Simulate {
        #[arg(long, default_value = "72")]
        bpm: f64,
        #[arg(long, default_value = "30")]
        seconds: f64,
        /// Peak uniform noise per channel, in 8-bit levels
        #[arg(long, default_value = "0.5")]
        noise: f64,
        #[arg(long, value_enum, default_value = "offline")]
        mode: ModeArg,
    },
    /// Print a preset as TOML
    Config {
        #[arg(long, value_enum, default_value = "offline")]
        mode: ModeArg,
    },
}

#[derive(Args, Debug)]
struct VideoArgs {
    #[arg(long, default_value = "640")]
    width: u32,
    #[arg(long, default_value = "480")]
    height: u32,
    /// Frame rate; 0 uses the configured default
    #[arg(long, default_value = "30")]
    fps: f64,
    /// Target capture length in seconds
    #[arg(long)]
    duration: Option<f64>,
}

#[derive(Args, Debug)]
struct FaceArgs {
    /// SeetaFace model file (seeta_fd_frontal_v1.0.bin)
    #[arg(long, conflicts_with = "face")]
    model: Option<PathBuf>,
    /// Fixed face box as x,y,width,height
    #[arg(long, value_parser = parse_face)]
    face: Option<FaceRegion>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Offline,
    Live,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offline => CaptureMode::Offline,
            ModeArg::Live => CaptureMode::Live,
        }
    }
}

fn parse_face(s: &str) -> Result<FaceRegion, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height, got {s:?}"));
    }
    let x = parts[0].parse::<i32>().map_err(|e| format!("x: {e}"))?;
    let y = parts[1].parse::<i32>().map_err(|e| format!("y: {e}"))?;
    let width = parts[2].parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let height = parts[3].parse::<u32>().map_err(|e| format!("height: {e}"))?;
    Ok(FaceRegion::new(x, y, width, height))
}

fn load_config(path: Option<&Path>, mode: CaptureMode) -> Result<MeasurementConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            let config = MeasurementConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if config.mode != mode {
                log::warn!("Config file is for {:?} mode, running {:?}", config.mode, mode);
            }
            Ok(config)
        }
        None => Ok(MeasurementConfig::for_mode(mode)),
    }
}

fn build_detector(face: &FaceArgs, mode: CaptureMode) -> Result<Box<dyn FaceDetector>> {
    if let Some(region) = face.face {
        return Ok(Box::new(FixedRegionDetector::new(region)));
    }
    let Some(model) = &face.model else {
        bail!("either --model or --face is required");
    };
    let min_face_size = match mode {
        CaptureMode::Offline => 100,
        CaptureMode::Live => 120,
    };
    let config = SeetaConfig { min_face_size, ..SeetaConfig::default() };
    Ok(Box::new(SeetaFaceDetector::from_model_file(model, config)?))
}

fn report(result: &MeasurementResult) -> Result<ExitCode> {
    println!("{}", result.to_record().to_json_pretty()?);
    Ok(if result.is_success() { ExitCode::SUCCESS } else { ExitCode::from(2) })
}

fn log_progress(update: &LiveUpdate, every: u64) {
    if update.frame_index % every != 0 {
        return;
    }
    match update.heart_rate {
        Some(bpm) => info!(
            "{:5.1}% | {:.0}s left | {:.0} BPM ({})",
            update.progress_percent,
            update.remaining_seconds,
            bpm,
            update.quality.map(|q| q.to_string()).unwrap_or_default()
        ),
        None => info!(
            "{:5.1}% | {:.0}s left | faces {}/{}",
            update.progress_percent, update.remaining_seconds, update.face_frames, update.frames_processed
        ),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.cmd {
        Commands::Analyze { path, video, face } => {
            let mut config = load_config(cli.config.as_deref(), CaptureMode::Offline)?;
            if let Some(duration) = video.duration {
                config.duration_seconds = duration;
            }
            let detector = build_detector(&face, CaptureMode::Offline)?;
            let mut engine = RppgEngine::new(config, detector)?;

            let result = if path.is_dir() {
                engine.measure_offline_with(|| ImageSequenceSource::open(&path, video.fps))?
            } else {
                engine.measure_offline_with(|| RawVideoSource::open(&path, video.width, video.height, video.fps))?
            };
            report(&result)
        }
        Commands::Live { video, face, continuous } => {
            let mut config = load_config(cli.config.as_deref(), CaptureMode::Live)?;
            if let Some(duration) = video.duration {
                config.duration_seconds = duration;
            }
            let detector = build_detector(&face, CaptureMode::Live)?;
            let engine = RppgEngine::new(config, detector)?;

            let stop = StopHandle::new();
            let handler_stop = stop.clone();
            ctrlc::set_handler(move || {
                info!("Interrupted, finishing measurement");
                handler_stop.stop();
            })
            .context("failed to install Ctrl-C handler")?;

            let source = RawVideoSource::from_reader(std::io::stdin().lock(), video.width, video.height, video.fps)?;
            let mut monitor = LiveMonitor::new(engine, video.fps);
            if continuous {
                monitor = monitor.continuous();
            }
            let every = monitor.engine().fps().round().max(1.0) as u64;
            let result = monitor.run(source, &stop, |update| log_progress(update, every))?;
            report(&result)
        }
        Commands::Simulate { bpm, seconds, noise, mode } => {
            let mode = CaptureMode::from(mode);
            let config = load_config(cli.config.as_deref(), mode)?;
            let clip = SyntheticClip { bpm, duration_seconds: seconds, noise, ..SyntheticClip::default() };
            let face = clip.face;
            let detector = FixedRegionDetector::new(FaceRegion::new(face.x as i32, face.y as i32, face.width, face.height));
            info!("Simulating {seconds:.0}s at {bpm:.0} BPM ({mode:?})");

            let mut engine = RppgEngine::new(config, detector)?;
            let source = SyntheticPulseSource::new(clip);
            let result = match mode {
                CaptureMode::Offline => engine.measure_offline(source)?,
                CaptureMode::Live => {
                    let fps = source.clip().fps;
                    let every = fps.round().max(1.0) as u64;
                    LiveMonitor::new(engine, fps).run(source, &StopHandle::new(), |update| log_progress(update, every))?
                }
            };
            report(&result)
        }
        Commands::Config { mode } => {
            print!("{}", MeasurementConfig::for_mode(mode.into()).to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(level));

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
