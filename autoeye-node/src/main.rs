//! AutoEye edge node - Main Entry Point
//!
//! Replays camera frames from a directory through the capture → detect →
//! report cycle and writes one JSON report per line.
//!
//! Usage:
//!     autoeye-node --config node.json
//!     autoeye-node --frames ./frames --model vehicles.onnx --output reports.jsonl
//!     autoeye-node --frames ./frames --model vehicles.onnx --once

mod config;
mod shutdown;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use autoeye::tracing::prefix::{PULSE, PULSE_CLOSE, PULSE_OPEN};
use autoeye::{Error, Result};
use autoeye_cycle::{
    CancelToken, Classifier, CycleController, CycleOutcome, DirectoryCamera, FrameSource,
    JsonLinesTransport, SharedController, Transport,
};
use clap::Parser;
use config::NodeConfig;
use shutdown::shutdown_signal;
use tracing::{error, info};

/// Sleep between polls that found nothing to do
const IDLE_POLL: Duration = Duration::from_millis(1);

#[derive(Parser, Debug)]
#[command(name = "autoeye-node")]
#[command(about = "AutoEye roadside vehicle counting node")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of JPEG frames to replay as the camera
    #[arg(long)]
    frames: Option<PathBuf>,

    /// ONNX detector model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file for the model
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Report output file, or "-" for stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Milliseconds between cycles
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Restart the interval when a cycle starts instead of when it ends
    #[arg(long)]
    continuous: bool,

    /// Confidence threshold (0.0-1.0)
    #[arg(long)]
    threshold: Option<f32>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Config file values with command-line overrides applied
    fn resolve_config(&self) -> Result<NodeConfig> {
        let mut cfg = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(frames) = &self.frames {
            cfg.frames_dir = Some(frames.clone());
        }
        if let Some(model) = &self.model {
            cfg.model_path = Some(model.clone());
        }
        if let Some(labels) = &self.labels {
            cfg.labels_path = Some(labels.clone());
        }
        if let Some(output) = &self.output {
            cfg.output = Some(output.clone());
        }
        if let Some(interval) = self.interval_ms {
            cfg.cycle.interval_ms = interval;
        }
        if self.continuous {
            cfg.cycle.continuous = true;
        }
        if let Some(threshold) = self.threshold {
            cfg.cycle.confidence_threshold = threshold;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    autoeye::tracing::init_with_filter(&args.log_level);

    info!("{} Starting AutoEye node v{}", PULSE_OPEN, env!("CARGO_PKG_VERSION"));

    let cfg = args.resolve_config()?;
    let controller = build_controller(&cfg)?;
    let cancel = controller.cancel_token();
    let shared = SharedController::new(controller);

    if args.once {
        return match shared.force_cycle() {
            CycleOutcome::Failed(e) => Err(Error::from(e).into()),
            _ => Ok(()),
        };
    }

    let poller = tokio::task::spawn_blocking({
        let shared = shared.clone();
        let cancel = cancel.clone();
        move || poll_loop(shared, cancel)
    });

    shutdown_signal().await;
    cancel.cancel();
    shared.stop();
    poller.await?;

    let ctx = shared.context();
    info!(
        "{} Node stopped after {} cycles ({} failed)",
        PULSE_CLOSE,
        ctx.cycles_completed + ctx.cycles_failed,
        ctx.cycles_failed
    );
    Ok(())
}

fn poll_loop(shared: SharedController, cancel: CancelToken) {
    info!("{} Cycle loop running", PULSE);
    while !cancel.is_cancelled() {
        if shared.advance().is_idle() {
            std::thread::sleep(IDLE_POLL);
        }
    }
}

fn build_controller(cfg: &NodeConfig) -> Result<CycleController> {
    let camera = DirectoryCamera::new(cfg.frames_dir()?);
    let source = FrameSource::init(
        Box::new(camera),
        cfg.cycle.sensor_resolution,
        cfg.cycle.warmup_frames,
    )
    .inspect_err(|e| error!("{} Camera initialization failed: {}", PULSE_OPEN, e))?;

    let classifier = build_classifier(cfg)?;
    let transport = open_transport(cfg)?;

    Ok(CycleController::new(
        cfg.cycle.clone(),
        source,
        classifier,
        transport,
    )?)
}

#[cfg(feature = "onnx")]
fn build_classifier(cfg: &NodeConfig) -> Result<Box<dyn Classifier>> {
    use autoeye_cycle::onnx::{parse_labels, OnnxClassifier, OnnxOptions};

    let model = cfg
        .model_path
        .as_deref()
        .ok_or_else(|| Error::config("model_path is required (--model)"))?;

    let mut options = OnnxOptions::default();
    if let Some(path) = &cfg.labels_path {
        options.labels = parse_labels(&std::fs::read_to_string(path)?);
    }

    let classifier = OnnxClassifier::load(model, cfg.cycle.model_resolution, options)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "onnx"))]
fn build_classifier(_cfg: &NodeConfig) -> Result<Box<dyn Classifier>> {
    Err(Error::config(
        "no detector available: built without the `onnx` feature",
    ))
}

fn open_transport(cfg: &NodeConfig) -> Result<Box<dyn Transport>> {
    if cfg.output_is_stdout() {
        return Ok(Box::new(JsonLinesTransport::new(std::io::stdout())));
    }

    let path = cfg.output.as_deref().unwrap_or("-");
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    info!("{} Writing reports to {}", PULSE_OPEN, path);
    Ok(Box::new(JsonLinesTransport::new(file)))
}
