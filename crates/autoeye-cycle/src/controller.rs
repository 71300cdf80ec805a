//! Cycle controller
//!
//! Paces capture/inference passes from a poll loop and sequences the stages of
//! one pass:
//!
//! ```text
//! capture → decode → resize → re-encode → inference → extract → publish
//! ```
//!
//! All transient buffers are scoped to the pass, so every exit path, including
//! `?` on a failed stage, releases what was acquired. Cancellation and the
//! per-cycle deadline are checked between stages, never inside one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use autoeye::tracing::prefix;
use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::buffer::BufferLedger;
use crate::camera::{FrameSink, FrameSource};
use crate::clock::{Clock, SystemClock};
use crate::config::CycleConfig;
use crate::error::{CycleError, Result};
use crate::extract::DetectionExtractor;
use crate::inference::{Classifier, InferenceInvoker};
use crate::pipeline::ImagePipeline;
use crate::report::{PublishOutcome, ReportPublisher, Transport};
use crate::signal::PixelSignal;
use crate::state::{transition, CycleEvent, CycleState};
use crate::types::ProcessingStats;

/// Cooperative cancellation flag checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cross-cycle state owned by one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleContext {
    pub state: CycleState,
    /// Clock reading the interval is measured from
    pub last_cycle_ms: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
}

/// Result of one pass that ran to the end
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub detections: usize,
    pub thumbnail: bool,
    pub publish: PublishOutcome,
    pub stats: ProcessingStats,
}

/// What a call to [`CycleController::advance`] did
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing ran: stopped, or the interval has not elapsed
    Idle,
    Completed(CycleSummary),
    /// Pass aborted; the controller is back in `Waiting`
    Failed(CycleError),
}

impl CycleOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Poll-driven state machine running one pipeline pass at a time
pub struct CycleController {
    config: CycleConfig,
    ctx: CycleContext,
    source: FrameSource,
    pipeline: ImagePipeline,
    invoker: InferenceInvoker,
    extractor: DetectionExtractor,
    publisher: ReportPublisher,
    ledger: BufferLedger,
    clock: Box<dyn Clock>,
    frame_sink: Option<Box<dyn FrameSink>>,
    cancel: CancelToken,
}

impl CycleController {
    /// Build a controller around an initialized frame source.
    ///
    /// Starts in `Waiting` with the interval measured from now.
    pub fn new(
        config: CycleConfig,
        source: FrameSource,
        classifier: Box<dyn Classifier>,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        if source.resolution() != config.sensor_resolution {
            return Err(CycleError::Config(format!(
                "frame source delivers {}, config expects {}",
                source.resolution(),
                config.sensor_resolution
            )));
        }

        let ledger = match config.memory_budget_bytes {
            Some(budget) => BufferLedger::with_budget(budget),
            None => BufferLedger::new(),
        };
        let clock: Box<dyn Clock> = Box::new(SystemClock::new());

        info!("{} Inferencing settings:", prefix::PULSE_OPEN);
        info!("  Model input: {}", config.model_resolution);
        info!("  Sensor frame: {}", config.sensor_resolution);
        info!(
            "  Interval: {}ms ({})",
            config.interval_ms,
            if config.continuous { "continuous" } else { "single-shot" }
        );
        info!(
            "  Threshold: {:.2}, lane midline x={}",
            config.confidence_threshold,
            config.lane_midline()
        );

        Ok(Self {
            ctx: CycleContext {
                last_cycle_ms: clock.now_ms(),
                ..Default::default()
            },
            pipeline: ImagePipeline::new(&config),
            invoker: InferenceInvoker::new(classifier),
            extractor: DetectionExtractor::from_config(&config),
            publisher: ReportPublisher::new(&config, transport),
            source,
            ledger,
            clock,
            frame_sink: None,
            cancel: CancelToken::new(),
            config,
        })
    }

    /// Replace the time source; the interval restarts from its current reading.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.ctx.last_cycle_ms = clock.now_ms();
        self.clock = Box::new(clock);
        self
    }

    /// Hand capture frames to `sink` after decode instead of releasing them.
    pub fn with_frame_sink(mut self, sink: impl FrameSink + 'static) -> Self {
        self.frame_sink = Some(Box::new(sink));
        self
    }

    /// Share an externally created ledger (e.g. to observe it from tests).
    pub fn with_ledger(mut self, ledger: BufferLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn context(&self) -> CycleContext {
        self.ctx
    }

    pub fn state(&self) -> CycleState {
        self.ctx.state
    }

    pub fn ledger(&self) -> &BufferLedger {
        &self.ledger
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Leave `Stopped`; the interval restarts from now.
    pub fn start(&mut self) {
        if self.ctx.state == CycleState::Stopped {
            self.ctx.last_cycle_ms = self.clock.now_ms();
        }
        self.apply(CycleEvent::Start);
    }

    pub fn stop(&mut self) {
        self.apply(CycleEvent::Stop);
        info!("{} Cycle controller stopped", prefix::PULSE_CLOSE);
    }

    /// Poll the controller. Runs at most one pass.
    ///
    /// Before the interval elapses this returns [`CycleOutcome::Idle`] without
    /// capturing, allocating or changing state.
    pub fn advance(&mut self) -> CycleOutcome {
        match self.ctx.state {
            CycleState::Stopped => return CycleOutcome::Idle,
            CycleState::Waiting => {
                let due = self
                    .ctx
                    .last_cycle_ms
                    .saturating_add(self.config.interval_ms);
                if self.clock.now_ms() < due {
                    self.apply(CycleEvent::TimerPending);
                    return CycleOutcome::Idle;
                }
                self.apply(CycleEvent::TimerElapsed);
            }
            CycleState::Sampling => self.apply(CycleEvent::SamplingDone),
            CycleState::DataReady => {}
        }
        self.run_pass()
    }

    /// Run one pass now, ignoring the interval. No-op while stopped.
    pub fn force_cycle(&mut self) -> CycleOutcome {
        if self.ctx.state == CycleState::Stopped {
            return CycleOutcome::Idle;
        }
        self.run_pass()
    }

    fn apply(&mut self, event: CycleEvent) {
        let next = transition(self.ctx.state, event);
        if next != self.ctx.state {
            debug!("{} {} -> {} on {:?}", prefix::PULSE, self.ctx.state, next, event);
        }
        self.ctx.state = next;
    }

    fn run_pass(&mut self) -> CycleOutcome {
        let started_ms = self.clock.now_ms();
        self.apply(CycleEvent::PassBegin {
            continuous: self.config.continuous,
        });
        if self.config.continuous {
            self.ctx.last_cycle_ms = started_ms;
        }

        let n = self.ctx.cycles_completed + self.ctx.cycles_failed + 1;
        let span = info_span!("cycle", n);
        let result = span.in_scope(|| self.execute(started_ms));

        // A failed pass restarts the interval at the failure in either mode
        if result.is_err() || !self.config.continuous {
            self.ctx.last_cycle_ms = self.clock.now_ms();
        }
        self.apply(CycleEvent::PassEnd);

        match result {
            Ok(summary) => {
                self.ctx.cycles_completed += 1;
                debug!("{} Cycle {} stats: {:?}", prefix::PULSE, n, summary.stats);
                CycleOutcome::Completed(summary)
            }
            Err(e) => {
                self.ctx.cycles_failed += 1;
                warn!("{} Cycle {} aborted ({}): {}", prefix::PULSE, n, e.kind(), e);
                CycleOutcome::Failed(e)
            }
        }
    }

    fn execute(&mut self, started_ms: u64) -> Result<CycleSummary> {
        let total_start = Instant::now();
        let mut stats = ProcessingStats::default();
        let ledger = self.ledger.clone();

        // === CAPTURE ===
        let t = Instant::now();
        let frame = self.source.capture(&ledger)?;
        stats.capture_us = elapsed_us(t);
        self.checkpoint(started_ms, "capture")?;

        // === DECODE ===
        let t = Instant::now();
        let pixels = self.pipeline.decode(&mut self.source, &frame, &ledger)?;
        stats.decode_us = elapsed_us(t);
        match self.frame_sink.as_mut() {
            Some(sink) => sink.accept(frame),
            None => drop(frame),
        }
        self.checkpoint(started_ms, "decode")?;

        // === RESIZE ===
        let t = Instant::now();
        let pixels = self.pipeline.resize(pixels, &ledger)?;
        stats.resize_us = elapsed_us(t);
        debug!(
            "{} Resized to {} in {}us",
            prefix::PIPELINE,
            pixels.resolution(),
            stats.resize_us
        );
        self.checkpoint(started_ms, "resize")?;

        // === RE-ENCODE ===
        let t = Instant::now();
        let thumbnail = match self.pipeline.reencode(&pixels, &ledger) {
            Ok(thumb) => {
                stats.thumbnail_bytes = thumb.len() as u32;
                Some(thumb.to_base64())
            }
            Err(e) => {
                warn!("{} Publishing without thumbnail: {}", prefix::PIPELINE, e);
                None
            }
        };
        stats.encode_us = elapsed_us(t);
        self.checkpoint(started_ms, "encode")?;

        // === INFERENCE ===
        let t = Instant::now();
        let raw = self.invoker.invoke(&PixelSignal::new(&pixels))?;
        drop(pixels);
        stats.inference_us = elapsed_us(t);
        stats.detections_raw = raw.len() as u32;
        self.checkpoint(started_ms, "inference")?;

        // === EXTRACT + PUBLISH ===
        let t = Instant::now();
        let detections = self.extractor.extract(&raw);
        stats.detections_final = detections.len() as u32;

        let report = self
            .publisher
            .assemble(self.clock.wall_time(), thumbnail, detections);
        let summary_detections = report.detections.len();
        let has_thumbnail = report.thumbnail_base64.is_some();
        let publish = self.publisher.publish(report);
        stats.publish_us = elapsed_us(t);
        stats.total_us = elapsed_us(total_start);

        Ok(CycleSummary {
            detections: summary_detections,
            thumbnail: has_thumbnail,
            publish,
            stats,
        })
    }

    fn checkpoint(&self, started_ms: u64, stage: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CycleError::Cancelled(stage));
        }
        if let Some(deadline_ms) = self.config.cycle_deadline_ms {
            if self.clock.now_ms().saturating_sub(started_ms) > deadline_ms {
                return Err(CycleError::Timeout { deadline_ms, stage });
            }
        }
        Ok(())
    }
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Controller behind a mutex, for when a periodic loop and external triggers
/// share it. Passes never interleave.
#[derive(Clone)]
pub struct SharedController {
    inner: Arc<Mutex<CycleController>>,
}

impl SharedController {
    pub fn new(controller: CycleController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    pub fn advance(&self) -> CycleOutcome {
        self.inner.lock().advance()
    }

    /// Externally triggered single shot
    pub fn force_cycle(&self) -> CycleOutcome {
        self.inner.lock().force_cycle()
    }

    pub fn start(&self) {
        self.inner.lock().start()
    }

    pub fn stop(&self) {
        self.inner.lock().stop()
    }

    pub fn context(&self) -> CycleContext {
        self.inner.lock().context()
    }

    /// Run `f` with exclusive access to the controller
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut CycleController) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
