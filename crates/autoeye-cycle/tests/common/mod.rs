//! Shared fakes for cycle integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use autoeye_cycle::{
    BoundingBox, Camera, CameraError, Classifier, ClassifierError, CycleConfig, CycleController,
    FrameSource, ManualClock, PixelSignal, RawDetection, Report, Resolution,
    Transport, TransportError,
};
use chrono::{DateTime, TimeZone, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use parking_lot::Mutex;

/// Gradient JPEG at `res`
pub fn jpeg(res: Resolution) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(res.rgb_bytes());
    for y in 0..res.height {
        for x in 0..res.width {
            rgb.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
        }
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85)
        .encode(&rgb, res.width, res.height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap()
}

/// Camera serving a fixed frame and counting captures
#[derive(Clone)]
pub struct CountingCamera {
    pub frame: Arc<Mutex<Vec<u8>>>,
    pub captures: Arc<AtomicUsize>,
    pub fail_next: Arc<AtomicBool>,
}

impl CountingCamera {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            frame: Arc::new(Mutex::new(frame)),
            captures: Arc::new(AtomicUsize::new(0)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Camera for CountingCamera {
    fn init(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    fn capture_encoded(&mut self) -> Result<Vec<u8>, CameraError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CameraError::Device("sensor timeout".into()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.lock().clone())
    }
}

type Hook = Box<dyn FnMut() + Send>;

/// Classifier returning a fixed script and counting calls
pub struct ScriptedClassifier {
    pub result: Result<Vec<RawDetection>, ClassifierError>,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Option<Resolution>>>,
    hook: Option<Hook>,
}

impl ScriptedClassifier {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            result: Ok(detections),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(None)),
            hook: None,
        }
    }

    pub fn failing(code: i32) -> Self {
        Self {
            result: Err(ClassifierError::new(code, "model rejected input")),
            ..Self::new(Vec::new())
        }
    }

    /// Run `hook` inside every classify call
    pub fn with_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, signal: &PixelSignal<'_>) -> Result<Vec<RawDetection>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock() = Some(signal.resolution());
        // pull every pixel like a real model would
        let _ = signal.read(0, signal.total_length()).count();
        if let Some(hook) = self.hook.as_mut() {
            hook();
        }
        self.result.clone()
    }
}

/// Transport recording every report it accepts
#[derive(Clone)]
pub struct RecordingTransport {
    pub connected: Arc<AtomicBool>,
    pub published: Arc<Mutex<Vec<Report>>>,
    pub publish_calls: Arc<AtomicUsize>,
}

impl RecordingTransport {
    pub fn connected() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            published: Arc::new(Mutex::new(Vec::new())),
            publish_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn disconnected() -> Self {
        let t = Self::connected();
        t.connected.store(false, Ordering::SeqCst);
        t
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&mut self, report: &Report) -> Result<(), TransportError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.published.lock().push(report.clone());
        Ok(())
    }
}

pub fn raw(label: &str, confidence: f32, x: f32) -> RawDetection {
    RawDetection::new(label, confidence, BoundingBox::new(x, 30.0, 24.0, 18.0))
}

/// Everything a test needs to drive and observe one controller
pub struct Harness {
    pub controller: CycleController,
    pub clock: ManualClock,
    pub camera: CountingCamera,
    pub transport: RecordingTransport,
    pub classifier_calls: Arc<AtomicUsize>,
    pub classifier_seen: Arc<Mutex<Option<Resolution>>>,
}

pub fn config() -> CycleConfig {
    CycleConfig {
        edge_id: "edge-01".into(),
        location: "north-gate".into(),
        utc_offset_secs: 7 * 3600,
        warmup_frames: 2,
        ..Default::default()
    }
}

pub fn harness(
    config: CycleConfig,
    classifier: ScriptedClassifier,
    transport: RecordingTransport,
) -> Harness {
    harness_with_clock(config, classifier, transport, ManualClock::new(epoch()))
}

pub fn harness_with_clock(
    config: CycleConfig,
    classifier: ScriptedClassifier,
    transport: RecordingTransport,
    clock: ManualClock,
) -> Harness {
    let camera = CountingCamera::new(jpeg(config.sensor_resolution));
    let source = FrameSource::init(
        Box::new(camera.clone()),
        config.sensor_resolution,
        config.warmup_frames,
    )
    .unwrap();
    let classifier_calls = classifier.calls.clone();
    let classifier_seen = classifier.seen.clone();

    let controller = CycleController::new(
        config,
        source,
        Box::new(classifier),
        Box::new(transport.clone()),
    )
    .unwrap()
    .with_clock(clock.clone());

    Harness {
        controller,
        clock,
        camera,
        transport,
        classifier_calls,
        classifier_seen,
    }
}

impl Harness {
    pub fn classifier_calls(&self) -> usize {
        self.classifier_calls.load(Ordering::SeqCst)
    }

    /// Let the interval elapse and poll once
    pub fn tick(&mut self) -> autoeye_cycle::CycleOutcome {
        self.clock.advance(self.controller.config().interval_ms);
        self.controller.advance()
    }
}
