//! AutoEye cycle engine
//!
//! Periodic capture → inference → report cycle for a roadside vehicle
//! counting node. One controller owns the camera, the classifier and the
//! transport, and runs at most one pass per poll.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌──────────────┐   ┌────────────┐
//! │ FrameSource│──▶│ ImagePipeline │──▶│ Classifier   │──▶│ Detection  │
//! │ (JPEG/RGB) │   │ decode/resize │   │ (PixelSignal)│   │ Extractor  │
//! └────────────┘   │ thumbnail     │   └──────────────┘   └─────┬──────┘
//!                  └───────┬───────┘                            │
//!                          └──────────────▶ ReportPublisher ◀───┘
//!                                              (Transport)
//! ```
//!
//! [`CycleController`] paces passes using its [`Clock`] and the
//! [`CycleState`] machine. Every buffer a pass acquires comes from a
//! [`BufferLedger`] and is released when the pass ends, whichever way it ends.
//!
//! ## Features
//!
//! - `onnx`: [`onnx::OnnxClassifier`], a YOLO-style detector on ONNX Runtime

pub mod buffer;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod extract;
pub mod inference;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod report;
pub mod signal;
pub mod state;
pub mod types;

pub use buffer::{BufferLedger, CaptureFrame, PixelBuffer, ScopedBuffer};
pub use camera::{
    Camera, CameraError, ChannelFrameSink, DirectoryCamera, FrameSink, FrameSource, MemoryCamera,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CycleConfig;
pub use controller::{
    CancelToken, CycleContext, CycleController, CycleOutcome, CycleSummary, SharedController,
};
pub use error::{CycleError, Result};
pub use extract::DetectionExtractor;
pub use inference::{Classifier, ClassifierError, InferenceInvoker};
pub use pipeline::{ImagePipeline, Thumbnail};
pub use report::{
    JsonLinesTransport, PublishOutcome, ReportPublisher, Transport, TransportError, WireReport,
};
pub use signal::PixelSignal;
pub use state::{CycleEvent, CycleState};
pub use types::{
    BoundingBox, Detection, FrameFormat, LaneSide, ProcessingStats, RawDetection, Report,
    Resolution, VehicleClass,
};
