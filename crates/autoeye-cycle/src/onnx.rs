//! ONNX Runtime classifier for YOLO-style detectors
//!
//! Expects a single `[1, 3, H, W]` float input normalized to `[0, 1]` and a
//! single `[1, 4 + classes, anchors]` output of center-format boxes followed by
//! per-class scores. Boxes come back in model-resolution pixels, top-left
//! anchored.

use std::path::Path;

use ndarray::{Array4, ArrayView3, ArrayViewD, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

use crate::error::{CycleError, Result};
use crate::inference::{Classifier, ClassifierError};
use crate::signal::{unpack_rgb, PixelSignal};
use crate::types::{BoundingBox, RawDetection, Resolution};

/// Status code reported for runtime failures
const ORT_FAILURE: i32 = -1;

#[derive(Debug, Clone)]
pub struct OnnxOptions {
    /// Class names indexed by output channel
    pub labels: Vec<String>,
    /// Candidates below this score are discarded before NMS
    pub score_floor: f32,
    pub nms_threshold: f32,
    /// Intra-op threads (0 = runtime default)
    pub num_threads: usize,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            labels: vec!["car".to_string(), "motorbike".to_string()],
            score_floor: 0.25,
            nms_threshold: 0.45,
            num_threads: 0,
        }
    }
}

pub struct OnnxClassifier {
    session: Session,
    options: OnnxOptions,
    input: Array4<f32>,
}

impl OnnxClassifier {
    /// Load the model at `path` for inputs of `resolution`
    pub fn load(
        path: impl AsRef<Path>,
        resolution: Resolution,
        options: OnnxOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading detector from {}", path.display());

        if !path.exists() {
            return Err(CycleError::Config(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let load_err = |e: ort::Error| CycleError::Config(format!("failed to load model: {e}"));
        let mut builder = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?;
        if options.num_threads > 0 {
            builder = builder
                .with_intra_threads(options.num_threads)
                .map_err(load_err)?;
        }
        let session = builder.commit_from_file(path).map_err(load_err)?;

        info!(
            "Detector ready: {} input, {} labels",
            resolution,
            options.labels.len()
        );

        Ok(Self {
            session,
            input: Array4::zeros((1, 3, resolution.height as usize, resolution.width as usize)),
            options,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.options.labels
    }

    /// Fill the NCHW input tensor from the signal, one row at a time
    fn fill_input(&mut self, signal: &PixelSignal<'_>) -> std::result::Result<(), ClassifierError> {
        let res = signal.resolution();
        let (_, _, h, w) = self.input.dim();
        if res.width as usize != w || res.height as usize != h {
            return Err(ClassifierError::new(
                ORT_FAILURE,
                format!("signal is {}, model expects {}x{}", res, w, h),
            ));
        }

        for y in 0..res.height {
            for (x, px) in signal.row(y).enumerate() {
                let [r, g, b] = unpack_rgb(px);
                let y = y as usize;
                self.input[[0, 0, y, x]] = r as f32 / 255.0;
                self.input[[0, 1, y, x]] = g as f32 / 255.0;
                self.input[[0, 2, y, x]] = b as f32 / 255.0;
            }
        }
        Ok(())
    }
}

impl Classifier for OnnxClassifier {
    fn classify(
        &mut self,
        signal: &PixelSignal<'_>,
    ) -> std::result::Result<Vec<RawDetection>, ClassifierError> {
        let run_err = |e: ort::Error| ClassifierError::new(ORT_FAILURE, e.to_string());

        self.fill_input(signal)?;
        let inputs = ort::inputs![self.input.clone()].map_err(run_err)?;
        let outputs = self.session.run(inputs).map_err(run_err)?;

        let output: ArrayViewD<f32> = outputs[0].try_extract_tensor().map_err(run_err)?;
        let output = output
            .into_dimensionality::<Ix3>()
            .map_err(|e| {
                ClassifierError::new(ORT_FAILURE, format!("unexpected output shape: {e}"))
            })?;

        let candidates = decode_output(output, &self.options, signal.resolution());
        let kept = non_max_suppression(candidates, self.options.nms_threshold);
        debug!("Detector kept {} boxes", kept.len());
        Ok(kept)
    }
}

/// Parse labels from newline-separated text or a JSON array
pub fn parse_labels(text: &str) -> Vec<String> {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        if let Ok(labels) = serde_json::from_str::<Vec<String>>(trimmed) {
            return labels;
        }
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Best class per anchor, above the score floor, clamped to the frame
fn decode_output(
    output: ArrayView3<'_, f32>,
    options: &OnnxOptions,
    resolution: Resolution,
) -> Vec<RawDetection> {
    let (_, channels, anchors) = output.dim();
    if channels <= 4 {
        return Vec::new();
    }
    let classes = (channels - 4).min(options.labels.len());
    let (max_w, max_h) = (resolution.width as f32, resolution.height as f32);

    let mut out = Vec::new();
    for i in 0..anchors {
        let best = (0..classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((class, score)) = best else { continue };
        if score < options.score_floor {
            continue;
        }

        let (cx, cy, w, h) = (
            output[[0, 0, i]],
            output[[0, 1, i]],
            output[[0, 2, i]],
            output[[0, 3, i]],
        );
        let x0 = (cx - w / 2.0).clamp(0.0, max_w);
        let y0 = (cy - h / 2.0).clamp(0.0, max_h);
        let x1 = (cx + w / 2.0).clamp(0.0, max_w);
        let y1 = (cy + h / 2.0).clamp(0.0, max_h);

        out.push(RawDetection::new(
            options.labels[class].clone(),
            score,
            BoundingBox::new(x0, y0, x1 - x0, y1 - y0),
        ));
    }
    out
}

/// Greedy per-label NMS, highest confidence first
fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in candidates {
        let overlaps = keep
            .iter()
            .any(|k| k.label == det.label && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}
