//! Raw classifier output to domain detections

use tracing::trace;

use crate::config::CycleConfig;
use crate::types::{Detection, LaneSide, RawDetection, VehicleClass};

/// Threshold filter plus class and lane mapping.
///
/// Pure and order-preserving: output keeps the input order of the raw
/// detections that pass.
#[derive(Debug, Clone, Copy)]
pub struct DetectionExtractor {
    threshold: f32,
    midline: f32,
}

impl DetectionExtractor {
    pub fn new(threshold: f32, midline: f32) -> Self {
        Self { threshold, midline }
    }

    pub fn from_config(config: &CycleConfig) -> Self {
        Self::new(config.confidence_threshold, config.lane_midline())
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn midline(&self) -> f32 {
        self.midline
    }

    /// `In` at or left of the midline, `Out` right of it
    pub fn lane_side(&self, x: f32) -> LaneSide {
        if x <= self.midline {
            LaneSide::In
        } else {
            LaneSide::Out
        }
    }

    pub fn extract(&self, raw: &[RawDetection]) -> Vec<Detection> {
        raw.iter()
            .filter(|d| d.confidence >= self.threshold)
            .filter_map(|d| {
                let Some(class) = VehicleClass::from_label(&d.label) else {
                    trace!("Skipping unknown label {:?}", d.label);
                    return None;
                };
                Some(Detection {
                    class,
                    bbox: d.bbox,
                    confidence: d.confidence,
                    lane: self.lane_side(d.bbox.x),
                })
            })
            .collect()
    }
}
