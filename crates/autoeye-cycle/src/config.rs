//! Cycle configuration

use serde::Deserialize;

use crate::error::{CycleError, Result};
use crate::types::Resolution;

/// Configuration consumed by the cycle controller and its stages.
///
/// Deserializes from JSON with every field optional; missing fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Input resolution the classifier expects
    pub model_resolution: Resolution,
    /// Resolution of frames produced by the camera
    pub sensor_resolution: Resolution,
    /// Minimum time between two passes (milliseconds)
    pub interval_ms: u64,
    /// Restart the interval timer when a pass begins rather than when it ends
    pub continuous: bool,
    /// Detections below this confidence are dropped (0.0-1.0)
    pub confidence_threshold: f32,
    /// JPEG quality of the thumbnail (1-100)
    pub jpeg_quality: u8,
    /// Reference width for the lane midline; the midline sits at half of it
    pub lane_reference_width: u32,
    /// Upper bound on the encoded thumbnail size (bytes)
    pub max_thumbnail_bytes: usize,
    /// Abort a pass that runs longer than this (milliseconds)
    pub cycle_deadline_ms: Option<u64>,
    /// Edge unit identifier written into every report
    pub edge_id: String,
    /// Installation location written into every report
    pub location: String,
    /// Offset of the node's local time from UTC (seconds)
    pub utc_offset_secs: i32,
    /// Ceiling on bytes held by cycle buffers at once
    pub memory_budget_bytes: Option<usize>,
    /// Frames discarded after camera init so auto white balance settles
    pub warmup_frames: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            model_resolution: Resolution::new(160, 160),
            sensor_resolution: Resolution::new(240, 176),
            interval_ms: 50,
            continuous: false,
            confidence_threshold: 0.5,
            jpeg_quality: 90,
            lane_reference_width: 160,
            max_thumbnail_bytes: 100 * 1024,
            cycle_deadline_ms: None,
            edge_id: String::new(),
            location: String::new(),
            utc_offset_secs: 0,
            memory_budget_bytes: None,
            warmup_frames: 7,
        }
    }
}

impl CycleConfig {
    /// Check value ranges; called by the controller before it accepts a config
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CycleError::Config(
                "confidence_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        for (name, res) in [
            ("model_resolution", self.model_resolution),
            ("sensor_resolution", self.sensor_resolution),
        ] {
            if res.width == 0 || res.height == 0 {
                return Err(CycleError::Config(format!(
                    "{} must be non-zero, got {}",
                    name, res
                )));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CycleError::Config(
                "jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        if self.max_thumbnail_bytes == 0 {
            return Err(CycleError::Config(
                "max_thumbnail_bytes must be positive".to_string(),
            ));
        }
        if chrono::FixedOffset::east_opt(self.utc_offset_secs).is_none() {
            return Err(CycleError::Config(format!(
                "utc_offset_secs out of range: {}",
                self.utc_offset_secs
            )));
        }
        Ok(())
    }

    /// Lane midline in model-resolution x coordinates
    pub fn lane_midline(&self) -> f32 {
        self.lane_reference_width as f32 / 2.0
    }

    /// Capacity of the shared decode/resize/encode pixel buffer
    pub fn pixel_buffer_bytes(&self) -> usize {
        self.sensor_resolution
            .rgb_bytes()
            .max(self.model_resolution.rgb_bytes())
    }
}
