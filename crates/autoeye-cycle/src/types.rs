//! Core types for the capture/inference cycle
//!
//! Raw classifier output ([`RawDetection`]) is turned into domain
//! [`Detection`]s by the extractor and bundled into a [`Report`] per cycle.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Encoding of a captured frame as handed over by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// JPEG compressed (what the sensor produces by default)
    #[default]
    Jpeg,
    /// Packed RGB with 8 bits per channel, already decoded
    Rgb888,
}

/// Width/height pair fixing a buffer shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size in bytes of a packed RGB888 buffer at this resolution
    pub fn rgb_bytes(&self) -> usize {
        self.pixels() * 3
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Bounding box in model-resolution pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    /// X coordinate of top-left corner (pixels)
    pub x: f32,
    /// Y coordinate of top-left corner (pixels)
    pub y: f32,
    /// Width of bounding box (pixels)
    pub width: f32,
    /// Height of bounding box (pixels)
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Calculate intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Calculate area
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One detection exactly as the classifier reported it
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Model label
    pub label: String,
    /// Confidence score 0.0-1.0
    pub confidence: f32,
    /// Bounding box in model-resolution coordinates
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Closed set of classes the node reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorbike,
}

impl VehicleClass {
    /// Map a model label onto the closed class set.
    ///
    /// Matching is case-insensitive; `motorcycle` (COCO spelling) is accepted
    /// as an alias of `motorbike`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("car") {
            Some(Self::Car)
        } else if label.eq_ignore_ascii_case("motorbike")
            || label.eq_ignore_ascii_case("motorcycle")
        {
            Some(Self::Motorbike)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorbike => "motorbike",
        }
    }
}

/// Which side of the lane midline a detection sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneSide {
    /// At or left of the midline
    In,
    /// Right of the midline
    Out,
}

impl LaneSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// A filtered, classified, positioned object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class: VehicleClass,
    /// Model-resolution coordinates, never sensor coordinates
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub lane: LaneSide,
}

/// Everything reported for one completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub edge_id: String,
    pub location: String,
    /// UTC instant carrying the node's configured local offset
    pub timestamp: DateTime<FixedOffset>,
    /// Base64 JPEG thumbnail, absent when re-encoding failed
    pub thumbnail_base64: Option<String>,
    pub detections: Vec<Detection>,
}

/// Per-stage timings for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    /// Frame capture time (microseconds)
    pub capture_us: u64,
    /// Decode into the pixel buffer (microseconds)
    pub decode_us: u64,
    /// Crop and resize to model resolution (microseconds)
    pub resize_us: u64,
    /// Thumbnail re-encode incl. base64 (microseconds)
    pub encode_us: u64,
    /// Model inference time (microseconds)
    pub inference_us: u64,
    /// Report assembly and handoff (microseconds)
    pub publish_us: u64,
    /// Total pass time (microseconds)
    pub total_us: u64,
    /// Size of the encoded thumbnail, 0 when absent
    pub thumbnail_bytes: u32,
    /// Number of detections before threshold filtering
    pub detections_raw: u32,
    /// Number of detections reported
    pub detections_final: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_iou() {
        let box1 = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let box2 = BoundingBox::new(50.0, 50.0, 100.0, 100.0);

        let iou = box1.iou(&box2);
        // Intersection: 50x50 = 2500
        // Union: 100x100 + 100x100 - 2500 = 17500
        assert!((iou - 0.143).abs() < 0.01);
    }

    #[test]
    fn test_disjoint_boxes_have_zero_iou() {
        let box1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let box2 = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(box1.iou(&box2), 0.0);
    }

    #[test]
    fn test_class_from_label() {
        assert_eq!(VehicleClass::from_label("car"), Some(VehicleClass::Car));
        assert_eq!(VehicleClass::from_label("CAR "), Some(VehicleClass::Car));
        assert_eq!(
            VehicleClass::from_label("motorbike"),
            Some(VehicleClass::Motorbike)
        );
        assert_eq!(
            VehicleClass::from_label("Motorcycle"),
            Some(VehicleClass::Motorbike)
        );
        assert_eq!(VehicleClass::from_label("truck"), None);
    }

    #[test]
    fn test_resolution_sizes() {
        let res = Resolution::new(240, 176);
        assert_eq!(res.pixels(), 240 * 176);
        assert_eq!(res.rgb_bytes(), 240 * 176 * 3);
        assert_eq!(res.to_string(), "240x176");
    }

    #[test]
    fn test_wire_enum_names() {
        assert_eq!(
            serde_json::to_string(&VehicleClass::Motorbike).unwrap(),
            "\"motorbike\""
        );
        assert_eq!(serde_json::to_string(&LaneSide::Out).unwrap(), "\"out\"");
    }
}
