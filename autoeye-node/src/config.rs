//! Node configuration file

use std::path::{Path, PathBuf};

use autoeye::{Error, Result};
use autoeye_cycle::CycleConfig;
use serde::Deserialize;

/// Top-level JSON configuration.
///
/// ```json
/// {
///   "frames_dir": "/var/lib/autoeye/frames",
///   "model_path": "/opt/autoeye/vehicles.onnx",
///   "output": "-",
///   "cycle": { "interval_ms": 500, "edge_id": "edge-01", "utc_offset_secs": 25200 }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub cycle: CycleConfig,
    /// Directory of JPEG stills replayed as the camera
    pub frames_dir: Option<PathBuf>,
    /// ONNX detector model
    pub model_path: Option<PathBuf>,
    /// Label file (newline-separated or JSON array)
    pub labels_path: Option<PathBuf>,
    /// Report sink: a file path, or `-` / unset for stdout
    pub output: Option<String>,
}

impl NodeConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn frames_dir(&self) -> Result<&Path> {
        self.frames_dir
            .as_deref()
            .ok_or_else(|| Error::config("frames_dir is required (--frames)"))
    }

    /// Whether reports go to stdout
    pub fn output_is_stdout(&self) -> bool {
        matches!(self.output.as_deref(), None | Some("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoeye_cycle::Resolution;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_is_all_defaults() {
        let cfg = NodeConfig::from_json("{}").unwrap();
        assert_eq!(cfg.cycle, CycleConfig::default());
        assert!(cfg.output_is_stdout());
        assert!(cfg.frames_dir().is_err());
    }

    #[test]
    fn nested_cycle_section() {
        let cfg = NodeConfig::from_json(
            r#"{
                "frames_dir": "/tmp/frames",
                "output": "/tmp/reports.jsonl",
                "cycle": {
                    "interval_ms": 500,
                    "model_resolution": {"width": 96, "height": 96},
                    "edge_id": "edge-01"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.frames_dir().unwrap(), Path::new("/tmp/frames"));
        assert!(!cfg.output_is_stdout());
        assert_eq!(cfg.cycle.interval_ms, 500);
        assert_eq!(cfg.cycle.model_resolution, Resolution::new(96, 96));
        assert_eq!(cfg.cycle.edge_id, "edge-01");
        assert_eq!(cfg.cycle.confidence_threshold, 0.5);
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        assert!(matches!(
            NodeConfig::from_json("{ not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = NodeConfig::load(Path::new("/nonexistent/autoeye.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
