//! Predictor configuration: task, model geometry, thresholds and decoding
//! options.
//!
//! Configuration files are YAML or JSON, chosen by extension:
//!
//! ```yaml
//! task: detect
//! num_classes: 80
//! model_input_width: 640
//! model_input_height: 640
//! box_units: model_pixels
//! confidence_threshold: 0.3
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::YoloError;
use crate::tensor::Task;

/// Units of the raw box values in the output tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxUnits {
    /// Already divided by the model input size (TFLite exports).
    #[default]
    Normalized,
    /// Model input pixels (ONNX exports).
    ModelPixels,
}

/// How instance masks are written out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// 0 or 255, thresholded at probability 0.5.
    #[default]
    Binary,
    /// Probability scaled to 0..=255.
    Soft,
}

/// Overlap measure used when suppressing oriented boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObbIou {
    /// IoU of the axis-aligned rectangles enclosing each rotated box.
    #[default]
    AxisAligned,
    /// IoU of the rotated rectangles themselves.
    Polygon,
}

/// Per-call thresholds. Copied at the start of each call, so changing them
/// never affects a frame already in flight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub confidence: f32,
    pub iou: f32,
    pub max_outputs: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
            max_outputs: DEFAULT_MAX_OUTPUTS,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), YoloError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(YoloError::InvalidConfig(format!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(YoloError::InvalidConfig(format!(
                "IoU threshold {} is outside [0, 1]",
                self.iou
            )));
        }
        if self.max_outputs == 0 {
            return Err(YoloError::InvalidConfig(
                "max_outputs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_IOU: f32 = 0.45;
pub const DEFAULT_MAX_OUTPUTS: usize = 30;
pub const DEFAULT_TOP_K: usize = 5;

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

fn default_iou() -> f32 {
    DEFAULT_IOU
}

fn default_max_outputs() -> usize {
    DEFAULT_MAX_OUTPUTS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_input_size() -> u32 {
    640
}

/// Everything a [`Predictor`](crate::predictor::Predictor) needs besides the
/// tensor shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    pub task: Task,
    /// Ignored for pose models, which always have one class.
    #[serde(default)]
    pub num_classes: usize,
    #[serde(default = "default_input_size")]
    pub model_input_width: u32,
    #[serde(default = "default_input_size")]
    pub model_input_height: u32,
    #[serde(default)]
    pub box_units: BoxUnits,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_outputs")]
    pub max_outputs: usize,
    /// Classification only: how many ranked classes to report.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub mask_mode: MaskMode,
    /// Suppress across classes instead of within each class.
    #[serde(default)]
    pub class_agnostic: bool,
    #[serde(default)]
    pub obb_iou: ObbIou,
}

impl PredictorConfig {
    /// A configuration with every option at its default.
    pub fn new(task: Task, num_classes: usize) -> Self {
        Self {
            task,
            num_classes,
            model_input_width: default_input_size(),
            model_input_height: default_input_size(),
            box_units: BoxUnits::default(),
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            max_outputs: DEFAULT_MAX_OUTPUTS,
            top_k: DEFAULT_TOP_K,
            mask_mode: MaskMode::default(),
            class_agnostic: false,
            obb_iou: ObbIou::default(),
        }
    }

    pub fn with_model_input(mut self, width: u32, height: u32) -> Self {
        self.model_input_width = width;
        self.model_input_height = height;
        self
    }

    pub fn with_box_units(mut self, units: BoxUnits) -> Self {
        self.box_units = units;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.confidence_threshold = thresholds.confidence;
        self.iou_threshold = thresholds.iou;
        self.max_outputs = thresholds.max_outputs;
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
            max_outputs: self.max_outputs,
        }
    }

    /// Checks ranges; called by the predictor before it resolves shapes.
    pub fn validate(&self) -> Result<(), YoloError> {
        self.thresholds().validate()?;
        if self.model_input_width == 0 || self.model_input_height == 0 {
            return Err(YoloError::InvalidConfig(format!(
                "model input size {}x{} must be non-zero",
                self.model_input_width, self.model_input_height
            )));
        }
        if self.top_k == 0 {
            return Err(YoloError::InvalidConfig(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.task != Task::Pose && self.num_classes == 0 {
            return Err(YoloError::InvalidConfig(format!(
                "num_classes must be set for {} models",
                self.task
            )));
        }
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, YoloError> {
        let config: Self = serde_yaml::from_str(s).map_err(|source| YoloError::YamlParse {
            path: "<string>".into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, YoloError> {
        let config: Self = serde_json::from_str(s).map_err(|source| YoloError::JsonParse {
            path: "<string>".into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, YoloError> {
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config: Self = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|source| YoloError::YamlParse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Some("json") => serde_json::from_str(&text).map_err(|source| YoloError::JsonParse {
                path: path.to_path_buf(),
                source,
            })?,
            _ => {
                return Err(YoloError::UnsupportedFormat(format!(
                    "config file '{}' (expected .yaml, .yml or .json)",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults() {
        let cfg = PredictorConfig::from_yaml_str("task: detect\nnum_classes: 80\n").unwrap();
        assert_eq!(cfg.task, Task::Detect);
        assert_eq!(cfg.confidence_threshold, 0.25);
        assert_eq!(cfg.iou_threshold, 0.45);
        assert_eq!(cfg.max_outputs, 30);
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.box_units, BoxUnits::Normalized);
        assert_eq!(cfg.obb_iou, ObbIou::AxisAligned);
        assert!(!cfg.class_agnostic);
    }

    #[test]
    fn test_json_options() {
        let cfg = PredictorConfig::from_json_str(
            r#"{"task":"obb","num_classes":15,"box_units":"model_pixels","obb_iou":"polygon","model_input_width":1024,"model_input_height":1024}"#,
        )
        .unwrap();
        assert_eq!(cfg.task, Task::Obb);
        assert_eq!(cfg.box_units, BoxUnits::ModelPixels);
        assert_eq!(cfg.obb_iou, ObbIou::Polygon);
        assert_eq!(cfg.model_input_width, 1024);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PredictorConfig::from_yaml_str("task: detect\nnum_classes: 2\nconfidance: 0.3\n")
            .unwrap_err();
        assert!(matches!(err, YoloError::YamlParse { .. }));
    }

    #[test]
    fn test_threshold_ranges() {
        let err = PredictorConfig::from_yaml_str(
            "task: detect\nnum_classes: 2\nconfidence_threshold: 1.5\n",
        )
        .unwrap_err();
        assert!(matches!(err, YoloError::InvalidConfig(_)));

        let err =
            PredictorConfig::from_yaml_str("task: detect\nnum_classes: 2\nmax_outputs: 0\n")
                .unwrap_err();
        assert!(matches!(err, YoloError::InvalidConfig(_)));
    }

    #[test]
    fn test_pose_needs_no_classes() {
        assert!(PredictorConfig::from_yaml_str("task: pose\n").is_ok());
        assert!(PredictorConfig::from_yaml_str("task: segment\n").is_err());
    }

    #[test]
    fn test_load_picks_parser_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("model.yml");
        fs::write(&yaml, "task: classify\nnum_classes: 10\ntop_k: 3\n").unwrap();
        assert_eq!(PredictorConfig::load(&yaml).unwrap().top_k, 3);

        let txt = dir.path().join("model.txt");
        fs::write(&txt, "task: classify\n").unwrap();
        assert!(matches!(
            PredictorConfig::load(&txt).unwrap_err(),
            YoloError::UnsupportedFormat(_)
        ));
    }
}
