//! Raw model outputs and their per-task layouts.
//!
//! The structural check lives here: [`TensorSpec::resolve`] runs once when a
//! predictor is configured and pins down how to index the flat buffer on
//! every later frame.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::YoloError;

/// Keypoints per pose instance (COCO layout).
pub const POSE_KEYPOINTS: usize = 17;

/// Features per pose anchor: 4 box + 1 confidence + 17 × (x, y, conf).
pub const POSE_FEATURES: usize = 4 + 1 + POSE_KEYPOINTS * 3;

/// COCO keypoint names, in model output order.
pub const COCO_KEYPOINT_NAMES: [&str; POSE_KEYPOINTS] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// The vision task a model was exported for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Detect,
    Segment,
    Classify,
    Pose,
    Obb,
}

impl Task {
    /// Returns true for tasks whose output carries boxes and goes through NMS.
    pub fn has_boxes(self) -> bool {
        !matches!(self, Task::Classify)
    }

    /// Features each anchor carries for this task.
    pub fn features_per_anchor(self, num_classes: usize, mask_coefficients: usize) -> usize {
        match self {
            Task::Detect => 4 + num_classes,
            Task::Segment => 4 + num_classes + mask_coefficients,
            Task::Classify => num_classes,
            Task::Pose => POSE_FEATURES,
            Task::Obb => 4 + num_classes + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Detect => "detect",
            Task::Segment => "segment",
            Task::Classify => "classify",
            Task::Pose => "pose",
            Task::Obb => "obb",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = YoloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "detect" | "detection" => Ok(Task::Detect),
            "segment" | "segmentation" | "seg" => Ok(Task::Segment),
            "classify" | "classification" | "cls" => Ok(Task::Classify),
            "pose" => Ok(Task::Pose),
            "obb" => Ok(Task::Obb),
            other => Err(YoloError::UnsupportedFormat(format!(
                "'{}' (supported: detect, segment, classify, pose, obb)",
                other
            ))),
        }
    }
}

/// A flat `f32` buffer plus its declared shape.
///
/// The buffer can be refilled in place through [`Self::data_mut`] so a
/// streaming caller reuses one allocation for every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensorData")]
pub struct RawTensorOutput {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct RawTensorData {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensorData> for RawTensorOutput {
    type Error = YoloError;

    fn try_from(raw: RawTensorData) -> Result<Self, Self::Error> {
        RawTensorOutput::new(raw.shape, raw.data)
    }
}

impl RawTensorOutput {
    /// Creates a tensor, checking that the buffer length matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, YoloError> {
        let expected = element_count(&shape);
        if expected != data.len() {
            return Err(YoloError::BufferLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// A zero-filled tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = element_count(&shape);
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Reads a `{"shape": [...], "data": [...]}` JSON file.
    pub fn load(path: &Path) -> Result<Self, YoloError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| YoloError::JsonParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access for refilling the buffer; the shape is fixed.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn element_count(shape: &[usize]) -> usize {
    if shape.is_empty() {
        0
    } else {
        shape.iter().product()
    }
}

/// How anchors and features are laid out in a box tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// `[1, features, anchors]`, the standard YOLOv8+ export.
    FeatureMajor,
    /// `[1, anchors, features]`, transposed exports.
    AnchorMajor,
}

/// Channel placement in the segmentation prototype tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoLayout {
    /// `[1, height, width, channels]` (TFLite).
    ChannelLast,
    /// `[1, channels, height, width]` (ONNX).
    ChannelFirst,
}

/// Resolved layout of the segmentation prototype tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProtoSpec {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub layout: ProtoLayout,
}

impl ProtoSpec {
    /// Number of values the prototype buffer must hold.
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn value(&self, data: &[f32], channel: usize, y: usize, x: usize) -> f32 {
        match self.layout {
            ProtoLayout::ChannelLast => data[(y * self.width + x) * self.channels + channel],
            ProtoLayout::ChannelFirst => data[(channel * self.height + y) * self.width + x],
        }
    }
}

/// The validated layout of one task's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TensorSpec {
    pub task: Task,
    pub num_classes: usize,
    pub features: usize,
    pub anchors: usize,
    pub orientation: Orientation,
    pub mask_coefficients: usize,
    pub protos: Option<ProtoSpec>,
}

impl TensorSpec {
    /// Matches a declared output shape against the task's expected feature
    /// count. This is the configuration-time structural check; a mismatch
    /// here is fatal, later frames are only checked for buffer length.
    pub fn resolve(
        task: Task,
        num_classes: usize,
        shape: &[usize],
        proto_shape: Option<&[usize]>,
    ) -> Result<Self, YoloError> {
        if num_classes == 0 && task != Task::Pose {
            return Err(YoloError::InvalidConfig(format!(
                "{} models need at least one class",
                task
            )));
        }

        let dims = strip_batch(shape).ok_or_else(|| YoloError::ShapeMismatch {
            task,
            shape: shape.to_vec(),
            expected: task.features_per_anchor(num_classes, 0),
        })?;

        let spec = match task {
            Task::Classify => {
                let expected = num_classes;
                let flat: usize = dims.iter().product();
                if dims.last() != Some(&expected) || flat != expected {
                    return Err(YoloError::ShapeMismatch {
                        task,
                        shape: shape.to_vec(),
                        expected,
                    });
                }
                TensorSpec {
                    task,
                    num_classes,
                    features: expected,
                    anchors: 1,
                    orientation: Orientation::AnchorMajor,
                    mask_coefficients: 0,
                    protos: None,
                }
            }
            Task::Segment => {
                let proto_shape = proto_shape.ok_or(YoloError::MissingPrototypes)?;
                resolve_segment(num_classes, shape, dims, proto_shape)?
            }
            Task::Detect | Task::Pose | Task::Obb => {
                let expected = task.features_per_anchor(num_classes, 0);
                let (orientation, anchors) =
                    orient(dims, expected).ok_or_else(|| YoloError::ShapeMismatch {
                        task,
                        shape: shape.to_vec(),
                        expected,
                    })?;
                TensorSpec {
                    task,
                    num_classes: if task == Task::Pose { 1 } else { num_classes },
                    features: expected,
                    anchors,
                    orientation,
                    mask_coefficients: 0,
                    protos: None,
                }
            }
        };

        debug!(
            task = %spec.task,
            features = spec.features,
            anchors = spec.anchors,
            orientation = ?spec.orientation,
            "resolved output layout"
        );
        Ok(spec)
    }

    /// Number of values the box (or score) buffer must hold.
    pub fn len(&self) -> usize {
        self.features * self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads feature `feature` of anchor `anchor`.
    #[inline]
    pub fn value(&self, data: &[f32], anchor: usize, feature: usize) -> f32 {
        match self.orientation {
            Orientation::FeatureMajor => data[feature * self.anchors + anchor],
            Orientation::AnchorMajor => data[anchor * self.features + feature],
        }
    }
}

/// Drops a leading batch dimension of 1 and requires two remaining dims.
/// Classification heads may also be 1-D.
fn strip_batch(shape: &[usize]) -> Option<&[usize]> {
    match shape.len() {
        1 | 2 => Some(shape),
        3 if shape[0] == 1 => Some(&shape[1..]),
        _ => None,
    }
}

fn orient(dims: &[usize], features: usize) -> Option<(Orientation, usize)> {
    if dims.len() != 2 {
        return None;
    }
    let (a, b) = (dims[0], dims[1]);
    if a == features {
        if b == features {
            warn!(
                features,
                "square output tensor, assuming feature-major layout"
            );
        }
        Some((Orientation::FeatureMajor, b))
    } else if b == features {
        Some((Orientation::AnchorMajor, a))
    } else {
        None
    }
}

fn resolve_segment(
    num_classes: usize,
    shape: &[usize],
    dims: &[usize],
    proto_shape: &[usize],
) -> Result<TensorSpec, YoloError> {
    let proto_dims = match proto_shape.len() {
        3 => proto_shape,
        4 if proto_shape[0] == 1 => &proto_shape[1..],
        _ => {
            return Err(YoloError::PrototypeShape {
                shape: proto_shape.to_vec(),
                coefficients: 0,
            })
        }
    };

    // Channel-last is tried first; it is what the mobile exports produce.
    let candidates = [
        (
            proto_dims[2],
            ProtoSpec {
                height: proto_dims[0],
                width: proto_dims[1],
                channels: proto_dims[2],
                layout: ProtoLayout::ChannelLast,
            },
        ),
        (
            proto_dims[0],
            ProtoSpec {
                height: proto_dims[1],
                width: proto_dims[2],
                channels: proto_dims[0],
                layout: ProtoLayout::ChannelFirst,
            },
        ),
    ];

    for (k, protos) in candidates {
        if k == 0 || protos.height == 0 || protos.width == 0 {
            continue;
        }
        let features = Task::Segment.features_per_anchor(num_classes, k);
        if let Some((orientation, anchors)) = orient(dims, features) {
            return Ok(TensorSpec {
                task: Task::Segment,
                num_classes,
                features,
                anchors,
                orientation,
                mask_coefficients: k,
                protos: Some(protos),
            });
        }
    }

    Err(YoloError::ShapeMismatch {
        task: Task::Segment,
        shape: shape.to_vec(),
        expected: Task::Segment.features_per_anchor(num_classes, proto_dims[2]),
    })
}
