//! The value handed back to the caller after each frame.
//!
//! A [`DetectionResult`] is immutable once built. Its constructor checks the
//! geometric guarantees the pipeline makes, so a caller never sees an
//! unordered box, an out-of-range normalized coordinate or a mask that does
//! not match the destination size.

mod report;

use serde::Serialize;

use crate::error::YoloError;
use crate::geom::{BBoxXYXY, Coord, Normalized, OrientedBox, Pixel, Polygon};
use crate::mask::{InstanceMask, Mask};
use crate::tensor::{Task, POSE_KEYPOINTS};
pub use crate::transform::BoundingBox;

/// One kept box.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentInstance {
    #[serde(flatten)]
    pub detection: Detection,
    /// `None` when the mask could not be reconstructed; the box stands.
    pub mask: Option<InstanceMask>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Keypoint {
    pub name: &'static str,
    pub normalized: Coord<Normalized>,
    pub pixel: Coord<Pixel>,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoseInstance {
    #[serde(flatten)]
    pub detection: Detection,
    pub keypoints: [Keypoint; POSE_KEYPOINTS],
}

/// A rotated detection. `detection.bbox` is the axis-aligned box enclosing
/// the rotated one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObbInstance {
    #[serde(flatten)]
    pub detection: Detection,
    /// In destination pixels.
    pub oriented: OrientedBox,
    pub polygon: Polygon<Normalized>,
    pub polygon_pixel: Polygon<Pixel>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassScore {
    pub class_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub score: f32,
}

/// Ranked classes, best first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Classification {
    pub ranked: Vec<ClassScore>,
}

impl Classification {
    pub fn top1(&self) -> Option<&ClassScore> {
        self.ranked.first()
    }
}

/// Task-specific payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum TaskResult {
    Detect {
        detections: Vec<Detection>,
    },
    Segment {
        instances: Vec<SegmentInstance>,
        union_mask: Option<Mask>,
    },
    Classify {
        classification: Classification,
    },
    Pose {
        instances: Vec<PoseInstance>,
    },
    Obb {
        instances: Vec<ObbInstance>,
    },
}

impl TaskResult {
    pub fn task(&self) -> Task {
        match self {
            TaskResult::Detect { .. } => Task::Detect,
            TaskResult::Segment { .. } => Task::Segment,
            TaskResult::Classify { .. } => Task::Classify,
            TaskResult::Pose { .. } => Task::Pose,
            TaskResult::Obb { .. } => Task::Obb,
        }
    }

    /// An empty payload for `task`.
    pub fn empty(task: Task) -> Self {
        match task {
            Task::Detect => TaskResult::Detect {
                detections: Vec::new(),
            },
            Task::Segment => TaskResult::Segment {
                instances: Vec::new(),
                union_mask: None,
            },
            Task::Classify => TaskResult::Classify {
                classification: Classification::default(),
            },
            Task::Pose => TaskResult::Pose {
                instances: Vec::new(),
            },
            Task::Obb => TaskResult::Obb {
                instances: Vec::new(),
            },
        }
    }

    fn detections(&self) -> Box<dyn Iterator<Item = &Detection> + '_> {
        match self {
            TaskResult::Detect { detections } => Box::new(detections.iter()),
            TaskResult::Segment { instances, .. } => {
                Box::new(instances.iter().map(|i| &i.detection))
            }
            TaskResult::Pose { instances } => Box::new(instances.iter().map(|i| &i.detection)),
            TaskResult::Obb { instances } => Box::new(instances.iter().map(|i| &i.detection)),
            TaskResult::Classify { .. } => Box::new(std::iter::empty()),
        }
    }
}

/// Timing and destination information for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub processing_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

/// The assembled result of one call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    #[serde(flatten)]
    payload: TaskResult,
    metadata: FrameMetadata,
}

impl DetectionResult {
    /// Builds a result, checking box ordering and range, mask sizes and
    /// keypoint confidences.
    pub fn new(payload: TaskResult, metadata: FrameMetadata) -> Result<Self, YoloError> {
        for (i, d) in payload.detections().enumerate() {
            check_box(i, &d.bbox)?;
        }
        let (w, h) = (metadata.width, metadata.height);
        match &payload {
            TaskResult::Segment {
                instances,
                union_mask,
            } => {
                for (i, inst) in instances.iter().enumerate() {
                    if let Some(m) = &inst.mask {
                        check_mask(&format!("instance {} mask", i), &m.mask, w, h)?;
                        check_points(i, &m.outline.points)?;
                    }
                }
                if let Some(m) = union_mask {
                    check_mask("union mask", m, w, h)?;
                }
            }
            TaskResult::Pose { instances } => {
                for (i, inst) in instances.iter().enumerate() {
                    for kp in &inst.keypoints {
                        if !(0.0..=1.0).contains(&kp.confidence) {
                            return Err(YoloError::InvalidResult(format!(
                                "instance {} keypoint '{}' confidence {} is outside [0, 1]",
                                i, kp.name, kp.confidence
                            )));
                        }
                        check_points(i, std::slice::from_ref(&kp.normalized))?;
                    }
                }
            }
            TaskResult::Obb { instances } => {
                for (i, inst) in instances.iter().enumerate() {
                    check_points(i, &inst.polygon.points)?;
                }
            }
            TaskResult::Detect { .. } | TaskResult::Classify { .. } => {}
        }
        Ok(Self { payload, metadata })
    }

    pub fn task(&self) -> Task {
        self.payload.task()
    }

    pub fn payload(&self) -> &TaskResult {
        &self.payload
    }

    pub fn into_payload(self) -> TaskResult {
        self.payload
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    /// Every box in the result, in output order. Empty for classification.
    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.payload.detections().map(|d| d.bbox).collect()
    }

    /// Detections (or instances) in output order.
    pub fn detections(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.payload.detections()
    }

    /// Number of instances, or of ranked classes for classification.
    pub fn len(&self) -> usize {
        match &self.payload {
            TaskResult::Classify { classification } => classification.ranked.len(),
            other => other.detections().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn in_unit(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

fn check_box(i: usize, b: &BoundingBox) -> Result<(), YoloError> {
    let n: &BBoxXYXY<Normalized> = &b.normalized;
    if !n.is_finite() || !b.pixel.is_finite() {
        return Err(YoloError::InvalidResult(format!(
            "box {} has non-finite coordinates",
            i
        )));
    }
    if !n.is_ordered() || !b.pixel.is_ordered() {
        return Err(YoloError::InvalidResult(format!(
            "box {} is not ordered: {:?}",
            i, n
        )));
    }
    if ![n.xmin(), n.ymin(), n.xmax(), n.ymax()]
        .into_iter()
        .all(in_unit)
    {
        return Err(YoloError::InvalidResult(format!(
            "box {} leaves the unit square: {:?}",
            i, n
        )));
    }
    Ok(())
}

fn check_points(i: usize, points: &[Coord<Normalized>]) -> Result<(), YoloError> {
    if points.iter().all(|p| in_unit(p.x) && in_unit(p.y)) {
        Ok(())
    } else {
        Err(YoloError::InvalidResult(format!(
            "instance {} has normalized points outside [0, 1]",
            i
        )))
    }
}

fn check_mask(what: &str, m: &Mask, width: u32, height: u32) -> Result<(), YoloError> {
    if m.width() != width || m.height() != height {
        return Err(YoloError::InvalidResult(format!(
            "{} is {}x{}, destination is {}x{}",
            what,
            m.width(),
            m.height(),
            width,
            height
        )));
    }
    Ok(())
}
