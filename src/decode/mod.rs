//! Raw tensor → candidates.
//!
//! The decoder walks every anchor once, keeps those whose score is above the
//! confidence threshold and whose geometry is usable, and writes them into a
//! [`CandidateArena`]. Everything it emits is in model-input space.
//!
//! Bad anchors (NaN scores, non-positive sizes, NaN angles) are dropped
//! silently; a frame where everything is dropped is just an empty frame.

mod arena;

pub use arena::{Candidate, CandidateArena, CandidateHandle, RawKeypoint};

use std::cmp::Ordering;

use tracing::trace;

use crate::config::BoxUnits;
use crate::error::YoloError;
use crate::geom::{BBoxXYXY, Coord};
use crate::tensor::{Task, TensorSpec, POSE_KEYPOINTS};

/// Decodes one task's output layout.
#[derive(Debug, Clone)]
pub struct TensorDecoder {
    spec: TensorSpec,
    box_units: BoxUnits,
    input_width: f64,
    input_height: f64,
}

impl TensorDecoder {
    pub fn new(spec: TensorSpec, box_units: BoxUnits, input_width: u32, input_height: u32) -> Self {
        Self {
            spec,
            box_units,
            input_width: f64::from(input_width),
            input_height: f64::from(input_height),
        }
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    fn check_len(&self, data: &[f32]) -> Result<(), YoloError> {
        if data.len() != self.spec.len() {
            return Err(YoloError::BufferLength {
                shape: vec![self.spec.features, self.spec.anchors],
                expected: self.spec.len(),
                actual: data.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn scale(&self, x: f32, y: f32) -> (f64, f64) {
        let (x, y) = (f64::from(x), f64::from(y));
        match self.box_units {
            BoxUnits::Normalized => (x, y),
            BoxUnits::ModelPixels => (x / self.input_width, y / self.input_height),
        }
    }

    /// Best class score and its index; the first maximum wins. `None` when
    /// any score is non-finite.
    #[inline]
    fn best_class(&self, data: &[f32], anchor: usize) -> Option<(usize, f32)> {
        let mut best = (0, f32::NEG_INFINITY);
        for class in 0..self.spec.num_classes {
            let score = self.spec.value(data, anchor, 4 + class);
            if !score.is_finite() {
                return None;
            }
            if score > best.1 {
                best = (class, score);
            }
        }
        Some(best)
    }

    /// Decodes box-bearing tasks into `arena`, which is reset first.
    /// Returns the number of candidates written.
    pub fn decode(
        &self,
        data: &[f32],
        confidence_threshold: f32,
        arena: &mut CandidateArena,
    ) -> Result<usize, YoloError> {
        self.check_len(data)?;
        let spec = &self.spec;
        arena.reset(spec.mask_coefficients, spec.task == Task::Pose);
        if !spec.task.has_boxes() {
            return Ok(0);
        }

        let mut dropped = 0usize;
        for anchor in 0..spec.anchors {
            let (class_id, confidence) = match spec.task {
                Task::Pose => (0, spec.value(data, anchor, 4)),
                _ => match self.best_class(data, anchor) {
                    Some(best) => best,
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
            };
            if !confidence.is_finite() {
                dropped += 1;
                continue;
            }
            if !(0.0..=1.0).contains(&confidence) {
                trace!(anchor, confidence, "dropping out-of-range confidence");
                dropped += 1;
                continue;
            }
            if confidence <= confidence_threshold {
                continue;
            }

            let (cx, cy) = self.scale(spec.value(data, anchor, 0), spec.value(data, anchor, 1));
            let (w, h) = self.scale(spec.value(data, anchor, 2), spec.value(data, anchor, 3));
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite())
                || w <= 0.0
                || h <= 0.0
            {
                trace!(anchor, cx, cy, w, h, "dropping degenerate box");
                dropped += 1;
                continue;
            }

            let mut angle = 0.0;
            let bbox = if spec.task == Task::Obb {
                angle = f64::from(spec.value(data, anchor, 4 + spec.num_classes));
                if !angle.is_finite() {
                    trace!(anchor, "dropping box with non-finite angle");
                    dropped += 1;
                    continue;
                }
                // Rotated extent may legitimately leave the unit square; the
                // mapper clamps after rotation.
                BBoxXYXY::from_cxcywh(cx, cy, w, h)
            } else {
                let clamped = BBoxXYXY::from_cxcywh(cx, cy, w, h).clamp_unit();
                if clamped.width() <= 0.0 || clamped.height() <= 0.0 {
                    trace!(anchor, cx, cy, w, h, "dropping box outside the model input");
                    dropped += 1;
                    continue;
                }
                clamped
            };

            let handle = arena.push(Candidate {
                anchor,
                class_id,
                confidence,
                bbox,
                angle,
                suppressed: false,
            });

            match spec.task {
                Task::Segment => {
                    let base = 4 + spec.num_classes;
                    for (k, slot) in arena.coefficients_mut(handle).iter_mut().enumerate() {
                        *slot = spec.value(data, anchor, base + k);
                    }
                }
                Task::Pose => {
                    for (k, slot) in arena.keypoints_mut(handle).iter_mut().enumerate() {
                        *slot = self.keypoint(data, anchor, k);
                    }
                }
                _ => {}
            }
        }

        if dropped > 0 {
            trace!(dropped, "anchors dropped as degenerate");
        }
        Ok(arena.len())
    }

    fn keypoint(&self, data: &[f32], anchor: usize, k: usize) -> RawKeypoint {
        debug_assert!(k < POSE_KEYPOINTS);
        let base = 5 + k * 3;
        let (x, y) = self.scale(
            self.spec.value(data, anchor, base),
            self.spec.value(data, anchor, base + 1),
        );
        let c = self.spec.value(data, anchor, base + 2);
        if !(x.is_finite() && y.is_finite() && c.is_finite()) {
            return RawKeypoint::default();
        }
        RawKeypoint {
            position: Coord::new(x, y).clamp_unit(),
            confidence: c.clamp(0.0, 1.0),
        }
    }

    /// Ranks classification scores into `out` (cleared first): descending
    /// score, ties by class index, at most `top_k` entries. Scores that are
    /// non-finite or outside [0, 1] are skipped.
    pub fn classify(
        &self,
        data: &[f32],
        top_k: usize,
        out: &mut Vec<(usize, f32)>,
    ) -> Result<(), YoloError> {
        self.check_len(data)?;
        out.clear();
        out.extend(
            (0..self.spec.num_classes)
                .map(|class| (class, self.spec.value(data, 0, class)))
                .filter(|(_, score)| (0.0..=1.0).contains(score)),
        );
        out.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        out.truncate(top_k);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Orientation, POSE_FEATURES};

    /// Builds a feature-major buffer from per-anchor feature rows.
    fn feature_major(rows: &[Vec<f32>]) -> Vec<f32> {
        let features = rows[0].len();
        let mut data = vec![0.0; features * rows.len()];
        for (a, row) in rows.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                data[f * rows.len() + a] = *v;
            }
        }
        data
    }

    fn decoder(task: Task, classes: usize, anchors: usize, k: usize) -> TensorDecoder {
        let spec = TensorSpec {
            task,
            num_classes: classes,
            features: task.features_per_anchor(classes, k),
            anchors,
            orientation: Orientation::FeatureMajor,
            mask_coefficients: k,
            protos: None,
        };
        TensorDecoder::new(spec, BoxUnits::Normalized, 640, 640)
    }

    #[test]
    fn test_detect_argmax_and_threshold() {
        let d = decoder(Task::Detect, 3, 3, 0);
        let data = feature_major(&[
            vec![0.5, 0.5, 0.2, 0.2, 0.1, 0.8, 0.8],
            vec![0.5, 0.5, 0.2, 0.2, 0.2, 0.2, 0.2],
            vec![0.5, 0.5, 0.2, 0.2, 0.3, 0.0, 0.0],
        ]);
        let mut arena = CandidateArena::new();
        assert_eq!(d.decode(&data, 0.25, &mut arena).unwrap(), 2);
        let c = arena.candidates();
        assert_eq!((c[0].anchor, c[0].class_id), (0, 1));
        assert_eq!((c[1].anchor, c[1].class_id), (2, 0));
        assert!((c[0].bbox.xmin() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_score_equal_to_threshold_is_dropped() {
        let d = decoder(Task::Detect, 1, 1, 0);
        let data = feature_major(&[vec![0.5, 0.5, 0.2, 0.2, 0.5]]);
        let mut arena = CandidateArena::new();
        assert_eq!(d.decode(&data, 0.5, &mut arena).unwrap(), 0);
    }

    #[test]
    fn test_degenerate_anchors_are_dropped() {
        let d = decoder(Task::Detect, 1, 4, 0);
        let data = feature_major(&[
            vec![0.5, 0.5, 0.0, 0.2, 0.9],
            vec![f32::NAN, 0.5, 0.2, 0.2, 0.9],
            vec![0.5, 0.5, 0.2, 0.2, f32::NAN],
            vec![0.5, 0.5, 0.2, -0.1, 0.9],
        ]);
        let mut arena = CandidateArena::new();
        assert_eq!(d.decode(&data, 0.25, &mut arena).unwrap(), 0);
    }

    #[test]
    fn test_model_pixel_units_are_normalized_per_axis() {
        let spec = TensorSpec {
            task: Task::Detect,
            num_classes: 1,
            features: 5,
            anchors: 1,
            orientation: Orientation::AnchorMajor,
            mask_coefficients: 0,
            protos: None,
        };
        let d = TensorDecoder::new(spec, BoxUnits::ModelPixels, 640, 320);
        let mut arena = CandidateArena::new();
        d.decode(&[320.0, 160.0, 64.0, 32.0, 0.9], 0.25, &mut arena)
            .unwrap();
        let b = arena.candidates()[0].bbox;
        assert!((b.xmin() - 0.45).abs() < 1e-9);
        assert!((b.ymin() - 0.45).abs() < 1e-9);
        assert!((b.xmax() - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_pose_keypoints_clamped_and_sanitized() {
        let d = decoder(Task::Pose, 1, 1, 0);
        let mut row = vec![0.0f32; POSE_FEATURES];
        row[..5].copy_from_slice(&[0.5, 0.5, 0.4, 0.6, 0.95]);
        for k in 0..POSE_KEYPOINTS {
            row[5 + k * 3] = 0.1;
            row[6 + k * 3] = 0.2;
            row[7 + k * 3] = 1.7;
        }
        row[5 + 3] = f32::NAN;
        let data = feature_major(&[row]);
        let mut arena = CandidateArena::new();
        assert_eq!(d.decode(&data, 0.25, &mut arena).unwrap(), 1);
        let h = arena.handles().next().unwrap();
        let kps = arena.keypoints(h);
        assert_eq!(kps.len(), POSE_KEYPOINTS);
        assert_eq!(kps[0].confidence, 1.0);
        assert_eq!(kps[1], RawKeypoint::default());
        assert_eq!(arena.get(h).class_id, 0);
    }

    #[test]
    fn test_segment_coefficients_stored() {
        let d = decoder(Task::Segment, 1, 2, 2);
        let data = feature_major(&[
            vec![0.5, 0.5, 0.2, 0.2, 0.9, 1.5, -2.0],
            vec![0.5, 0.5, 0.2, 0.2, 0.1, 9.0, 9.0],
        ]);
        let mut arena = CandidateArena::new();
        d.decode(&data, 0.25, &mut arena).unwrap();
        let h = arena.handles().next().unwrap();
        assert_eq!(arena.coefficients(h), &[1.5, -2.0]);
    }

    #[test]
    fn test_obb_angle_and_unclamped_extent() {
        let d = decoder(Task::Obb, 1, 2, 0);
        let data = feature_major(&[
            vec![0.95, 0.5, 0.2, 0.1, 0.9, 0.5],
            vec![0.5, 0.5, 0.2, 0.1, 0.9, f32::INFINITY],
        ]);
        let mut arena = CandidateArena::new();
        assert_eq!(d.decode(&data, 0.25, &mut arena).unwrap(), 1);
        let c = arena.candidates()[0];
        assert!((c.angle - 0.5).abs() < 1e-9);
        assert!(c.bbox.xmax() > 1.0);
    }

    #[test]
    fn test_classify_ranking() {
        let d = decoder(Task::Classify, 5, 1, 0);
        let mut out = Vec::new();
        d.classify(&[0.1, 0.7, 0.2, 0.7, f32::NAN], 3, &mut out)
            .unwrap();
        assert_eq!(out, vec![(1, 0.7), (3, 0.7), (2, 0.2)]);
    }

    #[test]
    fn test_wrong_buffer_length() {
        let d = decoder(Task::Detect, 1, 2, 0);
        let mut arena = CandidateArena::new();
        let err = d.decode(&[0.0; 9], 0.25, &mut arena).unwrap_err();
        assert!(matches!(
            err,
            YoloError::BufferLength {
                expected: 10,
                actual: 9,
                ..
            }
        ));
    }
}
