//! Per-call candidate storage, reused across frames.

use crate::geom::{BBoxXYXY, Coord, Model, OrientedBox};
use crate::tensor::POSE_KEYPOINTS;

/// Index of a candidate slot in a [`CandidateArena`].
///
/// Valid only until the arena is next cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateHandle(usize);

impl CandidateHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A decoded keypoint in model-input space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawKeypoint {
    pub position: Coord<Model>,
    pub confidence: f32,
}

/// One anchor that passed the confidence threshold.
///
/// `bbox` is in model-input space. For OBB candidates it is the unrotated
/// extent around the center and `angle` carries the rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub anchor: usize,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BBoxXYXY<Model>,
    pub angle: f64,
    pub suppressed: bool,
}

impl Candidate {
    /// The rotated box in model input pixels, where the angle is undistorted
    /// by non-square inputs.
    pub fn oriented_box(&self, input_width: f64, input_height: f64) -> OrientedBox {
        let c = self.bbox.center();
        OrientedBox::new(
            c.x * input_width,
            c.y * input_height,
            self.bbox.width() * input_width,
            self.bbox.height() * input_height,
            self.angle,
        )
    }
}

/// Slots for candidates plus their variable payloads.
///
/// Mask coefficients and keypoints live in flat side buffers indexed by the
/// candidate handle, so a frame with thousands of anchors allocates nothing
/// once the buffers have grown to size.
#[derive(Debug, Default)]
pub struct CandidateArena {
    candidates: Vec<Candidate>,
    coefficients: Vec<f32>,
    keypoints: Vec<RawKeypoint>,
    coefficient_stride: usize,
    keypoint_stride: usize,
}

impl CandidateArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the arena, keeping capacity, and sets payload strides for the
    /// coming frame.
    pub fn reset(&mut self, coefficient_stride: usize, with_keypoints: bool) {
        self.candidates.clear();
        self.coefficients.clear();
        self.keypoints.clear();
        self.coefficient_stride = coefficient_stride;
        self.keypoint_stride = if with_keypoints { POSE_KEYPOINTS } else { 0 };
    }

    /// Adds a candidate with zeroed payload slots.
    pub fn push(&mut self, candidate: Candidate) -> CandidateHandle {
        let handle = CandidateHandle(self.candidates.len());
        self.candidates.push(candidate);
        self.coefficients
            .resize(self.coefficients.len() + self.coefficient_stride, 0.0);
        self.keypoints.resize(
            self.keypoints.len() + self.keypoint_stride,
            RawKeypoint::default(),
        );
        handle
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[inline]
    pub fn get(&self, handle: CandidateHandle) -> &Candidate {
        &self.candidates[handle.0]
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Mutable view used by suppression to set the `suppressed` flag.
    pub fn candidates_mut(&mut self) -> &mut [Candidate] {
        &mut self.candidates
    }

    /// Handle for slot `index`, if that slot is filled.
    pub fn handle(&self, index: usize) -> Option<CandidateHandle> {
        (index < self.candidates.len()).then_some(CandidateHandle(index))
    }

    pub fn handles(&self) -> impl Iterator<Item = CandidateHandle> {
        (0..self.candidates.len()).map(CandidateHandle)
    }

    pub fn coefficients(&self, handle: CandidateHandle) -> &[f32] {
        let s = self.coefficient_stride;
        &self.coefficients[handle.0 * s..(handle.0 + 1) * s]
    }

    pub fn coefficients_mut(&mut self, handle: CandidateHandle) -> &mut [f32] {
        let s = self.coefficient_stride;
        &mut self.coefficients[handle.0 * s..(handle.0 + 1) * s]
    }

    pub fn keypoints(&self, handle: CandidateHandle) -> &[RawKeypoint] {
        let s = self.keypoint_stride;
        &self.keypoints[handle.0 * s..(handle.0 + 1) * s]
    }

    pub fn keypoints_mut(&mut self, handle: CandidateHandle) -> &mut [RawKeypoint] {
        let s = self.keypoint_stride;
        &mut self.keypoints[handle.0 * s..(handle.0 + 1) * s]
    }
}
