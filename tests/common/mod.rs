#![allow(dead_code)]

use std::fs;
use std::path::Path;

use yolopost::tensor::{POSE_FEATURES, POSE_KEYPOINTS};
use yolopost::RawTensorOutput;

/// Lays per-anchor feature rows out as a `[1, features, anchors]` tensor.
pub fn feature_major(rows: &[Vec<f32>]) -> RawTensorOutput {
    let anchors = rows.len();
    let features = rows.first().map_or(0, Vec::len);
    let mut data = vec![0.0; features * anchors];
    for (a, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), features, "ragged anchor rows");
        for (f, v) in row.iter().enumerate() {
            data[f * anchors + a] = *v;
        }
    }
    RawTensorOutput::new(vec![1, features, anchors], data).expect("valid tensor")
}

/// Lays per-anchor feature rows out as a `[1, anchors, features]` tensor.
pub fn anchor_major(rows: &[Vec<f32>]) -> RawTensorOutput {
    let anchors = rows.len();
    let features = rows.first().map_or(0, Vec::len);
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    RawTensorOutput::new(vec![1, anchors, features], data).expect("valid tensor")
}

/// `[cx, cy, w, h, scores...]` with `score` on `class` and zero elsewhere.
pub fn detect_row(box_cxcywh: [f32; 4], num_classes: usize, class: usize, score: f32) -> Vec<f32> {
    let mut row = box_cxcywh.to_vec();
    row.extend((0..num_classes).map(|c| if c == class { score } else { 0.0 }));
    row
}

/// A segmentation row: detect layout followed by mask coefficients.
pub fn segment_row(
    box_cxcywh: [f32; 4],
    num_classes: usize,
    class: usize,
    score: f32,
    coefficients: &[f32],
) -> Vec<f32> {
    let mut row = detect_row(box_cxcywh, num_classes, class, score);
    row.extend_from_slice(coefficients);
    row
}

/// An OBB row: detect layout followed by the angle in radians.
pub fn obb_row(
    box_cxcywh: [f32; 4],
    num_classes: usize,
    class: usize,
    score: f32,
    angle: f32,
) -> Vec<f32> {
    let mut row = detect_row(box_cxcywh, num_classes, class, score);
    row.push(angle);
    row
}

/// A pose row with every keypoint at `(kx, ky)` and confidence `kc`.
pub fn pose_row(box_cxcywh: [f32; 4], score: f32, kx: f32, ky: f32, kc: f32) -> Vec<f32> {
    let mut row = box_cxcywh.to_vec();
    row.push(score);
    for _ in 0..POSE_KEYPOINTS {
        row.extend_from_slice(&[kx, ky, kc]);
    }
    assert_eq!(row.len(), POSE_FEATURES);
    row
}

/// Channel-last prototypes `[1, h, w, k]` where channel 0 is `value`
/// everywhere and the rest are zero.
pub fn flat_protos(h: usize, w: usize, k: usize, value: f32) -> RawTensorOutput {
    let mut data = vec![0.0; h * w * k];
    for cell in data.chunks_mut(k) {
        cell[0] = value;
    }
    RawTensorOutput::new(vec![1, h, w, k], data).expect("valid protos")
}

pub fn write_json(path: &Path, tensor: &RawTensorOutput) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let text = serde_json::to_string(tensor).expect("serialize tensor");
    fs::write(path, text).expect("write tensor file");
}
