#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

use yolopost::decode::Candidate;
use yolopost::geom::BBoxXYXY;
use yolopost::{FrameTransform, Rotation};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Boxes in model space that may hang off the unit square.
pub fn arb_model_box() -> impl Strategy<Value = BBoxXYXY<yolopost::geom::Model>> {
    (-0.2f64..1.2, -0.2f64..1.2, 0.001f64..0.8, 0.001f64..0.8)
        .prop_map(|(x, y, w, h)| BBoxXYXY::from_xyxy(x, y, x + w, y + h))
}

pub fn arb_rotation() -> impl Strategy<Value = Rotation> {
    prop_oneof![
        Just(Rotation::None),
        Just(Rotation::Deg90),
        Just(Rotation::Deg270),
    ]
}

pub fn arb_transform() -> impl Strategy<Value = FrameTransform> {
    (arb_rotation(), any::<bool>()).prop_map(|(r, m)| FrameTransform::new(r, m))
}

/// Candidates with distinct anchors drawn from a few classes.
pub fn arb_candidates(max: usize, classes: usize) -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec(
        (
            0.0f64..0.9,
            0.0f64..0.9,
            0.01f64..0.3,
            0.01f64..0.3,
            0.26f32..1.0,
            0..classes,
        ),
        0..max,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(anchor, (x, y, w, h, confidence, class_id))| Candidate {
                anchor,
                class_id,
                confidence,
                bbox: BBoxXYXY::from_xyxy(x, y, (x + w).min(1.0), (y + h).min(1.0)),
                angle: 0.0,
                suppressed: false,
            })
            .collect()
    })
}
