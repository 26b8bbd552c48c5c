use proptest::prelude::*;

use yolopost::nms::{NmsParams, NonMaxSuppressor, Overlap};

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn kept_pairs_in_a_group_never_overlap_past_threshold(
        mut candidates in proptest_helpers::arb_candidates(40, 3),
        iou in 0.1f32..0.9,
        max_outputs in 1usize..50,
        single_group in any::<bool>(),
    ) {
        let params = NmsParams {
            iou_threshold: iou,
            max_outputs,
            single_group,
            overlap: Overlap::Boxes,
        };
        let mut nms = NonMaxSuppressor::new();
        let kept = nms.suppress(&mut candidates, &params).to_vec();

        prop_assert!(kept.len() <= max_outputs);
        for (i, &a) in kept.iter().enumerate() {
            for &b in &kept[i + 1..] {
                let (ca, cb) = (&candidates[a], &candidates[b]);
                if single_group || ca.class_id == cb.class_id {
                    prop_assert!(ca.bbox.iou(&cb.bbox) <= f64::from(iou));
                }
            }
        }
    }

    #[test]
    fn kept_order_is_confidence_then_anchor(
        mut candidates in proptest_helpers::arb_candidates(40, 2),
    ) {
        let params = NmsParams {
            iou_threshold: 0.45,
            max_outputs: 100,
            single_group: false,
            overlap: Overlap::Boxes,
        };
        let mut nms = NonMaxSuppressor::new();
        let kept = nms.suppress(&mut candidates, &params).to_vec();
        for w in kept.windows(2) {
            let (a, b) = (&candidates[w[0]], &candidates[w[1]]);
            prop_assert!(
                a.confidence > b.confidence
                    || (a.confidence == b.confidence && a.anchor < b.anchor)
            );
        }
        // The best candidate always survives.
        if let Some(best) = candidates
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.confidence.total_cmp(&y.1.confidence).then(y.1.anchor.cmp(&x.1.anchor)))
        {
            prop_assert_eq!(kept.first().copied(), Some(best.0));
        }
    }

    #[test]
    fn suppression_is_deterministic(
        candidates in proptest_helpers::arb_candidates(30, 2),
    ) {
        let params = NmsParams {
            iou_threshold: 0.5,
            max_outputs: 30,
            single_group: false,
            overlap: Overlap::Boxes,
        };
        let mut nms = NonMaxSuppressor::new();
        let mut a = candidates.clone();
        let first = nms.suppress(&mut a, &params).to_vec();
        let mut b = candidates;
        let second = nms.suppress(&mut b, &params).to_vec();
        prop_assert_eq!(first, second);
    }
}
