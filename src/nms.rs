//! Greedy non-maximum suppression over decoded candidates.

use std::cmp::Ordering;

use crate::config::ObbIou;
use crate::decode::Candidate;
use crate::geom::{BBoxXYXY, ConvexClipper, Coord, Model};

/// How overlap between two candidates is measured.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Overlap {
    /// Axis-aligned boxes as decoded.
    Boxes,
    /// Rotated boxes; the input size undoes the per-axis normalization so
    /// angles are applied to undistorted extents.
    Oriented {
        mode: ObbIou,
        input_width: f64,
        input_height: f64,
    },
}

/// Parameters for one suppression pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    pub iou_threshold: f32,
    pub max_outputs: usize,
    /// One group for every candidate. Otherwise candidates only suppress
    /// others with the same class id.
    pub single_group: bool,
    pub overlap: Overlap,
}

/// Reusable suppression state. Holds the sort order and per-candidate
/// geometry scratch so repeated calls do not allocate.
#[derive(Debug, Default)]
pub struct NonMaxSuppressor {
    order: Vec<usize>,
    kept: Vec<usize>,
    rings: Vec<[Coord<Model>; 4]>,
    bounds: Vec<BBoxXYXY<Model>>,
    clipper: ConvexClipper<Model>,
}

impl NonMaxSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs greedy suppression and returns the indices of the kept
    /// candidates, highest confidence first (ties by anchor index).
    ///
    /// Suppressed candidates get their `suppressed` flag set. At most
    /// `max_outputs` indices are returned.
    pub fn suppress(&mut self, candidates: &mut [Candidate], params: &NmsParams) -> &[usize] {
        self.order.clear();
        self.kept.clear();
        self.order.extend(0..candidates.len());
        self.order.sort_unstable_by(|&a, &b| {
            let (ca, cb) = (&candidates[a], &candidates[b]);
            match cb.confidence.total_cmp(&ca.confidence) {
                Ordering::Equal => ca.anchor.cmp(&cb.anchor),
                other => other,
            }
        });
        self.prepare_geometry(candidates, params.overlap);

        let threshold = f64::from(params.iou_threshold);
        for i in 0..self.order.len() {
            if self.kept.len() >= params.max_outputs {
                break;
            }
            let a = self.order[i];
            if candidates[a].suppressed {
                continue;
            }
            self.kept.push(a);
            for j in i + 1..self.order.len() {
                let b = self.order[j];
                if candidates[b].suppressed {
                    continue;
                }
                if !params.single_group && candidates[a].class_id != candidates[b].class_id {
                    continue;
                }
                if self.iou(candidates, a, b, params.overlap) > threshold {
                    candidates[b].suppressed = true;
                }
            }
        }
        &self.kept
    }

    fn prepare_geometry(&mut self, candidates: &[Candidate], overlap: Overlap) {
        self.rings.clear();
        self.bounds.clear();
        let Overlap::Oriented {
            mode,
            input_width,
            input_height,
        } = overlap
        else {
            return;
        };
        for c in candidates {
            let ring = c
                .oriented_box(input_width, input_height)
                .vertices::<Model>()
                .map(|v| Coord::new(v.x / input_width, v.y / input_height));
            match mode {
                ObbIou::AxisAligned => self
                    .bounds
                    .push(BBoxXYXY::enclosing(&ring).unwrap_or_default()),
                ObbIou::Polygon => self.rings.push(ring),
            }
        }
    }

    #[inline]
    fn iou(&mut self, candidates: &[Candidate], a: usize, b: usize, overlap: Overlap) -> f64 {
        match overlap {
            Overlap::Boxes => candidates[a].bbox.iou(&candidates[b].bbox),
            Overlap::Oriented {
                mode: ObbIou::AxisAligned,
                ..
            } => self.bounds[a].iou(&self.bounds[b]),
            Overlap::Oriented {
                mode: ObbIou::Polygon,
                ..
            } => self.clipper.iou(&self.rings[a], &self.rings[b]),
        }
    }
}
