//! Instance masks for segmentation models.
//!
//! Each kept candidate's coefficients are combined with the shared prototype
//! tensor into a low-resolution probability map, cropped to the candidate's
//! box, and resampled onto the destination image through the inverse of the
//! frame transform. Outlines are traced on the low-resolution map and mapped
//! forward through the same transform.

use std::ops::Range;

use serde::Serialize;
use tracing::trace;

use crate::config::MaskMode;
use crate::geom::{BBoxXYXY, Coord, Model, Normalized, Pixel, Polygon};
use crate::tensor::ProtoSpec;
use crate::transform::{BoundingBox, CoordinateMapper};

/// Alpha at or above this counts as foreground.
pub const FOREGROUND_ALPHA: u8 = 128;

/// A destination-sized alpha mask, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> usize {
        self.data.iter().filter(|&&a| a >= FOREGROUND_ALPHA).count()
    }

    /// Per-pixel maximum over equally sized masks. `None` when there are no
    /// masks or their sizes differ.
    pub fn union<'a, I>(masks: I) -> Option<Mask>
    where
        I: IntoIterator<Item = &'a Mask>,
    {
        let mut iter = masks.into_iter();
        let mut out = iter.next()?.clone();
        for m in iter {
            if m.width != out.width || m.height != out.height {
                return None;
            }
            for (o, &v) in out.data.iter_mut().zip(&m.data) {
                *o = (*o).max(v);
            }
        }
        Some(out)
    }

    /// Run lengths of alternating background/foreground pixels in row-major
    /// order, starting with background.
    pub fn run_lengths(&self) -> Vec<u32> {
        let mut counts = Vec::new();
        let mut fg = false;
        let mut run = 0u32;
        for &a in &self.data {
            if (a >= FOREGROUND_ALPHA) != fg {
                counts.push(run);
                run = 0;
                fg = !fg;
            }
            run += 1;
        }
        counts.push(run);
        counts
    }
}

impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("area", &self.area())
            .finish()
    }
}

impl Serialize for Mask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Mask", 4)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.serialize_field("area", &self.area())?;
        state.serialize_field("counts", &self.run_lengths())?;
        state.end()
    }
}

/// A reconstructed instance: its mask plus outline in both spaces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstanceMask {
    pub mask: Mask,
    pub outline: Polygon<Normalized>,
    pub outline_pixel: Polygon<Pixel>,
}

/// Builds instance masks, reusing its scratch buffers across instances and
/// frames.
#[derive(Debug, Default)]
pub struct MaskReconstructor {
    mode: MaskMode,
    low_res: Vec<f32>,
    labels: Vec<u32>,
    queue: Vec<usize>,
    contour: Vec<(i32, i32)>,
}

const NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

impl MaskReconstructor {
    pub fn new(mode: MaskMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> MaskMode {
        self.mode
    }

    /// Reconstructs one instance. `None` means the mask could not be built
    /// (bad coefficients, box too small for the prototype grid, nothing
    /// above threshold); the caller keeps the box without a mask.
    pub fn reconstruct(
        &mut self,
        coefficients: &[f32],
        protos: &[f32],
        spec: &ProtoSpec,
        model_box: &BBoxXYXY<Model>,
        dest_box: &BoundingBox,
        mapper: &CoordinateMapper,
    ) -> Option<InstanceMask> {
        if coefficients.len() != spec.channels || protos.len() != spec.len() {
            trace!(
                coefficients = coefficients.len(),
                channels = spec.channels,
                "mask coefficient count mismatch"
            );
            return None;
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            trace!("non-finite mask coefficients");
            return None;
        }

        let (mw, mh) = (spec.width, spec.height);
        let xs = cell_range(model_box.xmin(), model_box.xmax(), mw);
        let ys = cell_range(model_box.ymin(), model_box.ymax(), mh);
        if xs.is_empty() || ys.is_empty() {
            trace!(?model_box, "box covers no prototype cells");
            return None;
        }

        self.low_res.clear();
        self.low_res.resize(mw * mh, 0.0);
        for y in ys.clone() {
            for x in xs.clone() {
                let mut sum = 0.0f32;
                for (k, &c) in coefficients.iter().enumerate() {
                    sum += c * spec.value(protos, k, y, x);
                }
                let p = sigmoid(sum);
                if !p.is_finite() {
                    trace!("non-finite prototype values");
                    return None;
                }
                self.low_res[y * mw + x] = p;
            }
        }

        let (dw, dh) = mapper.dest_size();
        let (width, height) = (dw as u32, dh as u32);
        let mut mask = Mask::new(width, height);
        let transform = mapper.transform();
        let dx = cell_range(
            dest_box.normalized.xmin(),
            dest_box.normalized.xmax(),
            width as usize,
        );
        let dy = cell_range(
            dest_box.normalized.ymin(),
            dest_box.normalized.ymax(),
            height as usize,
        );
        let mut foreground = 0usize;
        for y in dy {
            for x in dx.clone() {
                let n: Coord<Normalized> =
                    Coord::new((x as f64 + 0.5) / dw, (y as f64 + 0.5) / dh);
                let m = transform.invert(n);
                let p = bilinear(
                    &self.low_res,
                    mw,
                    mh,
                    m.x * mw as f64 - 0.5,
                    m.y * mh as f64 - 0.5,
                );
                let alpha = match self.mode {
                    MaskMode::Binary => {
                        if p > 0.5 {
                            255
                        } else {
                            0
                        }
                    }
                    MaskMode::Soft => (p * 255.0).round().clamp(0.0, 255.0) as u8,
                };
                if alpha >= FOREGROUND_ALPHA {
                    foreground += 1;
                }
                mask.data[y * width as usize + x] = alpha;
            }
        }
        if foreground == 0 {
            trace!("mask empty after upsampling");
            return None;
        }

        let points = self.trace_outline(mw, mh);
        let (outline, outline_pixel) = mapper.map_polygon(&points);
        Some(InstanceMask {
            mask,
            outline,
            outline_pixel,
        })
    }

    /// Outer contour of the largest 8-connected foreground region of the
    /// low-resolution map, as prototype cell centers in model space.
    fn trace_outline(&mut self, mw: usize, mh: usize) -> Vec<Coord<Model>> {
        let Some((label, start)) = self.largest_region(mw, mh) else {
            return Vec::new();
        };
        let inside = |labels: &[u32], x: i32, y: i32| -> bool {
            x >= 0
                && y >= 0
                && (x as usize) < mw
                && (y as usize) < mh
                && labels[y as usize * mw + x as usize] == label
        };

        self.contour.clear();
        let start = ((start % mw) as i32, (start / mw) as i32);
        self.contour.push(start);
        let mut cur = start;
        let mut back = 0usize;
        let mut second: Option<(i32, i32)> = None;
        let limit = 4 * mw * mh + 16;
        for _ in 0..limit {
            let mut next = None;
            for i in 1..=8 {
                let d = (back + i) % 8;
                let (nx, ny) = (cur.0 + NEIGHBORS[d].0, cur.1 + NEIGHBORS[d].1);
                if inside(&self.labels, nx, ny) {
                    next = Some(((nx, ny), d));
                    break;
                }
            }
            let Some((n, d)) = next else {
                break;
            };
            if cur == start && second == Some(n) {
                break;
            }
            if second.is_none() {
                second = Some(n);
            }
            self.contour.push(n);
            cur = n;
            back = if d % 2 == 0 { (d + 6) % 8 } else { (d + 5) % 8 };
        }
        if self.contour.len() > 1 && self.contour.last() == Some(&start) {
            self.contour.pop();
        }

        let ring = &self.contour;
        let len = ring.len();
        let mut points = Vec::with_capacity(len);
        for i in 0..len {
            let p = ring[i];
            if len >= 3 {
                let a = ring[(i + len - 1) % len];
                let b = ring[(i + 1) % len];
                let (ux, uy) = (p.0 - a.0, p.1 - a.1);
                let (vx, vy) = (b.0 - p.0, b.1 - p.1);
                if ux * vy - uy * vx == 0 && ux * vx + uy * vy > 0 {
                    continue;
                }
            }
            points.push(Coord::new(
                (p.0 as f64 + 0.5) / mw as f64,
                (p.1 as f64 + 0.5) / mh as f64,
            ));
        }
        points
    }

    /// Labels 8-connected regions where the map exceeds 0.5 and returns the
    /// label and first raster index of the largest one.
    fn largest_region(&mut self, mw: usize, mh: usize) -> Option<(u32, usize)> {
        self.labels.clear();
        self.labels.resize(mw * mh, 0);
        let mut best: Option<(u32, usize, usize)> = None;
        let mut next_label = 1u32;
        for seed in 0..mw * mh {
            if self.low_res[seed] <= 0.5 || self.labels[seed] != 0 {
                continue;
            }
            let label = next_label;
            next_label += 1;
            self.labels[seed] = label;
            self.queue.clear();
            self.queue.push(seed);
            let mut size = 0usize;
            while let Some(idx) = self.queue.pop() {
                size += 1;
                let (x, y) = ((idx % mw) as i32, (idx / mw) as i32);
                for (ox, oy) in NEIGHBORS {
                    let (nx, ny) = (x + ox, y + oy);
                    if nx < 0 || ny < 0 || nx as usize >= mw || ny as usize >= mh {
                        continue;
                    }
                    let n = ny as usize * mw + nx as usize;
                    if self.labels[n] == 0 && self.low_res[n] > 0.5 {
                        self.labels[n] = label;
                        self.queue.push(n);
                    }
                }
            }
            if best.map_or(true, |(_, _, s)| size > s) {
                best = Some((label, seed, size));
            }
        }
        best.map(|(label, seed, _)| (label, seed))
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Grid cells of an `n`-cell axis whose centers fall inside `[lo, hi]`
/// (given as fractions of the axis).
fn cell_range(lo: f64, hi: f64, n: usize) -> Range<usize> {
    if !(lo.is_finite() && hi.is_finite()) {
        return 0..0;
    }
    let nf = n as f64;
    let start = (lo * nf - 0.5).ceil().max(0.0);
    let end = ((hi * nf - 0.5).floor() + 1.0).min(nf);
    if end <= start {
        return 0..0;
    }
    start as usize..end as usize
}

/// Bilinear sample with clamp-to-edge at continuous cell coordinates.
fn bilinear(grid: &[f32], w: usize, h: usize, fx: f64, fy: f64) -> f32 {
    let fx = fx.clamp(0.0, (w - 1) as f64);
    let fy = fy.clamp(0.0, (h - 1) as f64);
    let (x0, y0) = (fx.floor() as usize, fy.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (tx, ty) = ((fx - x0 as f64) as f32, (fy - y0 as f64) as f32);
    let top = grid[y0 * w + x0] * (1.0 - tx) + grid[y0 * w + x1] * tx;
    let bottom = grid[y1 * w + x0] * (1.0 - tx) + grid[y1 * w + x1] * tx;
    top * (1.0 - ty) + bottom * ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{ProtoLayout, Task};
    use crate::transform::FrameContext;

    /// One prototype channel that is +10 everywhere: any positive
    /// coefficient saturates the whole crop.
    fn flat_protos(h: usize, w: usize) -> (ProtoSpec, Vec<f32>) {
        let spec = ProtoSpec {
            height: h,
            width: w,
            channels: 1,
            layout: ProtoLayout::ChannelLast,
        };
        (spec, vec![10.0; h * w])
    }

    fn mapper(w: u32, h: u32, rotate: bool, mirror: bool) -> CoordinateMapper {
        let ctx = FrameContext::new(Task::Segment, w, h, 640, 640)
            .unwrap()
            .rotated_for_camera(rotate)
            .mirrored(mirror);
        CoordinateMapper::new(&ctx)
    }

    #[test]
    fn test_mask_matches_destination_size() {
        let (spec, protos) = flat_protos(8, 8);
        let m = mapper(320, 240, false, false);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.25, 0.25, 0.75, 0.75);
        let dest = m.map_box(&b);
        let mut r = MaskReconstructor::new(MaskMode::Binary);
        let inst = r.reconstruct(&[1.0], &protos, &spec, &b, &dest, &m).unwrap();
        assert_eq!((inst.mask.width(), inst.mask.height()), (320, 240));
        assert_eq!(inst.mask.get(160, 120), 255);
        assert_eq!(inst.mask.get(10, 10), 0);
        assert_eq!(inst.mask.get(300, 120), 0);
    }

    #[test]
    fn test_outline_is_the_crop_rectangle() {
        let (spec, protos) = flat_protos(8, 8);
        let m = mapper(80, 80, false, false);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.25, 0.25, 0.75, 0.75);
        let dest = m.map_box(&b);
        let mut r = MaskReconstructor::new(MaskMode::Binary);
        let inst = r.reconstruct(&[1.0], &protos, &spec, &b, &dest, &m).unwrap();
        // Cells 2..=5 on each axis: four corner cell centers remain.
        assert_eq!(inst.outline.len(), 4);
        let bb = inst.outline.bounding_box().unwrap();
        assert!((bb.xmin() - 2.5 / 8.0).abs() < 1e-9);
        assert!((bb.xmax() - 5.5 / 8.0).abs() < 1e-9);
        assert_eq!(inst.outline_pixel.len(), 4);
    }

    #[test]
    fn test_negative_coefficients_give_no_mask() {
        let (spec, protos) = flat_protos(8, 8);
        let m = mapper(64, 64, false, false);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.25, 0.25, 0.75, 0.75);
        let dest = m.map_box(&b);
        let mut r = MaskReconstructor::new(MaskMode::Binary);
        assert!(r
            .reconstruct(&[-1.0], &protos, &spec, &b, &dest, &m)
            .is_none());
        assert!(r
            .reconstruct(&[f32::NAN], &protos, &spec, &b, &dest, &m)
            .is_none());
        assert!(r
            .reconstruct(&[1.0, 1.0], &protos, &spec, &b, &dest, &m)
            .is_none());
    }

    #[test]
    fn test_rotated_mask_follows_box() {
        let (spec, protos) = flat_protos(16, 16);
        let m = mapper(48, 64, true, true);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.0, 0.0, 0.5, 0.25);
        let dest = m.map_box(&b);
        let mut r = MaskReconstructor::new(MaskMode::Binary);
        let inst = r.reconstruct(&[1.0], &protos, &spec, &b, &dest, &m).unwrap();
        let px = dest.pixel;
        for y in 0..64u32 {
            for x in 0..48u32 {
                if inst.mask.get(x, y) > 0 {
                    let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
                    assert!(cx >= px.xmin() && cx <= px.xmax());
                    assert!(cy >= px.ymin() && cy <= px.ymax());
                }
            }
        }
        assert!(inst.mask.area() > 0);
    }

    #[test]
    fn test_soft_mode_keeps_probability() {
        let spec = ProtoSpec {
            height: 4,
            width: 4,
            channels: 1,
            layout: ProtoLayout::ChannelFirst,
        };
        let protos = vec![1.0; 16];
        let m = mapper(4, 4, false, false);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.0, 0.0, 1.0, 1.0);
        let dest = m.map_box(&b);
        let mut r = MaskReconstructor::new(MaskMode::Soft);
        let inst = r.reconstruct(&[2.0], &protos, &spec, &b, &dest, &m).unwrap();
        // sigmoid(2) * 255 = 224.6
        assert_eq!(inst.mask.get(1, 1), 225);
    }

    #[test]
    fn test_largest_region_wins() {
        let mut r = MaskReconstructor::new(MaskMode::Binary);
        // 6x3 map: one isolated cell and a 2x3 block.
        r.low_res = vec![
            0.9, 0.0, 0.0, 0.9, 0.9, 0.0, //
            0.0, 0.0, 0.0, 0.9, 0.9, 0.0, //
            0.0, 0.0, 0.0, 0.9, 0.9, 0.0, //
        ];
        let pts = r.trace_outline(6, 3);
        assert_eq!(pts.len(), 4);
        let bb = BBoxXYXY::enclosing(&pts).unwrap();
        assert!((bb.xmin() - 3.5 / 6.0).abs() < 1e-9);
        assert!((bb.ymax() - 2.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_and_run_lengths() {
        let mut a = Mask::new(4, 1);
        let mut b = Mask::new(4, 1);
        a.data = vec![255, 0, 0, 0];
        b.data = vec![0, 0, 200, 255];
        let u = Mask::union([&a, &b]).unwrap();
        assert_eq!(u.data(), &[255, 0, 200, 255]);
        assert_eq!(u.run_lengths(), vec![0, 1, 1, 2]);
        assert_eq!(u.area(), 3);
        assert!(Mask::union([&a, &Mask::new(2, 2)]).is_none());
        assert!(Mask::union(std::iter::empty::<&Mask>()).is_none());
    }

    #[test]
    fn test_cell_range() {
        assert_eq!(cell_range(0.25, 0.75, 8), 2..6);
        assert_eq!(cell_range(0.0, 1.0, 8), 0..8);
        assert!(cell_range(0.5, 0.51, 8).is_empty());
        assert!(cell_range(f64::NAN, 0.5, 8).is_empty());
    }
}
