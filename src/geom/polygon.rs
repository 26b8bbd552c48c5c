//! Polygons: mask outlines, OBB vertex rings and convex clipping.

use serde::Serialize;

use super::bbox::BBoxXYXY;
use super::coord::Coord;
use super::space::{Normalized, Pixel};

/// An ordered ring of points. The closing edge from the last point back to
/// the first is implicit.
pub struct Polygon<TSpace> {
    pub points: Vec<Coord<TSpace>>,
}

impl<TSpace> Polygon<TSpace> {
    pub fn new(points: Vec<Coord<TSpace>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shoelace area, positive for counter-clockwise rings in a y-up frame.
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Axis-aligned bounding rectangle of the ring.
    pub fn bounding_box(&self) -> Option<BBoxXYXY<TSpace>> {
        BBoxXYXY::enclosing(&self.points)
    }
}

impl Polygon<Normalized> {
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> Polygon<Pixel> {
        Polygon::new(
            self.points
                .iter()
                .map(|p| p.to_pixel(image_width, image_height))
                .collect(),
        )
    }
}

impl<TSpace> Clone for Polygon<TSpace> {
    fn clone(&self) -> Self {
        Self::new(self.points.clone())
    }
}

impl<TSpace> PartialEq for Polygon<TSpace> {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl<TSpace> std::fmt::Debug for Polygon<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.points.iter()).finish()
    }
}

impl<TSpace> Serialize for Polygon<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.points.serialize(serializer)
    }
}

fn signed_area<TSpace>(points: &[Coord<TSpace>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    acc / 2.0
}

#[inline]
fn side<TSpace>(a: Coord<TSpace>, b: Coord<TSpace>, p: Coord<TSpace>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Sutherland-Hodgman clipper that keeps its two working rings between
/// calls, so clipping many pairs reuses the same allocations.
pub struct ConvexClipper<TSpace> {
    subject: Vec<Coord<TSpace>>,
    scratch: Vec<Coord<TSpace>>,
}

impl<TSpace> ConvexClipper<TSpace> {
    pub fn new() -> Self {
        Self {
            subject: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Area shared by two convex polygons.
    ///
    /// Both rings may have either winding. Degenerate rings yield 0.
    pub fn intersection_area(&mut self, a: &[Coord<TSpace>], b: &[Coord<TSpace>]) -> f64 {
        if a.len() < 3 || b.len() < 3 {
            return 0.0;
        }
        let orient = signed_area(b);
        if orient == 0.0 {
            return 0.0;
        }
        let orient = orient.signum();

        self.subject.clear();
        self.subject.extend_from_slice(a);
        for i in 0..b.len() {
            if self.subject.is_empty() {
                break;
            }
            let ca = b[i];
            let cb = b[(i + 1) % b.len()];
            std::mem::swap(&mut self.subject, &mut self.scratch);
            self.subject.clear();
            let input = &self.scratch;
            for j in 0..input.len() {
                let p = input[j];
                let q = input[(j + 1) % input.len()];
                let dp = side(ca, cb, p) * orient;
                let dq = side(ca, cb, q) * orient;
                if dp >= 0.0 {
                    self.subject.push(p);
                    if dq < 0.0 {
                        self.subject.push(lerp(p, q, dp / (dp - dq)));
                    }
                } else if dq >= 0.0 {
                    self.subject.push(lerp(p, q, dp / (dp - dq)));
                }
            }
        }
        signed_area(&self.subject).abs()
    }

    /// Intersection over union of two convex polygons.
    pub fn iou(&mut self, a: &[Coord<TSpace>], b: &[Coord<TSpace>]) -> f64 {
        let inter = self.intersection_area(a, b);
        let union = signed_area(a).abs() + signed_area(b).abs() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Capacity of the working rings, for checking reuse.
    pub fn capacity(&self) -> usize {
        self.subject.capacity() + self.scratch.capacity()
    }
}

impl<TSpace> Default for ConvexClipper<TSpace> {
    fn default() -> Self {
        Self::new()
    }
}

impl<TSpace> std::fmt::Debug for ConvexClipper<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvexClipper")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// One-off [`ConvexClipper::intersection_area`].
pub fn convex_intersection_area<TSpace>(a: &[Coord<TSpace>], b: &[Coord<TSpace>]) -> f64 {
    ConvexClipper::new().intersection_area(a, b)
}

/// One-off [`ConvexClipper::iou`].
pub fn convex_iou<TSpace>(a: &[Coord<TSpace>], b: &[Coord<TSpace>]) -> f64 {
    ConvexClipper::new().iou(a, b)
}

#[inline]
fn lerp<TSpace>(p: Coord<TSpace>, q: Coord<TSpace>, t: f64) -> Coord<TSpace> {
    Coord::new(p.x + (q.x - p.x) * t, p.y + (q.y - p.y) * t)
}
