//! Oriented (rotated) bounding boxes.

use serde::Serialize;

use super::coord::Coord;

/// A rotated rectangle: center, size and angle in radians.
///
/// Units are whatever pixel grid the box lives on. The angle turns the
/// width axis from +x towards +y, so on an image (y down) a positive angle
/// is a clockwise rotation on screen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OrientedBox {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl OrientedBox {
    pub fn new(cx: f64, cy: f64, width: f64, height: f64, angle: f64) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
            angle,
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite()
            && self.cy.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.angle.is_finite()
    }

    /// The four vertices, starting at the rotated top-left corner and
    /// following the width edge first.
    pub fn vertices<TSpace>(&self) -> [Coord<TSpace>; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let local = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        local.map(|(lx, ly)| {
            Coord::new(
                self.cx + lx * cos - ly * sin,
                self.cy + lx * sin + ly * cos,
            )
        })
    }

    /// Rebuilds a box from a rectangle ring produced by [`Self::vertices`]
    /// (possibly after a rigid or mirrored mapping).
    ///
    /// Width is the length of the first edge, height the second, and the
    /// angle is the direction of the first edge.
    pub fn from_vertices<TSpace>(v: &[Coord<TSpace>; 4]) -> Self {
        let cx = (v[0].x + v[1].x + v[2].x + v[3].x) / 4.0;
        let cy = (v[0].y + v[1].y + v[2].y + v[3].y) / 4.0;
        let (ex, ey) = (v[1].x - v[0].x, v[1].y - v[0].y);
        let (fx, fy) = (v[2].x - v[1].x, v[2].y - v[1].y);
        Self {
            cx,
            cy,
            width: ex.hypot(ey),
            height: fx.hypot(fy),
            angle: ey.atan2(ex),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Pixel;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_axis_aligned_vertices() {
        let b = OrientedBox::new(10.0, 20.0, 4.0, 2.0, 0.0);
        let v: [Coord<Pixel>; 4] = b.vertices();
        assert_eq!(v[0], Coord::new(8.0, 19.0));
        assert_eq!(v[1], Coord::new(12.0, 19.0));
        assert_eq!(v[2], Coord::new(12.0, 21.0));
        assert_eq!(v[3], Coord::new(8.0, 21.0));
        assert_eq!(b.area(), 8.0);
    }

    #[test]
    fn test_quarter_turn_swaps_extent() {
        let b = OrientedBox::new(0.0, 0.0, 4.0, 2.0, FRAC_PI_2);
        let v: [Coord<Pixel>; 4] = b.vertices();
        let xs: Vec<f64> = v.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = v.iter().map(|p| p.y).collect();
        let span = |vals: &[f64]| {
            vals.iter().cloned().fold(f64::MIN, f64::max)
                - vals.iter().cloned().fold(f64::MAX, f64::min)
        };
        assert!((span(&xs) - 2.0).abs() < 1e-9);
        assert!((span(&ys) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_vertices_roundtrip() {
        let b = OrientedBox::new(5.0, -3.0, 7.0, 2.5, 0.4);
        let v: [Coord<Pixel>; 4] = b.vertices();
        let r = OrientedBox::from_vertices(&v);
        assert!((r.cx - b.cx).abs() < 1e-9);
        assert!((r.cy - b.cy).abs() < 1e-9);
        assert!((r.width - b.width).abs() < 1e-9);
        assert!((r.height - b.height).abs() < 1e-9);
        assert!((r.angle - b.angle).abs() < 1e-9);
    }
}
