//! Bounding box types in canonical XYXY format.

use serde::{Deserialize, Serialize};

use super::coord::Coord;
use super::space::{Normalized, Pixel};

/// An axis-aligned bounding box in XYXY format (xmin, ymin, xmax, ymax).
///
/// The `TSpace` parameter is one of [`Model`](super::Model),
/// [`Normalized`](super::Normalized) or [`Pixel`](super::Pixel).
///
/// The constructor does not enforce `min <= max`; the decoder rejects
/// degenerate boxes and the mapper re-orders corners after rotation, so a
/// malformed box is a bug that result validation reports.
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    /// Creates a new bounding box from min and max coordinates.
    #[inline]
    pub fn new(min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self { min, max }
    }

    /// Creates a new bounding box from explicit coordinates.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Coord::new(xmin, ymin),
            max: Coord::new(xmax, ymax),
        }
    }

    /// Converts from center form (cx, cy, width, height), the layout YOLO
    /// heads emit.
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self::from_xyxy(cx - hw, cy - hh, cx + hw, cy + hh)
    }

    /// Smallest box enclosing every point, or `None` for an empty slice.
    pub fn enclosing(points: &[Coord<TSpace>]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Self::new(*first, *first);
        for p in &points[1..] {
            b.min.x = b.min.x.min(p.x);
            b.min.y = b.min.y.min(p.y);
            b.max.x = b.max.x.max(p.x);
            b.max.y = b.max.y.max(p.y);
        }
        Some(b)
    }

    /// Returns the minimum x coordinate.
    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    /// Returns the minimum y coordinate.
    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    /// Returns the maximum x coordinate.
    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    /// Returns the maximum y coordinate.
    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    /// Returns the width of the bounding box.
    ///
    /// May be negative if the box is malformed (xmax < xmin).
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Returns the height of the bounding box.
    ///
    /// May be negative if the box is malformed (ymax < ymin).
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Returns the area of the bounding box.
    ///
    /// May be negative if the box is malformed.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point.
    #[inline]
    pub fn center(&self) -> Coord<TSpace> {
        Coord::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// The four corners, clockwise from top-left.
    #[inline]
    pub fn corners(&self) -> [Coord<TSpace>; 4] {
        [
            self.min,
            Coord::new(self.max.x, self.min.y),
            self.max,
            Coord::new(self.min.x, self.max.y),
        ]
    }

    /// Returns true if all coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Returns true if the box is properly ordered (min <= max for both axes).
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Clamps both corners into `[0, 1]`.
    #[inline]
    pub fn clamp_unit(&self) -> Self {
        Self::new(self.min.clamp_unit(), self.max.clamp_unit())
    }

    /// Area of the overlap with `other`, zero when disjoint.
    #[inline]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let w = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let h = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection over union. Returns 0 when the union is empty.
    pub fn iou(&self, other: &Self) -> f64 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

impl<TSpace> Clone for BBoxXYXY<TSpace> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<TSpace> Copy for BBoxXYXY<TSpace> {}

impl<TSpace> PartialEq for BBoxXYXY<TSpace> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min && self.max == other.max
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.min.x)
            .field("ymin", &self.min.y)
            .field("xmax", &self.max.x)
            .field("ymax", &self.max.y)
            .finish()
    }
}

impl<TSpace> Default for BBoxXYXY<TSpace> {
    fn default() -> Self {
        Self::from_xyxy(0.0, 0.0, 0.0, 0.0)
    }
}

// Custom serde implementation to avoid TSpace: Serialize/Deserialize bounds
impl<TSpace> Serialize for BBoxXYXY<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBoxXYXY", 4)?;
        state.serialize_field("xmin", &self.min.x)?;
        state.serialize_field("ymin", &self.min.y)?;
        state.serialize_field("xmax", &self.max.x)?;
        state.serialize_field("ymax", &self.max.y)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for BBoxXYXY<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BBoxData {
            xmin: f64,
            ymin: f64,
            xmax: f64,
            ymax: f64,
        }
        let data = BBoxData::deserialize(deserializer)?;
        Ok(BBoxXYXY::from_xyxy(
            data.xmin, data.ymin, data.xmax, data.ymax,
        ))
    }
}

impl BBoxXYXY<Pixel> {
    /// Converts pixel coordinates to normalized coordinates.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::new(
            self.min.to_normalized(image_width, image_height),
            self.max.to_normalized(image_width, image_height),
        )
    }
}

impl BBoxXYXY<Normalized> {
    /// Converts normalized coordinates to pixel coordinates.
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Pixel> {
        BBoxXYXY::new(
            self.min.to_pixel(image_width, image_height),
            self.max.to_pixel(image_width, image_height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Model;

    #[test]
    fn test_bbox_from_cxcywh() {
        let bbox: BBoxXYXY<Model> = BBoxXYXY::from_cxcywh(0.5, 0.5, 0.2, 0.4);
        assert!((bbox.xmin() - 0.4).abs() < 1e-12);
        assert!((bbox.ymin() - 0.3).abs() < 1e-12);
        assert!((bbox.xmax() - 0.6).abs() < 1e-12);
        assert!((bbox.ymax() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_bbox_dimensions() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.0, 20.0, 100.0, 80.0);
        assert_eq!(bbox.width(), 90.0);
        assert_eq!(bbox.height(), 60.0);
        assert_eq!(bbox.area(), 5400.0);
        assert!(bbox.is_ordered());

        let unordered: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(100.0, 80.0, 10.0, 20.0);
        assert!(!unordered.is_ordered());
    }

    #[test]
    fn test_bbox_iou() {
        let a: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.0, 0.0, 2.0, 2.0);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(1.0, 1.0, 3.0, 3.0);
        assert_eq!(a.intersection_area(&b), 1.0);
        assert!((a.iou(&b) - 1.0 / 7.0).abs() < 1e-12);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_bbox_iou_disjoint_and_empty() {
        let a: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(0.0, 0.0, 1.0, 1.0);
        let b: BBoxXYXY<Model> = BBoxXYXY::from_xyxy(2.0, 2.0, 3.0, 3.0);
        assert_eq!(a.iou(&b), 0.0);

        let empty: BBoxXYXY<Model> = BBoxXYXY::default();
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_bbox_enclosing() {
        let pts: [Coord<Model>; 3] = [
            Coord::new(0.3, 0.1),
            Coord::new(0.1, 0.5),
            Coord::new(0.2, 0.2),
        ];
        let b = BBoxXYXY::enclosing(&pts).unwrap();
        assert_eq!(b, BBoxXYXY::from_xyxy(0.1, 0.1, 0.3, 0.5));
        assert!(BBoxXYXY::<Model>::enclosing(&[]).is_none());
    }

    #[test]
    fn test_bbox_pixel_roundtrip() {
        let n: BBoxXYXY<Normalized> = BBoxXYXY::from_xyxy(0.25, 0.5, 0.75, 1.0);
        let p = n.to_pixel(400.0, 200.0);
        assert_eq!(p, BBoxXYXY::from_xyxy(100.0, 100.0, 300.0, 200.0));
        assert_eq!(p.to_normalized(400.0, 200.0), n);
    }
}
