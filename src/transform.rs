//! Model-input space → destination image space.
//!
//! Every geometric output (box corners, mask outlines, keypoints, OBB
//! vertices) goes through the same [`FrameTransform`], so all of them agree
//! under camera rotation and mirroring. The mask reconstructor samples with
//! the inverse of the same transform.
//!
//! Rotation is applied in normalized space first, then mirroring, then the
//! result is scaled to the destination size:
//!
//! | rotation | (x, y) →     |
//! |----------|--------------|
//! | none     | (x, y)       |
//! | 90°      | (y, 1 − x)   |
//! | 270°     | (1 − y, x)   |
//!
//! Mirroring maps x to 1 − x.

use serde::{Deserialize, Serialize};

use crate::error::YoloError;
use crate::geom::{BBoxXYXY, Coord, Model, Normalized, OrientedBox, Pixel, Polygon};
use crate::tensor::Task;

/// Quarter-turn applied to model output before it lands on the destination
/// image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "270")]
    Deg270,
}

impl Rotation {
    /// Returns the angle in degrees: 0, 90 or 270.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg270 => 270,
        }
    }

    /// Parses an angle in degrees, taken modulo 360.
    ///
    /// Only quarter turns of 0, 90 and 270 are supported; anything else is
    /// a [`YoloError::InvalidFrame`].
    pub fn from_degrees(degrees: u32) -> Result<Self, YoloError> {
        match degrees % 360 {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Deg90),
            270 => Ok(Rotation::Deg270),
            other => Err(YoloError::InvalidFrame(format!(
                "unsupported rotation {}° (expected 0, 90 or 270)",
                other
            ))),
        }
    }
}

/// Per-call description of where results are going.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrameContext {
    task: Task,
    width: u32,
    height: u32,
    model_input_width: u32,
    model_input_height: u32,
    rotate_for_camera: bool,
    camera_rotation: Rotation,
    mirror_horizontal: bool,
}

impl FrameContext {
    /// `width`/`height` are the destination image dimensions. Zero
    /// dimensions are rejected.
    pub fn new(
        task: Task,
        width: u32,
        height: u32,
        model_input_width: u32,
        model_input_height: u32,
    ) -> Result<Self, YoloError> {
        if width == 0 || height == 0 {
            return Err(YoloError::InvalidFrame(format!(
                "destination size {}x{} must be non-zero",
                width, height
            )));
        }
        if model_input_width == 0 || model_input_height == 0 {
            return Err(YoloError::InvalidFrame(format!(
                "model input size {}x{} must be non-zero",
                model_input_width, model_input_height
            )));
        }
        Ok(Self {
            task,
            width,
            height,
            model_input_width,
            model_input_height,
            rotate_for_camera: false,
            camera_rotation: Rotation::Deg90,
            mirror_horizontal: false,
        })
    }

    /// Rotates results for a camera sensor mounted at 90° (the usual case).
    pub fn rotated_for_camera(mut self, rotate: bool) -> Self {
        self.rotate_for_camera = rotate;
        self
    }

    /// Direction used when rotating for the camera. [`Rotation::None`]
    /// leaves results unrotated even when `rotate_for_camera` is set.
    pub fn with_camera_rotation(mut self, rotation: Rotation) -> Self {
        self.camera_rotation = rotation;
        self
    }

    /// Mirrors results horizontally (x → 1 − x) after any rotation, as for
    /// a front-facing camera.
    pub fn mirrored(mut self, mirror: bool) -> Self {
        self.mirror_horizontal = mirror;
        self
    }

    /// Returns the task the frame is meant for.
    pub fn task(&self) -> Task {
        self.task
    }

    /// Returns the destination image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the destination image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the model input width in pixels.
    pub fn model_input_width(&self) -> u32 {
        self.model_input_width
    }

    /// Returns the model input height in pixels.
    pub fn model_input_height(&self) -> u32 {
        self.model_input_height
    }

    /// Returns whether camera rotation was requested.
    ///
    /// See [`FrameContext::rotation`] for the rotation actually applied.
    pub fn rotate_for_camera(&self) -> bool {
        self.rotate_for_camera
    }

    /// Returns whether results are mirrored horizontally.
    pub fn mirror_horizontal(&self) -> bool {
        self.mirror_horizontal
    }

    /// The rotation actually in effect.
    pub fn rotation(&self) -> Rotation {
        if self.rotate_for_camera {
            self.camera_rotation
        } else {
            Rotation::None
        }
    }

    /// Returns the rotation and mirror in effect as one transform.
    pub fn transform(&self) -> FrameTransform {
        FrameTransform::new(self.rotation(), self.mirror_horizontal)
    }
}

/// Rotation then optional mirror, in normalized space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameTransform {
    pub rotation: Rotation,
    pub mirror: bool,
}

impl FrameTransform {
    pub const IDENTITY: FrameTransform = FrameTransform {
        rotation: Rotation::None,
        mirror: false,
    };

    /// Creates a transform that rotates, then mirrors if `mirror` is set.
    pub fn new(rotation: Rotation, mirror: bool) -> Self {
        Self { rotation, mirror }
    }

    /// The same transform followed by one more horizontal mirror. Mirroring
    /// twice gives back an equal transform.
    pub fn then_mirror(self) -> Self {
        Self {
            rotation: self.rotation,
            mirror: !self.mirror,
        }
    }

    /// Model-input space → destination normalized space. No clamping.
    #[inline]
    pub fn apply(&self, p: Coord<Model>) -> Coord<Normalized> {
        let (x, y) = match self.rotation {
            Rotation::None => (p.x, p.y),
            Rotation::Deg90 => (p.y, 1.0 - p.x),
            Rotation::Deg270 => (1.0 - p.y, p.x),
        };
        let x = if self.mirror { 1.0 - x } else { x };
        Coord::new(x, y)
    }

    /// Destination normalized space → model-input space.
    #[inline]
    pub fn invert(&self, p: Coord<Normalized>) -> Coord<Model> {
        let u = if self.mirror { 1.0 - p.x } else { p.x };
        let v = p.y;
        let (x, y) = match self.rotation {
            Rotation::None => (u, v),
            Rotation::Deg90 => (1.0 - v, u),
            Rotation::Deg270 => (v, 1.0 - u),
        };
        Coord::new(x, y)
    }
}

/// A box in both destination representations.
///
/// Both rectangles are ordered (`right >= left`, `bottom >= top`) and the
/// normalized one lies in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub normalized: BBoxXYXY<Normalized>,
    pub pixel: BBoxXYXY<Pixel>,
}

impl BoundingBox {
    /// Creates the pair from a normalized box, scaling it to a
    /// `width` x `height` image for the pixel form.
    pub fn from_normalized(normalized: BBoxXYXY<Normalized>, width: f64, height: f64) -> Self {
        Self {
            normalized,
            pixel: normalized.to_pixel(width, height),
        }
    }
}

/// Maps model-space geometry for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    transform: FrameTransform,
    dest_width: f64,
    dest_height: f64,
    input_width: f64,
    input_height: f64,
}

impl CoordinateMapper {
    /// Creates a mapper for the transform and sizes in `ctx`.
    pub fn new(ctx: &FrameContext) -> Self {
        Self {
            transform: ctx.transform(),
            dest_width: f64::from(ctx.width()),
            dest_height: f64::from(ctx.height()),
            input_width: f64::from(ctx.model_input_width()),
            input_height: f64::from(ctx.model_input_height()),
        }
    }

    /// Returns the transform shared by every mapped output.
    pub fn transform(&self) -> FrameTransform {
        self.transform
    }

    /// Returns the destination `(width, height)` in pixels.
    pub fn dest_size(&self) -> (f64, f64) {
        (self.dest_width, self.dest_height)
    }

    /// Maps and clamps one point.
    #[inline]
    pub fn map_point(&self, p: Coord<Model>) -> (Coord<Normalized>, Coord<Pixel>) {
        let n = self.transform.apply(p).clamp_unit();
        (n, n.to_pixel(self.dest_width, self.dest_height))
    }

    /// Maps all four corners and takes their extent, so the result stays
    /// ordered whatever the rotation and mirroring.
    pub fn map_box(&self, b: &BBoxXYXY<Model>) -> BoundingBox {
        let corners = b.corners().map(|c| self.transform.apply(c));
        let normalized = BBoxXYXY::enclosing(&corners)
            .unwrap_or_default()
            .clamp_unit();
        BoundingBox::from_normalized(normalized, self.dest_width, self.dest_height)
    }

    /// Maps and clamps each point of a ring, keeping its order.
    pub fn map_polygon(&self, points: &[Coord<Model>]) -> (Polygon<Normalized>, Polygon<Pixel>) {
        let normalized: Vec<Coord<Normalized>> = points
            .iter()
            .map(|p| self.transform.apply(*p).clamp_unit())
            .collect();
        let normalized = Polygon::new(normalized);
        let pixel = normalized.to_pixel(self.dest_width, self.dest_height);
        (normalized, pixel)
    }

    /// Maps a rotated box given in model input pixels.
    ///
    /// Returns the box re-derived in destination pixels from its mapped
    /// vertices, the clamped vertex ring, and its clamped enclosing box.
    pub fn map_oriented(&self, obb: &OrientedBox) -> MappedOrientedBox {
        let model: [Coord<Model>; 4] = obb
            .vertices::<Model>()
            .map(|v| Coord::new(v.x / self.input_width, v.y / self.input_height));
        let mapped = model.map(|v| self.transform.apply(v));
        let dest_pixels: [Coord<Pixel>; 4] =
            mapped.map(|v| v.to_pixel(self.dest_width, self.dest_height));
        let oriented = OrientedBox::from_vertices(&dest_pixels);
        let normalized = BBoxXYXY::enclosing(&mapped)
            .unwrap_or_default()
            .clamp_unit();
        let (polygon, polygon_pixel) = self.map_polygon(&model);
        MappedOrientedBox {
            oriented,
            bbox: BoundingBox::from_normalized(normalized, self.dest_width, self.dest_height),
            polygon,
            polygon_pixel,
        }
    }
}

/// Result of [`CoordinateMapper::map_oriented`].
#[derive(Clone, Debug, PartialEq)]
pub struct MappedOrientedBox {
    pub oriented: OrientedBox,
    pub bbox: BoundingBox,
    pub polygon: Polygon<Normalized>,
    pub polygon_pixel: Polygon<Pixel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(w: u32, h: u32) -> FrameContext {
        FrameContext::new(Task::Detect, w, h, 640, 640).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            FrameContext::new(Task::Detect, 0, 480, 640, 640),
            Err(YoloError::InvalidFrame(_))
        ));
        assert!(FrameContext::new(Task::Detect, 640, 480, 640, 0).is_err());
    }

    #[test]
    fn test_center_box_without_rotation() {
        let m = CoordinateMapper::new(&ctx(640, 480));
        let b = m.map_box(&BBoxXYXY::from_cxcywh(0.5, 0.5, 0.2, 0.2));
        let c = b.pixel.center();
        assert!(approx(c.x, 320.0) && approx(c.y, 240.0));
        assert!(approx(b.pixel.width(), 128.0));
        assert!(approx(b.pixel.height(), 96.0));
    }

    #[test]
    fn test_rotation_90_formula() {
        let m = CoordinateMapper::new(&ctx(480, 640).rotated_for_camera(true));
        let b = m.map_box(&BBoxXYXY::from_xyxy(0.0, 0.0, 0.1, 0.1));
        assert!(approx(b.normalized.xmin(), 0.0));
        assert!(approx(b.normalized.ymin(), 0.9));
        assert!(approx(b.normalized.xmax(), 0.1));
        assert!(approx(b.normalized.ymax(), 1.0));
        assert!(approx(b.pixel.xmin(), 0.0));
        assert!(approx(b.pixel.ymin(), 576.0));
        assert!(approx(b.pixel.xmax(), 48.0));
        assert!(approx(b.pixel.ymax(), 640.0));
    }

    #[test]
    fn test_rotation_270_formula() {
        let t = FrameTransform::new(Rotation::Deg270, false);
        let p = t.apply(Coord::new(0.25, 0.125));
        assert_eq!((p.x, p.y), (0.875, 0.25));
    }

    #[test]
    fn test_mirror_after_rotation() {
        let t = FrameTransform::new(Rotation::Deg90, true);
        let p = t.apply(Coord::new(0.25, 0.125));
        assert_eq!((p.x, p.y), (0.875, 0.75));
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        for rotation in [Rotation::None, Rotation::Deg90, Rotation::Deg270] {
            for mirror in [false, true] {
                let t = FrameTransform::new(rotation, mirror);
                assert_eq!(t.then_mirror().then_mirror(), t);
            }
        }
        assert_eq!(
            FrameTransform::IDENTITY.then_mirror().then_mirror(),
            FrameTransform::IDENTITY
        );
    }

    #[test]
    fn test_invert_undoes_apply() {
        let p: Coord<Model> = Coord::new(0.125, 0.75);
        for rotation in [Rotation::None, Rotation::Deg90, Rotation::Deg270] {
            for mirror in [false, true] {
                let t = FrameTransform::new(rotation, mirror);
                assert_eq!(t.invert(t.apply(p)), p);
            }
        }
    }

    #[test]
    fn test_mirrored_box_stays_ordered() {
        let m = CoordinateMapper::new(&ctx(100, 100).mirrored(true));
        let b = m.map_box(&BBoxXYXY::from_xyxy(0.1, 0.2, 0.3, 0.4));
        assert!(b.normalized.is_ordered());
        assert!(approx(b.normalized.xmin(), 0.7));
        assert!(approx(b.normalized.xmax(), 0.9));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let m = CoordinateMapper::new(&ctx(100, 100));
        let b = m.map_box(&BBoxXYXY::from_xyxy(-0.2, 0.9, 0.3, 1.4));
        assert_eq!(b.normalized, BBoxXYXY::from_xyxy(0.0, 0.9, 0.3, 1.0));
    }

    #[test]
    fn test_oriented_box_under_rotation() {
        // Square model input, square destination: a 90° camera rotation turns
        // the box a quarter turn and keeps its size.
        let ctx = FrameContext::new(Task::Obb, 200, 200, 100, 100)
            .unwrap()
            .rotated_for_camera(true);
        let m = CoordinateMapper::new(&ctx);
        let mapped = m.map_oriented(&OrientedBox::new(50.0, 50.0, 40.0, 20.0, 0.0));
        assert!(approx(mapped.oriented.width, 80.0));
        assert!(approx(mapped.oriented.height, 40.0));
        assert!(approx(mapped.oriented.cx, 100.0));
        assert!(approx(mapped.oriented.cy, 100.0));
        assert!(approx(mapped.oriented.angle.abs(), std::f64::consts::FRAC_PI_2));
        assert!(approx(mapped.bbox.pixel.width(), 40.0));
        assert!(approx(mapped.bbox.pixel.height(), 80.0));
        assert_eq!(mapped.polygon.len(), 4);
    }

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::from_degrees(270).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450).unwrap().degrees(), 90);
        assert!(Rotation::from_degrees(180).is_err());
    }
}
