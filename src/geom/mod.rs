//! Geometry primitives shared by every pipeline stage.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: marker types keep model-input, normalized and pixel
//!    coordinates apart at compile time. A model-space box cannot be drawn
//!    on the destination image without passing through the mapper.
//!
//! 2. **Canonical Format**: boxes are XYXY everywhere; YOLO's center form is
//!    converted once, in the decoder.
//!
//! # Example
//!
//! ```
//! use yolopost::geom::{BBoxXYXY, Model};
//!
//! let a = BBoxXYXY::<Model>::from_cxcywh(0.5, 0.5, 0.2, 0.2);
//! let b = BBoxXYXY::<Model>::from_xyxy(0.4, 0.4, 0.6, 0.6);
//! assert!(a.iou(&b) > 0.99);
//! ```

mod bbox;
mod coord;
mod obb;
mod polygon;
mod space;

pub use bbox::BBoxXYXY;
pub use coord::Coord;
pub use obb::OrientedBox;
pub use polygon::{convex_intersection_area, convex_iou, ConvexClipper, Polygon};
pub use space::{Model, Normalized, Pixel};
