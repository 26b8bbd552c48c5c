//! Coordinate space marker types.
//!
//! These are zero-sized types (ZSTs) used as type parameters to distinguish
//! between the three coordinate systems the pipeline moves geometry through.

use std::fmt;

/// Marker type for model-input space.
///
/// Values are fractions of the model's input width and height (each axis
/// independently), before any rotation, mirroring or rescale to the
/// destination image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {}

/// Marker type for normalized destination coordinates (0.0 to 1.0).
///
/// Normalized coordinates represent positions as fractions of the
/// destination image dimensions, after rotation and mirroring.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

/// Marker type for destination pixel coordinates (absolute values).
///
/// (0, 0) is the top-left corner of the destination image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

impl fmt::Debug for Model {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
