//! Typed coordinate values using PhantomData for compile-time safety.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::space::{Normalized, Pixel};

/// A 2D coordinate with a type-level marker for the coordinate space.
///
/// The `TSpace` parameter is one of [`Model`](super::Model),
/// [`Normalized`](super::Normalized) or [`Pixel`](super::Pixel), so that
/// points from different spaces cannot be mixed by accident.
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    /// Creates a new coordinate with the given x and y values.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamps both components into `[0, 1]`.
    #[inline]
    pub fn clamp_unit(&self) -> Self {
        Self::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

impl Coord<Normalized> {
    /// Scales to destination pixels.
    #[inline]
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> Coord<Pixel> {
        Coord::new(self.x * image_width, self.y * image_height)
    }
}

impl Coord<Pixel> {
    /// Divides by the destination dimensions.
    #[inline]
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> Coord<Normalized> {
        Coord::new(self.x / image_width, self.y / image_height)
    }
}

// Manual impls so generic code over any space gets them without bounds on
// the marker type.
impl<TSpace> Clone for Coord<TSpace> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<TSpace> Copy for Coord<TSpace> {}

impl<TSpace> PartialEq for Coord<TSpace> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<TSpace> std::fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coord")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

// Custom serde implementation to avoid TSpace: Serialize/Deserialize bounds
impl<TSpace> Serialize for Coord<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Coord", 2)?;
        state.serialize_field("x", &self.x)?;
        state.serialize_field("y", &self.y)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for Coord<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct CoordData {
            x: f64,
            y: f64,
        }
        let data = CoordData::deserialize(deserializer)?;
        Ok(Coord::new(data.x, data.y))
    }
}
