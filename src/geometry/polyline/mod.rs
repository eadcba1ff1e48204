//! Polylines parameterized by normalized curve length.
//!
//! [`RoundedPolyline`] rounds every interior vertex of a planar polyline
//! with a fixed radius. [`Polyline`] keeps the sharp corners and works in
//! any dimension.

mod rounded;
mod straight;

pub use rounded::{Fillet, RoundedPolyline, DEFAULT_RADIUS};
pub use straight::{Polyline, Polyline2, Polyline3};

use nalgebra::{Point, SVector};

/// A position on a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylinePoint<const D: usize> {
    pub point: Point<f64, D>,
    /// Unit tangent of the curve at `point`.
    pub direction: SVector<f64, D>,
    /// Index of the straight segment `point` is placed on.
    pub segment: usize,
}

/// Index `i >= 1` of the first break with `breaks[i] >= eta`.
///
/// Values beyond the last break map to the last interval and negative
/// values to the first. `breaks` must hold at least two values.
fn locate(breaks: &[f64], eta: f64) -> usize {
    if eta < 0.0 {
        return 1;
    }
    breaks
        .iter()
        .skip(1)
        .position(|&b| b >= eta)
        .map_or(breaks.len() - 1, |i| i + 1)
}
