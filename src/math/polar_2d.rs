//! Polar coordinate helpers for planar arcs.
//!
//! Angles are measured counter-clockwise from the +x axis and normalized
//! to `[0, 2π)`.
use std::f64::consts::TAU;

use super::Vector2;

/// Converts a planar vector to polar form, returning `(phi, r)`.
///
/// `phi` lies in `[0, 2π)`. The zero vector maps to `(0, 0)`.
#[must_use]
pub fn cart_to_polar(v: &Vector2) -> (f64, f64) {
    let r = v.norm();
    let phi = v.y.atan2(v.x).rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative angles
    let phi = if phi >= TAU { 0.0 } else { phi };
    (phi, r)
}

/// Converts polar coordinates back to a planar vector.
#[must_use]
pub fn polar_to_cart(phi: f64, r: f64) -> Vector2 {
    Vector2::new(r * phi.cos(), r * phi.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn quadrants_map_into_positive_range() {
        let cases = [
            (Vector2::new(1.0, 0.0), 0.0),
            (Vector2::new(0.0, 1.0), FRAC_PI_2),
            (Vector2::new(-1.0, 0.0), PI),
            (Vector2::new(0.0, -1.0), 1.5 * PI),
            (Vector2::new(1.0, -1.0), 1.75 * PI),
        ];
        for (v, expected) in cases {
            let (phi, r) = cart_to_polar(&v);
            assert_abs_diff_eq!(phi, expected, epsilon = 1e-12);
            assert_abs_diff_eq!(r, v.norm(), epsilon = 1e-12);
        }
    }

    #[test]
    fn polar_and_back() {
        let v = Vector2::new(-0.3, 0.7);
        let (phi, r) = cart_to_polar(&v);
        assert_abs_diff_eq!(polar_to_cart(phi, r), v, epsilon = 1e-12);
    }
}
