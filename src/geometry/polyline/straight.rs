use nalgebra::{Point, SVector};

use super::{locate, PolylinePoint};
use crate::error::{GeometryError, Result};
use crate::math::TOLERANCE;

/// Segments whose direction is this close to orthogonal to a cutting
/// plane normal are treated as parallel to the plane.
const PARALLEL_GUARD: f64 = 1e-8;

/// A polyline with sharp corners, parameterized by normalized length.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline<const D: usize> {
    points: Vec<Point<f64, D>>,
    fractions: Vec<f64>,
}

pub type Polyline2 = Polyline<2>;
pub type Polyline3 = Polyline<3>;

impl<const D: usize> Polyline<D> {
    /// Creates a polyline through `points`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] for fewer than two points or a
    /// zero-length segment.
    pub fn new(points: Vec<Point<f64, D>>) -> Result<Self> {
        if points.len() < 2 {
            return Err(GeometryError::Degenerate(format!(
                "polyline needs at least 2 points, got {}",
                points.len()
            ))
            .into());
        }
        let lengths: Vec<f64> = points.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        if let Some(i) = lengths.iter().position(|&l| l < TOLERANCE) {
            return Err(
                GeometryError::Degenerate(format!("polyline segment {i} has zero length")).into(),
            );
        }

        let total: f64 = lengths.iter().sum();
        let mut fractions = Vec::with_capacity(points.len());
        fractions.push(0.0);
        let mut acc = 0.0;
        for length in &lengths {
            acc += length;
            fractions.push(acc / total);
        }
        if let Some(last) = fractions.last_mut() {
            *last = 1.0;
        }

        Ok(Self { points, fractions })
    }

    #[must_use]
    pub fn points(&self) -> &[Point<f64, D>] {
        &self.points
    }

    /// Normalized length at every vertex, from `0` to `1`.
    #[must_use]
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Evaluates the polyline at normalized length `eta`.
    ///
    /// Values outside `[0, 1]` extrapolate along the first or last segment.
    #[must_use]
    pub fn calc_point(&self, eta: f64) -> PolylinePoint<D> {
        let i = locate(&self.fractions, eta);
        let (a, b) = (self.points[i - 1], self.points[i]);
        let t = (eta - self.fractions[i - 1]) / (self.fractions[i] - self.fractions[i - 1]);
        let edge = b - a;
        PolylinePoint {
            point: a + edge * t,
            direction: edge.normalize(),
            segment: i - 1,
        }
    }

    /// Normalized length where the plane through `plane_point` with normal
    /// `plane_normal` cuts the polyline.
    ///
    /// Segments are tested in order and the first one whose local cut
    /// parameter `s` is below `1` is taken, so a plane in front of the first
    /// vertex yields an extrapolated negative value. Segments parallel to
    /// the plane are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ParallelPlane`] if every segment is parallel
    /// to the plane.
    pub fn eta_for_cutting_plane(
        &self,
        plane_point: &Point<f64, D>,
        plane_normal: &SVector<f64, D>,
    ) -> Result<f64> {
        let mut cut = None;
        for (i, w) in self.points.windows(2).enumerate() {
            let denom = (w[1] - w[0]).dot(plane_normal);
            if denom.abs() < PARALLEL_GUARD {
                continue;
            }
            let s = (plane_point - w[0]).dot(plane_normal) / denom;
            cut = Some((i, s));
            if s < 1.0 {
                break;
            }
        }

        let (i, s) = cut.ok_or(GeometryError::ParallelPlane { edge: "polyline" })?;
        Ok(self.fractions[i] * (1.0 - s) + self.fractions[i + 1] * s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AeroSegError;
    use crate::math::{Point2, Point3, Vector3};
    use approx::assert_abs_diff_eq;

    fn bent() -> Polyline3 {
        Polyline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn fractions_follow_segment_lengths() {
        let pl = bent();
        assert_eq!(pl.segment_count(), 2);
        assert_abs_diff_eq!(pl.fractions()[0], 0.0);
        assert_abs_diff_eq!(pl.fractions()[1], 1.0 / 3.0, epsilon = 1e-15);
        assert_abs_diff_eq!(pl.fractions()[2], 1.0);
    }

    #[test]
    fn calc_point_interpolates_segments() {
        let pl = bent();
        let mid = pl.calc_point(2.0 / 3.0);
        assert_abs_diff_eq!(mid.point, Point3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(mid.direction, Vector3::y(), epsilon = 1e-12);
        assert_eq!(mid.segment, 1);

        let corner = pl.calc_point(1.0 / 3.0);
        assert_abs_diff_eq!(corner.point, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_eq!(corner.segment, 0);
    }

    #[test]
    fn calc_point_extrapolates_past_the_end() {
        let pl = bent();
        let beyond = pl.calc_point(1.5);
        assert_abs_diff_eq!(beyond.point, Point3::new(1.0, 3.5, 0.0), epsilon = 1e-12);
        let before = pl.calc_point(-0.5);
        assert_abs_diff_eq!(before.point, Point3::new(-1.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn cutting_plane_finds_crossed_segment() {
        let pl = bent();
        let eta = pl
            .eta_for_cutting_plane(&Point3::new(0.5, 0.0, 0.0), &Vector3::x())
            .unwrap();
        assert_abs_diff_eq!(eta, 1.0 / 6.0, epsilon = 1e-12);

        // first segment is parallel to this plane
        let eta = pl
            .eta_for_cutting_plane(&Point3::new(0.0, 1.0, 0.0), &Vector3::y())
            .unwrap();
        assert_abs_diff_eq!(eta, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn cutting_plane_before_start_extrapolates() {
        let pl = bent();
        let eta = pl
            .eta_for_cutting_plane(&Point3::new(-1.0, 0.0, 0.0), &Vector3::x())
            .unwrap();
        assert_abs_diff_eq!(eta, -1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn cutting_plane_parallel_to_everything() {
        let pl = bent();
        let result = pl.eta_for_cutting_plane(&Point3::origin(), &Vector3::z());
        assert!(matches!(
            result,
            Err(AeroSegError::Geometry(GeometryError::ParallelPlane { .. }))
        ));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(Polyline2::new(vec![Point2::new(0.0, 0.0)]).is_err());
        assert!(Polyline2::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
        ])
        .is_err());
    }
}
