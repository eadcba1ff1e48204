use crate::error::{GeometryError, ProjectionError, Result};
use crate::math::{MatrixN, Point3, Vector3, VectorN, TOLERANCE};
use crate::optimize::{minimize, Objective};

use super::ProjectionOptions;

/// Iteration cap of the one-dimensional cut projection.
const CUT_MAX_ITERATIONS: usize = 20;

/// Absolute residual accepted by the cut projection.
const CUT_TOLERANCE: f64 = 1e-12;

/// Start point of [`SegmentPatch::project`], the patch centre.
pub const PROJECTION_START: (f64, f64) = (0.5, 0.5);

/// A quadrilateral segment represented as a bilinear surface.
///
/// Corners are `p1` (inner leading), `p2` (outer leading), `p3` (inner
/// trailing) and `p4` (outer trailing). With `a = p2 - p1`, `b = p3 - p1`,
/// `c = p1 - p2 - p3 + p4` and `d = p1`:
///
/// `P(alpha, beta) = a * alpha + b * beta + c * alpha * beta + d`
///
/// `alpha` runs spanwise (`p1 -> p2`), `beta` chordwise (`p1 -> p3`).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPatch {
    corners: [Point3; 4],
    a: Vector3,
    b: Vector3,
    c: Vector3,
    d: Point3,
}

/// Result of projecting a point onto a [`SegmentPatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchProjection {
    /// Spanwise parameter.
    pub alpha: f64,
    /// Chordwise parameter.
    pub beta: f64,
    /// Foot point on the patch.
    pub point: Point3,
    /// Distance between the query point and `point`.
    pub distance: f64,
    /// Optimizer iterations used.
    pub iterations: usize,
}

/// Intersection of a plane with the leading or trailing edge line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeIntersection {
    /// Spanwise parameter of the intersection (may lie outside `[0, 1]`).
    pub alpha: f64,
    /// Intersection point.
    pub point: Point3,
}

/// Result of [`SegmentPatch::project_on_cut`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutProjection {
    pub alpha: f64,
    pub beta: f64,
    pub point: Point3,
    pub iterations: usize,
}

impl SegmentPatch {
    /// Creates a patch from its four corner points.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if any of the four edges has
    /// zero length.
    pub fn new(p1: Point3, p2: Point3, p3: Point3, p4: Point3) -> Result<Self> {
        for (from, to, edge) in [
            (&p1, &p2, "leading"),
            (&p3, &p4, "trailing"),
            (&p1, &p3, "inner"),
            (&p2, &p4, "outer"),
        ] {
            if (to - from).norm() < TOLERANCE {
                return Err(GeometryError::Degenerate(format!("zero-length {edge} edge")).into());
            }
        }

        Ok(Self {
            corners: [p1, p2, p3, p4],
            a: p2 - p1,
            b: p3 - p1,
            c: (p1 - p2) + (p4 - p3),
            d: p1,
        })
    }

    /// Returns the corners `[p1, p2, p3, p4]`.
    #[must_use]
    pub fn corners(&self) -> &[Point3; 4] {
        &self.corners
    }

    /// Evaluates the patch. Parameters outside `[0, 1]` extrapolate.
    #[must_use]
    pub fn point(&self, alpha: f64, beta: f64) -> Point3 {
        self.d + self.a * alpha + self.b * beta + self.c * (alpha * beta)
    }

    /// Returns `(dP/dalpha, dP/dbeta)`.
    #[must_use]
    pub fn tangents(&self, alpha: f64, beta: f64) -> (Vector3, Vector3) {
        (self.a + self.c * beta, self.b + self.c * alpha)
    }

    /// Unit normal `dP/dbeta x dP/dalpha`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the tangents are parallel.
    pub fn normal(&self, alpha: f64, beta: f64) -> Result<Vector3> {
        let (t_alpha, t_beta) = self.tangents(alpha, beta);
        let normal = t_beta.cross(&t_alpha);
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "parallel tangents at (alpha = {alpha}, beta = {beta})"
            ))
            .into());
        }
        Ok(normal / len)
    }

    /// Returns `true` if both parameters lie in `[0, 1]`.
    #[must_use]
    pub fn is_valid_parametric(alpha: f64, beta: f64) -> bool {
        (0.0..=1.0).contains(&alpha) && (0.0..=1.0).contains(&beta)
    }

    /// Intersects the leading edge line (`beta = 0`) with a plane.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ParallelPlane`] if the plane is parallel to
    /// the leading edge.
    pub fn intersect_leading_edge(
        &self,
        plane_point: &Point3,
        plane_normal: &Vector3,
    ) -> Result<EdgeIntersection> {
        let denom = self.a.dot(plane_normal);
        if denom.abs() < TOLERANCE * self.a.norm() * plane_normal.norm() {
            return Err(GeometryError::ParallelPlane { edge: "leading" }.into());
        }
        let alpha = (plane_point - self.d).dot(plane_normal) / denom;
        Ok(EdgeIntersection {
            alpha,
            point: self.point(alpha, 0.0),
        })
    }

    /// Intersects the trailing edge line (`beta = 1`) with a plane.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ParallelPlane`] if the plane is parallel to
    /// the trailing edge.
    pub fn intersect_trailing_edge(
        &self,
        plane_point: &Point3,
        plane_normal: &Vector3,
    ) -> Result<EdgeIntersection> {
        let edge = self.a + self.c;
        let denom = edge.dot(plane_normal);
        if denom.abs() < TOLERANCE * edge.norm() * plane_normal.norm() {
            return Err(GeometryError::ParallelPlane { edge: "trailing" }.into());
        }
        let alpha = (plane_point - self.d - self.b).dot(plane_normal) / denom;
        Ok(EdgeIntersection {
            alpha,
            point: self.point(alpha, 1.0),
        })
    }

    /// Projects `target` onto the patch starting from its centre.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DidNotConverge`] with the best estimate if
    /// the optimizer hits its iteration cap.
    pub fn project(&self, target: &Point3) -> Result<PatchProjection> {
        self.project_from(target, PROJECTION_START)
    }

    /// Projects `target` onto the patch starting from `initial = (alpha, beta)`.
    ///
    /// # Errors
    ///
    /// See [`SegmentPatch::project`].
    pub fn project_from(&self, target: &Point3, initial: (f64, f64)) -> Result<PatchProjection> {
        self.project_with(target, initial, &ProjectionOptions::default())
    }

    /// Projects `target` by minimizing `|P(alpha, beta) - target|^2` with the
    /// optimizer selected in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DidNotConverge`] with the best estimate if
    /// the optimizer hits its iteration cap, or an optimization error if
    /// the line search breaks down.
    pub fn project_with(
        &self,
        target: &Point3,
        initial: (f64, f64),
        options: &ProjectionOptions,
    ) -> Result<PatchProjection> {
        let objective = PatchDistance {
            patch: self,
            target: *target,
        };
        let x0 = VectorN::from_vec(vec![initial.0, initial.1]);
        let min = minimize(&objective, x0, options.algorithm, &options.optimizer)?;

        let (alpha, beta) = (min.x[0], min.x[1]);
        let point = self.point(alpha, beta);
        let distance = (point - target).norm();
        if !min.converged {
            return Err(ProjectionError::DidNotConverge {
                u: alpha,
                v: beta,
                distance,
                iterations: min.iterations,
            }
            .into());
        }

        Ok(PatchProjection {
            alpha,
            beta,
            point,
            distance,
            iterations: min.iterations,
        })
    }

    /// Projects `target` onto the curve where the plane `(plane_point,
    /// plane_normal)` cuts the patch.
    ///
    /// The cut is parameterized by `beta`, and the foot point is chosen so
    /// that it is orthogonal to the chord between the leading and trailing
    /// edge intersections.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ParallelPlane`] if the plane does not cut
    /// both edges, [`ProjectionError::SingularJacobian`] if the cut curve is
    /// tangent to the chord normal, and [`ProjectionError::DidNotConverge`]
    /// after 20 Newton steps.
    pub fn project_on_cut(
        &self,
        target: &Point3,
        plane_point: &Point3,
        plane_normal: &Vector3,
    ) -> Result<CutProjection> {
        let cut = PlaneCut::new(self, plane_point, plane_normal)?;

        let pbeg = cut.point(0.0);
        let pend = cut.point(1.0);
        let chord = pend - pbeg;
        let chord_len = chord.norm();
        if chord_len < TOLERANCE {
            return Err(GeometryError::Degenerate("plane cut has zero length".into()).into());
        }
        let chord = chord / chord_len;

        let residual = |beta: f64| (cut.point(beta) - target).dot(&chord);

        let mut beta = 0.5;
        let mut diff = residual(beta);
        let mut iterations = 0;
        while diff.abs() > CUT_TOLERANCE && iterations < CUT_MAX_ITERATIONS {
            iterations += 1;
            let slope = cut.tangent(beta).dot(&chord);
            if slope.abs() < TOLERANCE {
                return Err(ProjectionError::SingularJacobian {
                    parameter: "beta",
                    value: beta,
                }
                .into());
            }
            beta -= diff / slope;
            diff = residual(beta);
        }

        let alpha = cut.alpha(beta);
        let point = cut.point(beta);
        if diff.abs() > CUT_TOLERANCE {
            return Err(ProjectionError::DidNotConverge {
                u: alpha,
                v: beta,
                distance: (point - target).norm(),
                iterations,
            }
            .into());
        }

        Ok(CutProjection {
            alpha,
            beta,
            point,
            iterations,
        })
    }
}

/// Intersection curve of a patch with a plane, parameterized by `beta`:
/// `alpha(beta) = (a1 + a2 beta) / (a3 + a4 beta)`.
struct PlaneCut<'a> {
    patch: &'a SegmentPatch,
    a1: f64,
    a2: f64,
    a3: f64,
    a4: f64,
}

impl<'a> PlaneCut<'a> {
    fn new(patch: &'a SegmentPatch, plane_point: &Point3, plane_normal: &Vector3) -> Result<Self> {
        let a3 = patch.a.dot(plane_normal);
        let a4 = patch.c.dot(plane_normal);
        let scale = plane_normal.norm();
        if a3.abs() < TOLERANCE * patch.a.norm() * scale {
            return Err(GeometryError::ParallelPlane { edge: "leading" }.into());
        }
        if (a3 + a4).abs() < TOLERANCE * (patch.a + patch.c).norm() * scale {
            return Err(GeometryError::ParallelPlane { edge: "trailing" }.into());
        }
        Ok(Self {
            patch,
            a1: (plane_point - patch.d).dot(plane_normal),
            a2: -patch.b.dot(plane_normal),
            a3,
            a4,
        })
    }

    fn alpha(&self, beta: f64) -> f64 {
        (self.a1 + self.a2 * beta) / (self.a3 + self.a4 * beta)
    }

    fn alpha_prime(&self, beta: f64) -> f64 {
        (self.a2 * self.a3 - self.a1 * self.a4) / (self.a3 + self.a4 * beta).powi(2)
    }

    fn point(&self, beta: f64) -> Point3 {
        self.patch.point(self.alpha(beta), beta)
    }

    fn tangent(&self, beta: f64) -> Vector3 {
        let (t_alpha, t_beta) = self.patch.tangents(self.alpha(beta), beta);
        t_alpha * self.alpha_prime(beta) + t_beta
    }
}

/// Squared distance between the patch and a fixed target point.
struct PatchDistance<'a> {
    patch: &'a SegmentPatch,
    target: Point3,
}

impl Objective for PatchDistance<'_> {
    fn value(&self, x: &VectorN) -> f64 {
        (self.patch.point(x[0], x[1]) - self.target).norm_squared()
    }

    fn gradient(&self, x: &VectorN) -> VectorN {
        let r = self.patch.point(x[0], x[1]) - self.target;
        let (t_alpha, t_beta) = self.patch.tangents(x[0], x[1]);
        VectorN::from_vec(vec![2.0 * t_alpha.dot(&r), 2.0 * t_beta.dot(&r)])
    }

    fn hessian(&self, x: &VectorN) -> MatrixN {
        let r = self.patch.point(x[0], x[1]) - self.target;
        let (t_alpha, t_beta) = self.patch.tangents(x[0], x[1]);
        let mixed = 2.0 * t_alpha.dot(&t_beta) + 2.0 * r.dot(&self.patch.c);
        MatrixN::from_row_slice(
            2,
            2,
            &[
                2.0 * t_alpha.dot(&t_alpha),
                mixed,
                mixed,
                2.0 * t_beta.dot(&t_beta),
            ],
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AeroSegError;
    use crate::math::numeric_diff::{numeric_gradient, numeric_hessian};
    use crate::optimize::{Algorithm, CgVariant};
    use approx::assert_abs_diff_eq;

    fn unit_square() -> SegmentPatch {
        SegmentPatch::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        )
        .unwrap()
    }

    /// Swept, tapered and slightly twisted wing segment.
    fn wing_segment() -> SegmentPatch {
        SegmentPatch::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.5, 4.0, 0.2),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.6, 4.0, 0.35),
        )
        .unwrap()
    }

    #[test]
    fn corners_are_reproduced() {
        let patch = wing_segment();
        let [p1, p2, p3, p4] = *patch.corners();
        assert_abs_diff_eq!(patch.point(0.0, 0.0), p1, epsilon = 1e-15);
        assert_abs_diff_eq!(patch.point(1.0, 0.0), p2, epsilon = 1e-15);
        assert_abs_diff_eq!(patch.point(0.0, 1.0), p3, epsilon = 1e-15);
        assert_abs_diff_eq!(patch.point(1.0, 1.0), p4, epsilon = 1e-15);
    }

    #[test]
    fn unit_square_center_and_normal() {
        let patch = unit_square();
        assert_abs_diff_eq!(patch.point(0.5, 0.5), Point3::new(0.5, 0.5, 0.0));
        for (alpha, beta) in [(0.0, 0.0), (0.3, 0.8), (1.0, 1.0), (1.7, -0.4)] {
            let n = patch.normal(alpha, beta).unwrap();
            assert_abs_diff_eq!(n.x, 0.0);
            assert_abs_diff_eq!(n.y, 0.0);
            assert_abs_diff_eq!(n.z.abs(), 1.0);
        }
    }

    #[test]
    fn tangents_match_finite_differences() {
        let patch = wing_segment();
        let (alpha, beta, h) = (0.3, 0.6, 1e-7);
        let (t_alpha, t_beta) = patch.tangents(alpha, beta);
        let fd_alpha = (patch.point(alpha + h, beta) - patch.point(alpha, beta)) / h;
        let fd_beta = (patch.point(alpha, beta + h) - patch.point(alpha, beta)) / h;
        assert_abs_diff_eq!(t_alpha, fd_alpha, epsilon = 1e-6);
        assert_abs_diff_eq!(t_beta, fd_beta, epsilon = 1e-6);
    }

    #[test]
    fn normal_has_unit_length() {
        let patch = wing_segment();
        for i in 1..10 {
            for j in 1..10 {
                let n = patch
                    .normal(f64::from(i) / 10.0, f64::from(j) / 10.0)
                    .unwrap();
                assert_abs_diff_eq!(n.norm(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn zero_length_leading_edge_is_rejected() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = SegmentPatch::new(p, p, Point3::new(2.0, 2.0, 3.0), Point3::new(2.0, 3.0, 3.0));
        assert!(matches!(
            result,
            Err(AeroSegError::Geometry(GeometryError::Degenerate(_)))
        ));
    }

    #[test]
    fn collapsed_patch_normal_is_an_error() {
        // all corners on one line: tangents are parallel everywhere
        let patch = SegmentPatch::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        )
        .unwrap();
        assert!(patch.normal(0.5, 0.5).is_err());
    }

    #[test]
    fn objective_derivatives_match_finite_differences() {
        let patch = wing_segment();
        let objective = PatchDistance {
            patch: &patch,
            target: Point3::new(0.7, 1.5, 0.9),
        };
        let x = VectorN::from_vec(vec![0.4, 0.3]);
        let grad = numeric_gradient(|y| objective.value(y), &x, 1e-7);
        assert_abs_diff_eq!(objective.gradient(&x), grad, epsilon = 1e-5);
        let hess = numeric_hessian(|y| objective.gradient(y), &x, 1e-7);
        assert_abs_diff_eq!(objective.hessian(&x), hess, epsilon = 1e-5);
    }

    #[test]
    fn projection_recovers_grid_parameters() {
        let patch = wing_segment();
        for i in 0..=10 {
            for j in 0..=10 {
                let (alpha, beta) = (f64::from(i) / 10.0, f64::from(j) / 10.0);
                let hit = patch.project(&patch.point(alpha, beta)).unwrap();
                assert!((hit.alpha - alpha).abs() < 1e-6, "alpha {alpha} -> {}", hit.alpha);
                assert!((hit.beta - beta).abs() < 1e-6, "beta {beta} -> {}", hit.beta);
            }
        }
    }

    #[test]
    fn projection_recovers_grid_parameters_on_full_size_wing() {
        // 10 m root chord, 30 m span: starting at p1 the Hessian turns
        // indefinite and the iteration drifts away from the patch
        let patch = SegmentPatch::new(
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(35.0, 30.0, 3.0),
            Point3::new(30.0, 0.0, 0.5),
            Point3::new(38.0, 30.0, 3.2),
        )
        .unwrap();
        for i in 0..=10 {
            for j in 0..=10 {
                let (alpha, beta) = (f64::from(i) / 10.0, f64::from(j) / 10.0);
                let hit = patch.project(&patch.point(alpha, beta)).unwrap();
                assert!((hit.alpha - alpha).abs() < 1e-6, "alpha {alpha} -> {}", hit.alpha);
                assert!((hit.beta - beta).abs() < 1e-6, "beta {beta} -> {}", hit.beta);
            }
        }
    }

    #[test]
    fn corner_projection_converges_quickly() {
        for patch in [unit_square(), wing_segment()] {
            let p4 = patch.corners()[3];
            for initial in [(0.0, 0.0), (0.5, 0.5)] {
                let hit = patch.project_from(&p4, initial).unwrap();
                assert!(hit.iterations <= 5, "took {} iterations", hit.iterations);
                assert_abs_diff_eq!(hit.alpha, 1.0, epsilon = 1e-6);
                assert_abs_diff_eq!(hit.beta, 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn off_surface_point_projects_orthogonally() {
        let patch = wing_segment();
        let foot = patch.point(0.35, 0.55);
        let normal = patch.normal(0.35, 0.55).unwrap();
        let hit = patch.project(&(foot + normal * 0.25)).unwrap();
        assert_abs_diff_eq!(hit.alpha, 0.35, epsilon = 1e-6);
        assert_abs_diff_eq!(hit.beta, 0.55, epsilon = 1e-6);
        assert_abs_diff_eq!(hit.distance, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn alternative_algorithms_agree_with_newton() {
        let patch = wing_segment();
        let target = patch.point(0.6, 0.25);
        for algorithm in [
            Algorithm::Bfgs,
            Algorithm::ConjugateGradient(CgVariant::PolakRibiere),
        ] {
            let options = ProjectionOptions::default().with_algorithm(algorithm);
            let hit = patch.project_with(&target, (0.5, 0.5), &options).unwrap();
            assert!((hit.alpha - 0.6).abs() < 1e-3, "{algorithm:?}: {}", hit.alpha);
            assert!((hit.beta - 0.25).abs() < 1e-3, "{algorithm:?}: {}", hit.beta);
        }
    }

    #[test]
    fn iteration_cap_reports_best_estimate() {
        let patch = wing_segment();
        let options = ProjectionOptions::default().with_optimizer(
            crate::optimize::OptimizerOptions::default().with_max_iterations(1),
        );
        let result = patch.project_with(&patch.point(0.9, 0.9), (0.0, 0.0), &options);
        match result {
            Err(AeroSegError::Projection(ProjectionError::DidNotConverge {
                u, v, iterations, ..
            })) => {
                assert_eq!(iterations, 1);
                assert!(u.is_finite() && v.is_finite());
            }
            other => panic!("expected DidNotConverge, got {other:?}"),
        }
    }

    #[test]
    fn leading_and_trailing_edge_intersections() {
        let patch = wing_segment();
        let plane_point = Point3::new(0.0, 1.0, 0.0);
        let plane_normal = Vector3::y();
        let le = patch.intersect_leading_edge(&plane_point, &plane_normal).unwrap();
        assert_abs_diff_eq!(le.alpha, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(le.point.y, 1.0, epsilon = 1e-12);
        let te = patch.intersect_trailing_edge(&plane_point, &plane_normal).unwrap();
        assert_abs_diff_eq!(te.alpha, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(te.point, Point3::new(1.9, 1.0, 0.0875), epsilon = 1e-12);
    }

    #[test]
    fn plane_parallel_to_edge_is_rejected() {
        let patch = unit_square();
        let result = patch.intersect_leading_edge(&Point3::origin(), &Vector3::y());
        assert!(matches!(
            result,
            Err(AeroSegError::Geometry(GeometryError::ParallelPlane { edge: "leading" }))
        ));
    }

    #[test]
    fn cut_projection_on_unit_square() {
        let patch = unit_square();
        let hit = patch
            .project_on_cut(
                &Point3::new(0.3, 0.7, 0.5),
                &Point3::new(0.3, 0.0, 0.0),
                &Vector3::x(),
            )
            .unwrap();
        assert_abs_diff_eq!(hit.alpha, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(hit.beta, 0.7, epsilon = 1e-12);
    }

    #[test]
    fn cut_projection_lies_in_plane_and_is_orthogonal_to_chord() {
        let patch = wing_segment();
        let plane_point = Point3::new(0.0, 2.5, 0.0);
        let plane_normal = Vector3::new(0.1, 1.0, 0.0);
        let target = Point3::new(1.2, 2.4, 0.8);
        let hit = patch.project_on_cut(&target, &plane_point, &plane_normal).unwrap();

        assert_abs_diff_eq!((hit.point - plane_point).dot(&plane_normal), 0.0, epsilon = 1e-10);
        let le = patch.intersect_leading_edge(&plane_point, &plane_normal).unwrap();
        let te = patch.intersect_trailing_edge(&plane_point, &plane_normal).unwrap();
        let chord = te.point - le.point;
        assert_abs_diff_eq!((hit.point - target).dot(&chord), 0.0, epsilon = 1e-10);
        assert!(SegmentPatch::is_valid_parametric(hit.alpha, hit.beta));
    }

    #[test]
    fn parametric_validity() {
        assert!(SegmentPatch::is_valid_parametric(0.0, 1.0));
        assert!(SegmentPatch::is_valid_parametric(0.5, 0.5));
        assert!(!SegmentPatch::is_valid_parametric(-1e-9, 0.5));
        assert!(!SegmentPatch::is_valid_parametric(0.5, 1.0 + 1e-9));
    }
}
