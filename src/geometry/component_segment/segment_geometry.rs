use crate::error::{GeometryError, ProjectionError, QueryError, Result};
use crate::geometry::{ProjectionOptions, SegmentPatch};
use crate::math::{MatrixN, Point3, Vector3, VectorN, TOLERANCE};
use crate::optimize::{minimize, Objective};

use super::ComponentProjection;

/// Slack accepted when checking that an edge extension points outward.
const ELONGATION_TOLERANCE: f64 = 1e-9;

/// Which leading-edge end points are replaced by their extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elongation {
    #[default]
    None,
    /// Inner end (`p1 -> p1'`).
    Inner,
    /// Outer end (`p2 -> p2'`).
    Outer,
    /// Both ends.
    Both,
}

/// One segment placed on the component-wide `(eta, xsi)` axes.
///
/// The leading and trailing edges are extended to common section planes
/// (normal `n = (0, -sv.y, -sv.z)`, `sv` the leading edge vector) so that
/// both edges span the same planes. Exactly one of the two edges is
/// extended at each end. `edge_etas` records where the four corners fall
/// on the extended leading edge, normalized to `[0, 1]`, and
/// `[eta_min, eta_max]` maps that local axis onto the component axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSegmentGeometry {
    patch: SegmentPatch,
    extended: [Point3; 4],
    section_normal: Vector3,
    edge_etas: [f64; 4],
    eta_min: f64,
    eta_max: f64,
}

impl ComponentSegmentGeometry {
    /// Creates the geometry from the four corners and the component eta
    /// range covered by the extended leading edge.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] if an edge has zero length, the leading
    /// or trailing edge has no spanwise extent, the edges cannot be closed
    /// by extension, or the eta range is empty.
    pub fn new(
        p1: Point3,
        p2: Point3,
        p3: Point3,
        p4: Point3,
        eta_min: f64,
        eta_max: f64,
    ) -> Result<Self> {
        let patch = SegmentPatch::new(p1, p2, p3, p4)?;
        if !(eta_max - eta_min).is_finite() || eta_max - eta_min < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "empty eta range [{eta_min}, {eta_max}]"
            ))
            .into());
        }

        let sv = p2 - p1;
        let sh = p4 - p3;
        let n = Vector3::new(0.0, -sv.y, -sv.z);
        if n.norm() < TOLERANCE {
            return Err(
                GeometryError::Degenerate("leading edge has no spanwise extent".into()).into(),
            );
        }
        let le_n = sv.dot(&n);
        let te_n = sh.dot(&n);
        if te_n.abs() < TOLERANCE * sh.norm() * n.norm() {
            return Err(
                GeometryError::Degenerate("trailing edge has no spanwise extent".into()).into(),
            );
        }

        // outer section
        let avo = (p4 - p1).dot(&n) / le_n;
        let (p2p, p4p) = if avo > 1.0 {
            (p1 + sv * avo, p4)
        } else {
            let aho = (p2 - p3).dot(&n) / te_n;
            if aho < 1.0 - ELONGATION_TOLERANCE {
                return Err(GeometryError::Degenerate(format!(
                    "trailing edge cannot be extended to the outer section (factor {aho})"
                ))
                .into());
            }
            (p2, p3 + sh * aho)
        };

        // inner section
        let avi = (p3 - p1).dot(&n) / le_n;
        let (p1p, p3p) = if avi < 0.0 {
            (p1 + sv * avi, p3)
        } else {
            let ahi = (p1 - p3).dot(&n) / te_n;
            if ahi > ELONGATION_TOLERANCE {
                return Err(GeometryError::Degenerate(format!(
                    "trailing edge cannot be extended to the inner section (factor {ahi})"
                ))
                .into());
            }
            (p1, p3 + sh * ahi)
        };

        let span = (p2p - p1p).dot(&n);
        let edge_etas = [p1, p2, p3, p4].map(|p| (p - p1p).dot(&n) / span);

        Ok(Self {
            patch,
            extended: [p1p, p2p, p3p, p4p],
            section_normal: n,
            edge_etas,
            eta_min,
            eta_max,
        })
    }

    /// Replaces the corners and eta range, recomputing all derived data.
    ///
    /// On error `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegmentGeometry::new`].
    pub fn set_points(
        &mut self,
        p1: Point3,
        p2: Point3,
        p3: Point3,
        p4: Point3,
        eta_min: f64,
        eta_max: f64,
    ) -> Result<()> {
        *self = Self::new(p1, p2, p3, p4, eta_min, eta_max)?;
        Ok(())
    }

    /// The underlying bilinear patch.
    #[must_use]
    pub fn patch(&self) -> &SegmentPatch {
        &self.patch
    }

    /// Corners `[p1, p2, p3, p4]`.
    #[must_use]
    pub fn corners(&self) -> &[Point3; 4] {
        self.patch.corners()
    }

    /// Corners extended to the common section planes `[p1', p2', p3', p4']`.
    #[must_use]
    pub fn extended_points(&self) -> &[Point3; 4] {
        &self.extended
    }

    /// Local eta of the four corners on the extended leading edge.
    #[must_use]
    pub fn edge_etas(&self) -> [f64; 4] {
        self.edge_etas
    }

    /// Normal of the section planes.
    #[must_use]
    pub fn section_normal(&self) -> &Vector3 {
        &self.section_normal
    }

    /// Component eta range `(eta_min, eta_max)` of the extended leading edge.
    #[must_use]
    pub fn eta_range(&self) -> (f64, f64) {
        (self.eta_min, self.eta_max)
    }

    /// Component eta of the leading edge end points `p1` and `p2`.
    #[must_use]
    pub fn leading_edge_eta_range(&self) -> (f64, f64) {
        let [eta1, eta2, _, _] = self.edge_etas;
        (self.global_eta(eta1), self.global_eta(eta2))
    }

    /// Sets the component eta range of the extended leading edge.
    pub fn set_eta_range(&mut self, eta_min: f64, eta_max: f64) {
        self.eta_min = eta_min;
        self.eta_max = eta_max;
    }

    /// Sets the eta range so that the leading edge itself (`p1` to `p2`)
    /// spans `[eta_in, eta_out]`.
    pub fn set_leading_edge_etas(&mut self, eta_in: f64, eta_out: f64) {
        let [eta1, eta2, _, _] = self.edge_etas;
        let eta_min = (eta2 * eta_in - eta1 * eta_out) / (eta2 - eta1);
        let eta_max = eta_min + (eta_out - eta_in) / (eta2 - eta1);
        self.set_eta_range(eta_min, eta_max);
    }

    /// Length of the leading edge projected into the y-z plane, with the
    /// extended end points substituted as requested.
    #[must_use]
    pub fn projected_leading_edge_length(&self, elongation: Elongation) -> f64 {
        let [p1, p2, _, _] = *self.corners();
        let [p1p, p2p, _, _] = self.extended;
        let (inner, outer) = match elongation {
            Elongation::None => (p1, p2),
            Elongation::Inner => (p1p, p2),
            Elongation::Outer => (p1, p2p),
            Elongation::Both => (p1p, p2p),
        };
        let v = outer - inner;
        v.y.hypot(v.z)
    }

    fn local_eta(&self, eta: f64) -> f64 {
        (eta - self.eta_min) / (self.eta_max - self.eta_min)
    }

    fn global_eta(&self, local: f64) -> f64 {
        self.eta_min + local * (self.eta_max - self.eta_min)
    }

    /// Local eta of the inner and outer edge at chordwise position `xsi`.
    fn edge_etas_at(&self, xsi: f64) -> (f64, f64) {
        let [eta1, eta2, eta3, eta4] = self.edge_etas;
        (
            eta1 * (1.0 - xsi) + eta3 * xsi,
            eta2 * (1.0 - xsi) + eta4 * xsi,
        )
    }

    /// Maps component coordinates to patch parameters `(alpha, beta)`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the inner and outer edges
    /// coincide in projection at `xsi`.
    pub fn to_local(&self, eta: f64, xsi: f64) -> Result<(f64, f64)> {
        let (eta1p, eta2p) = self.edge_etas_at(xsi);
        let width = eta2p - eta1p;
        if width.abs() < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "inner and outer edge coincide at xsi = {xsi}"
            ))
            .into());
        }
        Ok(((self.local_eta(eta) - eta1p) / width, xsi))
    }

    /// Maps patch parameters `(alpha, beta)` to component coordinates.
    #[must_use]
    pub fn to_global(&self, alpha: f64, beta: f64) -> (f64, f64) {
        let (eta1p, eta2p) = self.edge_etas_at(beta);
        (self.global_eta(eta1p + alpha * (eta2p - eta1p)), beta)
    }

    /// Evaluates the segment at component coordinates.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegmentGeometry::to_local`].
    pub fn point(&self, eta: f64, xsi: f64) -> Result<Point3> {
        let (alpha, beta) = self.to_local(eta, xsi)?;
        Ok(self.patch.point(alpha, beta))
    }

    /// Returns `(dP/deta, dP/dxsi)`.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegmentGeometry::to_local`].
    pub fn tangents(&self, eta: f64, xsi: f64) -> Result<(Vector3, Vector3)> {
        let d = self.derivatives(eta, xsi)?;
        Ok((d.d_eta, d.d_xsi))
    }

    /// Unit normal `dP/dxsi x dP/deta`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the mapping is singular or
    /// the tangents are parallel.
    pub fn normal(&self, eta: f64, xsi: f64) -> Result<Vector3> {
        let (d_eta, d_xsi) = self.tangents(eta, xsi)?;
        let normal = d_xsi.cross(&d_eta);
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "parallel tangents at (eta = {eta}, xsi = {xsi})"
            ))
            .into());
        }
        Ok(normal / len)
    }

    /// Returns `true` if `(eta, xsi)` lies inside this segment's quadrilateral.
    ///
    /// Besides the eta range and `0 <= xsi <= 1`, eta must lie between the
    /// inner and outer edge at the given `xsi`.
    #[must_use]
    pub fn is_valid_coordinate(&self, eta: f64, xsi: f64) -> bool {
        if eta < self.eta_min - TOLERANCE || eta > self.eta_max + TOLERANCE {
            return false;
        }
        if !(-TOLERANCE..=1.0 + TOLERANCE).contains(&xsi) {
            return false;
        }
        let local = self.local_eta(eta);
        let (eta1p, eta2p) = self.edge_etas_at(xsi);
        local >= eta1p - TOLERANCE && local <= eta2p + TOLERANCE
    }

    /// Projects `target` onto the segment in component coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DidNotConverge`] with the best estimate if
    /// the optimizer hits its iteration cap.
    pub fn project(&self, target: &Point3) -> Result<ComponentProjection> {
        self.project_with(target, &ProjectionOptions::default())
    }

    /// Projects `target` with the optimizer selected in `options`.
    ///
    /// The start point is the projection onto the extended leading edge
    /// and the inner section line.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegmentGeometry::project`].
    pub fn project_with(
        &self,
        target: &Point3,
        options: &ProjectionOptions,
    ) -> Result<ComponentProjection> {
        let [p1, _, p3, _] = *self.corners();
        let [p1p, p2p, _, _] = self.extended;
        let le = p2p - p1p;
        let inner = p3 - p1;
        let eta0 = self.global_eta((target - p1p).dot(&le) / le.norm_squared());
        let xsi0 = (target - p1).dot(&inner) / inner.norm_squared();

        let objective = ComponentDistance {
            geometry: self,
            target: *target,
        };
        let x0 = VectorN::from_vec(vec![eta0, xsi0]);
        let min = minimize(&objective, x0, options.algorithm, &options.optimizer)?;

        let (eta, xsi) = (min.x[0], min.x[1]);
        let point = self.point(eta, xsi)?;
        let distance = (point - target).norm();
        if !min.converged {
            return Err(ProjectionError::DidNotConverge {
                u: eta,
                v: xsi,
                distance,
                iterations: min.iterations,
            }
            .into());
        }

        Ok(ComponentProjection {
            segment: 0,
            eta,
            xsi,
            point,
            distance,
            iterations: min.iterations,
        })
    }

    /// End points of the line of constant `xsi`.
    ///
    /// Without `extend_to_geometry` the line runs from the inner to the
    /// outer edge; with it, over the whole eta range of the extended
    /// leading edge.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegmentGeometry::to_local`].
    pub fn iso_xsi_line(&self, xsi: f64, extend_to_geometry: bool) -> Result<[Point3; 2]> {
        let (start, stop) = if extend_to_geometry {
            (self.eta_min, self.eta_max)
        } else {
            let (eta1p, eta2p) = self.edge_etas_at(xsi);
            (self.global_eta(eta1p), self.global_eta(eta2p))
        };
        Ok([self.point(start, xsi)?, self.point(stop, xsi)?])
    }

    /// Samples the line of constant `eta`.
    ///
    /// Without `extend_to_geometry` only the part inside the segment is
    /// sampled; with it, `xsi` runs over `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ParameterOutOfRange`] for fewer than two
    /// samples and [`QueryError::OutOfDomain`] if the line misses the
    /// segment.
    pub fn iso_eta_line(
        &self,
        eta: f64,
        extend_to_geometry: bool,
        samples: usize,
    ) -> Result<Vec<Point3>> {
        #[allow(clippy::cast_precision_loss)]
        let (count, last) = (samples as f64, samples.saturating_sub(1) as f64);
        if samples < 2 {
            return Err(QueryError::ParameterOutOfRange {
                parameter: "samples",
                value: count,
                min: 2.0,
                max: f64::INFINITY,
            }
            .into());
        }

        let (xsi_start, xsi_stop) = if extend_to_geometry {
            (0.0, 1.0)
        } else {
            self.xsi_extent(eta)
                .ok_or(QueryError::OutOfDomain { eta, xsi: 0.0 })?
        };

        (0..samples)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64 / last;
                self.point(eta, xsi_start + t * (xsi_stop - xsi_start))
            })
            .collect()
    }

    /// Chordwise extent of the line of constant `eta` inside the segment,
    /// `None` if the line misses it.
    fn xsi_extent(&self, eta: f64) -> Option<(f64, f64)> {
        let [eta1, eta2, eta3, eta4] = self.edge_etas;
        let local = self.local_eta(eta);
        let (mut start, mut stop) = (0.0_f64, 1.0_f64);
        // c0 + c1 * xsi >= 0 for the inner and the outer edge
        for (c0, c1) in [(local - eta1, eta1 - eta3), (eta2 - local, eta4 - eta2)] {
            if c1.abs() < TOLERANCE {
                if c0 < -TOLERANCE {
                    return None;
                }
            } else if c1 > 0.0 {
                start = start.max(-c0 / c1);
            } else {
                stop = stop.min(-c0 / c1);
            }
        }
        (start <= stop + TOLERANCE).then_some((start, stop.max(start)))
    }

    /// First and second derivatives of the `(eta, xsi)` mapping.
    fn derivatives(&self, eta: f64, xsi: f64) -> Result<Derivatives> {
        let [p1, p2, p3, p4] = *self.corners();
        let [eta1, eta2, eta3, eta4] = self.edge_etas;
        let (eta1p, eta2p) = self.edge_etas_at(xsi);
        let width = eta2p - eta1p;
        if width.abs() < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "inner and outer edge coincide at xsi = {xsi}"
            ))
            .into());
        }

        let d_local = 1.0 / (self.eta_max - self.eta_min);
        let pbeg = p1 + (p3 - p1) * xsi;
        let pend = p2 + (p4 - p2) * xsi;
        let dpbeg = p3 - p1;
        let dpend = p4 - p2;
        let deta1p = eta3 - eta1;
        let d_width = (eta4 - eta2) - deta1p;

        let chord = pend - pbeg;
        let d_chord = dpend - dpbeg;
        let h2 = self.local_eta(eta) - eta1p;
        let dh2 = -deta1p;
        let h3 = 1.0 / width;
        let dh3 = -h3 * h3 * d_width;
        let d2h3 = 2.0 * h3 * h3 * h3 * d_width * d_width;

        Ok(Derivatives {
            point: pbeg + chord * (h2 * h3),
            d_eta: chord * (h3 * d_local),
            d_xsi: dpbeg + d_chord * (h2 * h3) + chord * (dh2 * h3 + h2 * dh3),
            d_eta_xsi: (d_chord * h3 + chord * dh3) * d_local,
            d_xsi_xsi: d_chord * (2.0 * (dh2 * h3 + h2 * dh3))
                + chord * (2.0 * dh2 * dh3 + h2 * d2h3),
        })
    }
}

/// Point and derivatives of the component mapping. `d2P/deta2` vanishes.
struct Derivatives {
    point: Point3,
    d_eta: Vector3,
    d_xsi: Vector3,
    d_eta_xsi: Vector3,
    d_xsi_xsi: Vector3,
}

/// Squared distance between the segment and a fixed target, over `(eta, xsi)`.
struct ComponentDistance<'a> {
    geometry: &'a ComponentSegmentGeometry,
    target: Point3,
}

impl Objective for ComponentDistance<'_> {
    fn value(&self, x: &VectorN) -> f64 {
        // infinite outside the mapping so that line searches back off
        self.geometry
            .derivatives(x[0], x[1])
            .map_or(f64::INFINITY, |d| (d.point - self.target).norm_squared())
    }

    fn gradient(&self, x: &VectorN) -> VectorN {
        match self.geometry.derivatives(x[0], x[1]) {
            Ok(d) => {
                let r = d.point - self.target;
                VectorN::from_vec(vec![2.0 * d.d_eta.dot(&r), 2.0 * d.d_xsi.dot(&r)])
            }
            Err(_) => VectorN::from_element(2, f64::NAN),
        }
    }

    fn hessian(&self, x: &VectorN) -> MatrixN {
        match self.geometry.derivatives(x[0], x[1]) {
            Ok(d) => {
                let r = d.point - self.target;
                let mixed = d.d_eta.dot(&d.d_xsi) + r.dot(&d.d_eta_xsi);
                MatrixN::from_row_slice(
                    2,
                    2,
                    &[
                        d.d_eta.dot(&d.d_eta),
                        mixed,
                        mixed,
                        d.d_xsi.dot(&d.d_xsi) + r.dot(&d.d_xsi_xsi),
                    ],
                ) * 2.0
            }
            Err(_) => MatrixN::from_element(2, 2, f64::NAN),
        }
    }
}
