//! Component segments: several adjoining segments on one `(eta, xsi)` system.
//!
//! `eta` runs spanwise from the inner to the outer end of the component and
//! is proportional to the leading edge length projected into the y-z plane.
//! The leading edge of the first segment is elongated to the inner section of
//! its trailing edge and the one of the last segment to the outer section,
//! so that `eta = 0` and `eta = 1` are the component's tip sections.

mod segment_geometry;

pub use segment_geometry::{ComponentSegmentGeometry, Elongation};

use tracing::{debug, warn};

use crate::error::{AeroSegError, GeometryError, QueryError, Result};
use crate::geometry::{ProjectionOptions, PROJECTION_START};
use crate::math::{Point3, Vector3};

/// Slack on the patch parameters when preferring projections that land
/// inside their segment.
const INSIDE_TOLERANCE: f64 = 1e-6;

/// Result of projecting a point onto a component segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentProjection {
    /// Index of the segment that owns the foot point.
    pub segment: usize,
    /// Spanwise component coordinate.
    pub eta: f64,
    /// Chordwise component coordinate.
    pub xsi: f64,
    /// Foot point.
    pub point: Point3,
    /// Distance between the query point and `point`.
    pub distance: f64,
    /// Optimizer iterations used.
    pub iterations: usize,
}

/// An ordered chain of segments sharing one `(eta, xsi)` coordinate system.
#[derive(Debug, Clone, Default)]
pub struct ComponentSegment {
    segments: Vec<ComponentSegmentGeometry>,
}

impl ComponentSegment {
    /// Creates an empty component segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment and redistributes the eta ranges of all segments.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DegenerateSegment`] naming the new segment's
    /// index if its corners are degenerate. The component is left unchanged.
    pub fn add_segment(&mut self, p1: Point3, p2: Point3, p3: Point3, p4: Point3) -> Result<()> {
        let index = self.segments.len();
        let segment = ComponentSegmentGeometry::new(p1, p2, p3, p4, 0.0, 1.0)
            .map_err(|err| err.in_segment(index))?;
        self.segments.push(segment);
        self.update_eta_ranges();
        Ok(())
    }

    /// Builder variant of [`ComponentSegment::add_segment`].
    ///
    /// # Errors
    ///
    /// See [`ComponentSegment::add_segment`].
    pub fn with_segment(mut self, p1: Point3, p2: Point3, p3: Point3, p4: Point3) -> Result<Self> {
        self.add_segment(p1, p2, p3, p4)?;
        Ok(self)
    }

    /// Leading edge ranges are proportional to the projected leading edge
    /// lengths and assigned in insertion order. Only the two tips add their
    /// elongation to the total length. The extended ranges of neighbours
    /// overlap where a trailing edge kink lies outboard of its leading edge
    /// kink.
    fn update_eta_ranges(&mut self) {
        let (Some(first), Some(last)) = (self.segments.first(), self.segments.last()) else {
            return;
        };
        let inner_elongation = first.projected_leading_edge_length(Elongation::Inner)
            - first.projected_leading_edge_length(Elongation::None);
        let outer_elongation = last.projected_leading_edge_length(Elongation::Outer)
            - last.projected_leading_edge_length(Elongation::None);

        let lengths: Vec<f64> = self
            .segments
            .iter()
            .map(|s| s.projected_leading_edge_length(Elongation::None))
            .collect();
        let total = lengths.iter().sum::<f64>() + inner_elongation + outer_elongation;

        let mut eta = inner_elongation / total;
        for (segment, length) in self.segments.iter_mut().zip(lengths) {
            let next = eta + length / total;
            segment.set_leading_edge_etas(eta, next);
            eta = next;
        }
        debug!(segments = self.segments.len(), total, "updated component eta ranges");
    }

    /// The segments in insertion order.
    #[must_use]
    pub fn segments(&self) -> &[ComponentSegmentGeometry] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Index of the first segment that owns `(eta, xsi)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::OutOfDomain`] if no segment owns the coordinate.
    pub fn segment_index(&self, eta: f64, xsi: f64) -> Result<usize> {
        self.segments
            .iter()
            .position(|s| s.is_valid_coordinate(eta, xsi))
            .ok_or_else(|| QueryError::OutOfDomain { eta, xsi }.into())
    }

    /// Evaluates the component at `(eta, xsi)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::OutOfDomain`] if no segment owns the coordinate.
    pub fn point(&self, eta: f64, xsi: f64) -> Result<Point3> {
        self.segments[self.segment_index(eta, xsi)?].point(eta, xsi)
    }

    /// Returns `(dP/deta, dP/dxsi)` of the owning segment.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegment::point`].
    pub fn tangents(&self, eta: f64, xsi: f64) -> Result<(Vector3, Vector3)> {
        self.segments[self.segment_index(eta, xsi)?].tangents(eta, xsi)
    }

    /// Unit normal of the owning segment.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegment::point`].
    pub fn normal(&self, eta: f64, xsi: f64) -> Result<Vector3> {
        self.segments[self.segment_index(eta, xsi)?].normal(eta, xsi)
    }

    /// Projects `target` onto the component.
    ///
    /// # Errors
    ///
    /// See [`ComponentSegment::project_with`].
    pub fn project(&self, target: &Point3) -> Result<ComponentProjection> {
        self.project_with(target, &ProjectionOptions::default())
    }

    /// Projects `target` onto every segment's patch and keeps the best hit.
    ///
    /// Hits inside their patch are preferred over extrapolated ones, then
    /// the smallest distance wins. Segments whose projection fails are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] for an empty component, or the
    /// last segment's error if no projection succeeded.
    pub fn project_with(
        &self,
        target: &Point3,
        options: &ProjectionOptions,
    ) -> Result<ComponentProjection> {
        let mut best: Option<(bool, ComponentProjection)> = None;
        let mut last_error: Option<AeroSegError> = None;

        for (index, segment) in self.segments.iter().enumerate() {
            let hit = match segment.patch().project_with(target, PROJECTION_START, options) {
                Ok(hit) => hit,
                Err(err) => {
                    warn!(segment = index, error = %err, "skipping segment in projection");
                    last_error = Some(err);
                    continue;
                }
            };

            let inside = (-INSIDE_TOLERANCE..=1.0 + INSIDE_TOLERANCE).contains(&hit.alpha)
                && (-INSIDE_TOLERANCE..=1.0 + INSIDE_TOLERANCE).contains(&hit.beta);
            let (eta, xsi) = segment.to_global(hit.alpha, hit.beta);
            let candidate = ComponentProjection {
                segment: index,
                eta,
                xsi,
                point: hit.point,
                distance: hit.distance,
                iterations: hit.iterations,
            };

            let better = match &best {
                None => true,
                Some((best_inside, best_hit)) => {
                    (inside && !best_inside)
                        || (inside == *best_inside && candidate.distance < best_hit.distance)
                }
            };
            if better {
                best = Some((inside, candidate));
            }
        }

        match (best, last_error) {
            (Some((_, hit)), _) => Ok(hit),
            (None, Some(err)) => Err(err),
            (None, None) => {
                Err(GeometryError::Degenerate("component segment has no segments".into()).into())
            }
        }
    }
}
