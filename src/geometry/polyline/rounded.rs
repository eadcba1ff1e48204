use std::f64::consts::{FRAC_PI_2, PI, TAU};

use tracing::trace;

use super::{locate, PolylinePoint};
use crate::error::{GeometryError, QueryError, Result};
use crate::math::polar_2d::{cart_to_polar, polar_to_cart};
use crate::math::{Point2, Vector2, TOLERANCE};

/// Fillet radius used by [`RoundedPolyline::new`].
pub const DEFAULT_RADIUS: f64 = 0.3;

/// Turning angles closer than this to `0` or `π` get no fillet.
const ANGLE_TOLERANCE: f64 = 1e-7;

/// Slack on `eta` accepted by [`RoundedPolyline::calc_point`].
const ETA_TOLERANCE: f64 = 1e-7;

/// Circular arc rounding an interior vertex.
///
/// The angles are polar angles around `center` of the two tangent points.
/// They differ by less than `π`; either one may be the larger, depending on
/// the turning direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fillet {
    pub center: Point2,
    pub start_angle: f64,
    pub stop_angle: f64,
}

impl Fillet {
    /// Unit tangent at the fraction `t` of the arc, oriented from the
    /// start to the stop tangent point.
    fn direction(&self, t: f64) -> Vector2 {
        let angle = self.start_angle * (1.0 - t) + self.stop_angle * t;
        if self.start_angle < self.stop_angle {
            polar_to_cart(angle + FRAC_PI_2, 1.0)
        } else {
            polar_to_cart(angle - FRAC_PI_2, 1.0)
        }
    }
}

/// A planar polyline whose interior vertices are rounded with a fixed radius.
///
/// The curve alternates straight parts and fillet arcs. `etas` holds the
/// normalized length at the start and end of every straight part:
/// `etas[2 i]..etas[2 i + 1]` is the straight part of line `i`,
/// `etas[2 i + 1]..etas[2 i + 2]` the fillet at vertex `i + 1`. Vertices
/// without a turn have a zero-length fillet, so `etas` only increases
/// strictly across real fillets.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundedPolyline {
    points: Vec<Point2>,
    radius: f64,
    fillets: Vec<Option<Fillet>>,
    /// Local parameters on each line where its straight part starts and ends.
    cuts: Vec<(f64, f64)>,
    line_lengths: Vec<f64>,
    length: f64,
    etas: Vec<f64>,
}

impl RoundedPolyline {
    /// Creates a rounded polyline with [`DEFAULT_RADIUS`].
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] for fewer than three points, a
    /// zero-length line, or a fillet that does not fit on its lines.
    pub fn new(points: Vec<Point2>) -> Result<Self> {
        Self::with_radius(points, DEFAULT_RADIUS)
    }

    /// Creates a rounded polyline with the given fillet radius.
    ///
    /// # Errors
    ///
    /// See [`RoundedPolyline::new`]. A radius that is not positive yields
    /// [`QueryError::ParameterOutOfRange`].
    pub fn with_radius(points: Vec<Point2>, radius: f64) -> Result<Self> {
        if points.len() < 3 {
            return Err(GeometryError::Degenerate(format!(
                "rounded polyline needs at least 3 points, got {}",
                points.len()
            ))
            .into());
        }
        let line_lengths: Vec<f64> = points.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        if let Some(i) = line_lengths.iter().position(|&l| l < TOLERANCE) {
            return Err(
                GeometryError::Degenerate(format!("polyline segment {i} has zero length")).into(),
            );
        }

        let mut polyline = Self {
            points,
            radius,
            fillets: Vec::new(),
            cuts: Vec::new(),
            line_lengths,
            length: 0.0,
            etas: Vec::new(),
        };
        polyline.update(radius)?;
        Ok(polyline)
    }

    /// Changes the fillet radius and recomputes the curve.
    ///
    /// On error `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// See [`RoundedPolyline::with_radius`].
    pub fn set_radius(&mut self, radius: f64) -> Result<()> {
        let mut updated = self.clone();
        updated.update(radius)?;
        *self = updated;
        Ok(())
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    /// Fillet of every interior vertex, `None` where the polyline does not turn.
    #[must_use]
    pub fn fillets(&self) -> &[Option<Fillet>] {
        &self.fillets
    }

    /// Normalized length at the ends of all straight parts.
    #[must_use]
    pub fn etas(&self) -> &[f64] {
        &self.etas
    }

    /// Total length of the rounded curve.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    fn update(&mut self, radius: f64) -> Result<()> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(QueryError::ParameterOutOfRange {
                parameter: "radius",
                value: radius,
                min: 0.0,
                max: f64::INFINITY,
            }
            .into());
        }

        let lines = self.line_lengths.len();
        let mut cuts = vec![(0.0, 1.0); lines];
        let mut fillets = Vec::with_capacity(lines - 1);

        for (i, w) in self.points.windows(3).enumerate() {
            let (a, b, c) = (w[0], w[1], w[2]);
            let e1 = (b - a) / self.line_lengths[i];
            let e2 = (c - b) / self.line_lengths[i + 1];
            let turn = e1.dot(&e2).clamp(-1.0, 1.0).acos();

            if turn < ANGLE_TOLERANCE || (turn - PI).abs() < ANGLE_TOLERANCE {
                trace!(vertex = i + 1, "no fillet at straight vertex");
                fillets.push(None);
                continue;
            }

            let axis = (e2 - e1).normalize();
            let center = b + axis * (radius / (turn / 2.0).cos());
            let s1 = (center - a).dot(&e1);
            let s2 = (center - b).dot(&e2);
            cuts[i].1 = s1 / self.line_lengths[i];
            cuts[i + 1].0 = s2 / self.line_lengths[i + 1];

            let (mut start, _) = cart_to_polar(&(a + e1 * s1 - center));
            let (mut stop, _) = cart_to_polar(&(b + e2 * s2 - center));
            // keep the sweep below π
            if start - stop > PI {
                stop += TAU;
            } else if stop - start > PI {
                start += TAU;
            }
            fillets.push(Some(Fillet {
                center,
                start_angle: start,
                stop_angle: stop,
            }));
        }

        if let Some(i) = cuts.iter().position(|(start, stop)| start > stop) {
            return Err(GeometryError::Degenerate(format!(
                "fillet radius {radius} does not fit on polyline segment {i}"
            ))
            .into());
        }

        let mut parts = vec![0.0; 2 * lines];
        for i in 0..lines {
            parts[2 * i + 1] = self.line_lengths[i] * (cuts[i].1 - cuts[i].0);
            if i + 1 < lines {
                parts[2 * i + 2] = self.line_lengths[i] * (1.0 - cuts[i].1)
                    + self.line_lengths[i + 1] * cuts[i + 1].0;
            }
        }
        let length: f64 = parts.iter().sum();
        let mut acc = 0.0;
        let mut etas: Vec<f64> = parts
            .iter()
            .map(|part| {
                acc += part;
                acc / length
            })
            .collect();
        if let Some(last) = etas.last_mut() {
            *last = 1.0;
        }

        self.radius = radius;
        self.fillets = fillets;
        self.cuts = cuts;
        self.length = length;
        self.etas = etas;
        Ok(())
    }

    /// Local parameter on `line` for normalized length `eta`, continued
    /// linearly beyond the straight part.
    fn line_location(&self, line: usize, eta: f64) -> f64 {
        self.cuts[line].0 + (eta - self.etas[2 * line]) * self.length / self.line_lengths[line]
    }

    /// Evaluates the curve at normalized length `eta`.
    ///
    /// On a fillet the direction follows the arc, but the point is placed
    /// on the closer of the two adjoining lines at the matching length.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ParameterOutOfRange`] if `eta` is outside `[0, 1]`.
    pub fn calc_point(&self, eta: f64) -> Result<PolylinePoint<2>> {
        if !(eta > -ETA_TOLERANCE && eta <= 1.0 + ETA_TOLERANCE) {
            return Err(QueryError::ParameterOutOfRange {
                parameter: "eta",
                value: eta,
                min: 0.0,
                max: 1.0,
            }
            .into());
        }

        let i = locate(&self.etas, eta);
        let (line, direction) = if i % 2 == 1 {
            let line = (i - 1) / 2;
            (line, self.edge_direction(line))
        } else {
            let vertex = i / 2 - 1;
            let t = (eta - self.etas[i - 1]) / (self.etas[i] - self.etas[i - 1]);
            let line = if t <= 0.5 { vertex } else { vertex + 1 };
            let direction = self.fillets[vertex]
                .map_or_else(|| self.edge_direction(line), |f| f.direction(t));
            (line, direction)
        };

        let loc = self.line_location(line, eta);
        let (a, b) = (self.points[line], self.points[line + 1]);
        Ok(PolylinePoint {
            point: a + (b - a) * loc,
            direction,
            segment: line,
        })
    }

    fn edge_direction(&self, line: usize) -> Vector2 {
        (self.points[line + 1] - self.points[line]) / self.line_lengths[line]
    }

    /// Normalized length of the point on the curve closest to `point`.
    ///
    /// Only the straight lines are searched: the foot point on the nearest
    /// line segment is mapped to `eta` with the same linear continuation
    /// [`RoundedPolyline::calc_point`] uses, so points near a fillet get
    /// the length of their foot point on the line, not on the arc.
    #[must_use]
    pub fn project(&self, point: &Point2) -> f64 {
        let mut best = (f64::INFINITY, 0.0);
        for (line, w) in self.points.windows(2).enumerate() {
            let edge = w[1] - w[0];
            let alpha = ((point - w[0]).dot(&edge) / edge.norm_squared()).clamp(0.0, 1.0);
            let distance = (point - (w[0] + edge * alpha)).norm();
            if distance < best.0 {
                let eta = self.etas[2 * line]
                    + (alpha - self.cuts[line].0) * self.line_lengths[line] / self.length;
                best = (distance, eta);
            }
        }
        best.1
    }
}
