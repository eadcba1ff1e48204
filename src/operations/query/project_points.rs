use tracing::debug;

use crate::error::Result;
use crate::geometry::{ComponentProjection, ComponentSegment, ProjectionOptions};
use crate::math::Point3;

/// Projects a batch of points onto a component segment.
///
/// Every point is projected independently; a failing point yields an
/// `Err` in its slot without affecting the others.
pub struct ProjectPoints {
    points: Vec<Point3>,
    options: ProjectionOptions,
}

impl ProjectPoints {
    /// Creates a new `ProjectPoints` query with default projection options.
    #[must_use]
    pub fn new(points: Vec<Point3>) -> Self {
        Self {
            points,
            options: ProjectionOptions::default(),
        }
    }

    /// Sets the optimizer used for every projection.
    #[must_use]
    pub fn with_options(mut self, options: ProjectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Executes the query, returning one result per input point in order.
    #[must_use]
    pub fn execute(&self, component: &ComponentSegment) -> Vec<Result<ComponentProjection>> {
        let results: Vec<_> = self
            .points
            .iter()
            .map(|p| component.project_with(p, &self.options))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(points = results.len(), failed, "projected point batch");
        results
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::optimize::{Algorithm, OptimizerOptions};
    use approx::assert_abs_diff_eq;

    fn wing() -> ComponentSegment {
        ComponentSegment::new()
            .with_segment(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            )
            .unwrap()
    }

    #[test]
    fn results_keep_input_order() {
        let points = vec![
            Point3::new(0.2, 0.3, 0.0),
            Point3::new(0.9, 0.1, 0.5),
            Point3::new(0.5, 0.5, -0.1),
        ];
        let results = ProjectPoints::new(points).execute(&wing());
        assert_eq!(results.len(), 3);
        let etas: Vec<f64> = results.iter().map(|r| r.as_ref().unwrap().eta).collect();
        assert_abs_diff_eq!(etas[0], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(etas[1], 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(etas[2], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(results[1].as_ref().unwrap().distance, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn failing_point_does_not_abort_batch() {
        let points = vec![Point3::new(0.2, 0.3, 0.0), Point3::new(f64::NAN, 0.0, 0.0)];
        let results = ProjectPoints::new(points).execute(&wing());
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn options_are_forwarded() {
        let options = ProjectionOptions::default()
            .with_algorithm(Algorithm::SteepestDescent)
            .with_optimizer(OptimizerOptions::default().with_max_iterations(0));
        let results = ProjectPoints::new(vec![Point3::new(0.2, 0.3, 0.4)])
            .with_options(options)
            .execute(&wing());
        assert!(results[0].is_err());
    }

    #[test]
    fn empty_batch() {
        assert!(ProjectPoints::new(Vec::new()).execute(&wing()).is_empty());
    }
}
