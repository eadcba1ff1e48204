pub mod component_segment;
pub mod polyline;
mod segment_patch;

pub use component_segment::{
    ComponentProjection, ComponentSegment, ComponentSegmentGeometry, Elongation,
};
pub use polyline::{Fillet, Polyline, Polyline2, Polyline3, PolylinePoint, RoundedPolyline};
pub use segment_patch::{
    CutProjection, EdgeIntersection, PatchProjection, SegmentPatch, PROJECTION_START,
};

use crate::optimize::{Algorithm, OptimizerOptions};

/// Optimizer selection for the point projections.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectionOptions {
    /// Minimization algorithm. Newton unless overridden.
    pub algorithm: Algorithm,
    /// Stopping criteria of the minimization.
    pub optimizer: OptimizerOptions,
}

impl ProjectionOptions {
    /// Selects the minimization algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Replaces the optimizer stopping criteria.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerOptions) -> Self {
        self.optimizer = optimizer;
        self
    }
}
