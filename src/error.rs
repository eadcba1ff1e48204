use thiserror::Error;

/// Top-level error type for the component-segment engine.
#[derive(Debug, Error)]
pub enum AeroSegError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),
}

impl AeroSegError {
    /// Attributes a geometry error to the segment at `index`.
    pub(crate) fn in_segment(self, index: usize) -> Self {
        match self {
            Self::Geometry(err @ GeometryError::DegenerateSegment { .. }) => Self::Geometry(err),
            Self::Geometry(err) => GeometryError::DegenerateSegment {
                index,
                reason: err.to_string(),
            }
            .into(),
            other => other,
        }
    }
}

/// Errors related to the geometric input.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("segment {index} is degenerate: {reason}")]
    DegenerateSegment { index: usize, reason: String },

    #[error("plane is parallel to the {edge} edge")]
    ParallelPlane { edge: &'static str },
}

/// Errors raised by the inverse (point projection) queries.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The iteration cap was hit. `u`/`v` hold the best estimate found.
    #[error(
        "projection did not converge after {iterations} iterations \
         (best estimate ({u}, {v}), distance {distance})"
    )]
    DidNotConverge {
        u: f64,
        v: f64,
        distance: f64,
        iterations: usize,
    },

    #[error("singular jacobian at {parameter} = {value}")]
    SingularJacobian { parameter: &'static str, value: f64 },
}

/// Errors related to parametric queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("coordinate (eta = {eta}, xsi = {xsi}) is not owned by any segment")]
    OutOfDomain { eta: f64, xsi: f64 },

    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Errors raised by the optimization library.
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("line search failed: {0}")]
    LineSearchFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience type alias for results using [`AeroSegError`].
pub type Result<T> = std::result::Result<T, AeroSegError>;
