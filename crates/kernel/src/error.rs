use thiserror::Error;

/// Errors raised while constructing geometry from untrusted data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("knot vector has {actual} entries, expected {expected}")]
    KnotCount { expected: usize, actual: usize },

    #[error("{actual} weights given for {expected} control points")]
    WeightCount { expected: usize, actual: usize },

    #[error("control grid has {actual} points, expected {num_u}x{num_v}")]
    ControlGrid { num_u: usize, num_v: usize, actual: usize },

    #[error("degree {degree} curve has only {count} control points")]
    TooFewControlPoints { degree: usize, count: usize },

    #[error("knot vector is not non-decreasing")]
    DecreasingKnots,

    #[error("zero-length direction")]
    DegenerateDirection,

    #[error("non-positive radius {0}")]
    InvalidRadius(f64),
}
