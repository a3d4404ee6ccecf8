use thiserror::Error;

/// Top-level error type for the surface boolean pipeline.
///
/// Every variant is fatal to the operation: nothing is written to the
/// output on the failure path.
#[derive(Debug, Error)]
pub enum BooleanError {
    /// Sanitize could not separate coincident input points.
    #[error("cannot prevent equal capture points")]
    EqualCaptPoints,

    /// Internal failure of the intersection engine.
    #[error("contact failed: {0}")]
    ContactFailed(String),

    /// The contact curve is empty, either initially or after strip cleanup.
    #[error("there is no contact")]
    NoContact,

    /// A contact point has only one neighbour: the surfaces touch
    /// without crossing.
    #[error("at least one line-end has only one neighbor")]
    LineEndDegree1,

    /// Two distinct contact points collapsed to the same coordinate on a
    /// face after boundary snapping.
    #[error("cut points collapsed to the same coordinate")]
    CollapsedCutPoints,

    /// Assembled strips self-intersect in the face plane.
    #[error("strips are invalid: they cross in the face plane")]
    StripsCross,

    /// A strip is branched at both endpoints.
    #[error("a strip is branched on both ends")]
    BranchedOnBothEnds,

    /// CutCells could not produce a valid decomposition of a face.
    #[error("cutting cells failed")]
    CutFailed,

    /// A contact segment could not locate its two supporting faces on
    /// both surfaces.
    #[error("region classification failed")]
    RegionClassifyFailed,
}

/// Convenience type alias for results using [`BooleanError`].
pub type Result<T> = std::result::Result<T, BooleanError>;
