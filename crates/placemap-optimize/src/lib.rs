//! placemap-optimize: Geometry optimization for map features (sans-IO).
//!
//! Reduces the vertex count of point, line and polygon features parsed
//! from a map document before they are rendered, through:
//! policy validation -> batching -> per-geometry dispatch ->
//! Ramer-Douglas-Peucker simplification (fixed or adaptive tolerance) ->
//! ring normalization.
//!
//! Malformed geometries never abort a run: they pass through unmodified
//! and are recorded in the [`RunSummary`]. Only an invalid
//! [`SimplificationPolicy`] is fatal.
//!
//! This crate has **no I/O dependencies**. Parsing the source document
//! and writing the rendered output happen elsewhere.

pub mod adaptive;
pub mod batch;
pub mod diagnostics;
pub mod dispatch;
pub mod normalize;
pub mod policy;
pub mod simplify;
pub mod types;

pub use batch::{
    LogProgress, NoProgress, OptimizeFeatures, OptimizedFeature, OptimizedRun, Progress,
    ProgressObserver, optimize_features,
};
pub use diagnostics::RunSummary;
pub use dispatch::{DroppedPart, GeometryMetrics, GeometryOutcome, optimize_geometry};
pub use policy::{DegenerateAction, KindTargets, SimplificationPolicy, VertexRange};
pub use types::{
    DegenerateReason, Feature, Geometry, GeometryFault, GeometryKind, LineString, OptimizeError,
    PartKind, Point, Ring, StyleRef,
};

/// Optimize every feature and collect the results.
///
/// Equivalent to [`optimize_features`] with [`NoProgress`], drained to
/// completion. Output features are in input order; degenerate features
/// that were dropped are listed in [`RunSummary::dropped`].
///
/// # Errors
///
/// Returns [`OptimizeError::InvalidPolicy`] if `policy` is invalid. No
/// feature is processed in that case.
pub fn optimize(
    features: Vec<Feature>,
    policy: &SimplificationPolicy,
) -> Result<OptimizedRun, OptimizeError> {
    Ok(optimize_features(features, policy, NoProgress)?.finish())
}
