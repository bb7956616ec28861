//! Ring normalization and validation after simplification.
//!
//! A simplified ring is closed again if needed, then checked:
//!
//! - fewer than three distinct vertices (four points with the closing
//!   duplicate) is a hard failure, [`DegenerateReason::TooFewVertices`];
//! - a bounding box that shrank by more than the policy threshold is a
//!   soft warning, [`DegenerateReason::SuspiciousAreaChange`].
//!
//! Full self-intersection testing is not attempted. The bounding-box
//! heuristic catches the common failure of a thin ring folding onto
//! itself at a coarse tolerance.

use geo::BoundingRect;

use crate::types::{DegenerateReason, Point, Ring};

/// Minimum points in a valid ring: three distinct vertices plus the
/// closing duplicate.
pub const MIN_RING_POINTS: usize = 4;

/// A ring that passed validation, with an optional soft warning.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRing {
    /// The closed, valid ring.
    pub ring: Ring,
    /// Set when the bounding-box area shrank suspiciously.
    pub warning: Option<DegenerateReason>,
}

/// Close and validate a simplified ring.
///
/// `original` is the ring before simplification and is only read for
/// the area comparison. `area_shrink_threshold` is the fraction of the
/// original bounding-box area that may be lost before a warning is
/// attached.
///
/// # Errors
///
/// Returns [`DegenerateReason::TooFewVertices`] if the closed ring has
/// fewer than three distinct vertices.
pub fn normalize_ring(
    original: &[Point],
    simplified: Vec<Point>,
    area_shrink_threshold: f64,
) -> Result<NormalizedRing, DegenerateReason> {
    let ring = Ring::new(simplified);

    let found = ring.len().min(distinct_vertex_count(ring.points()) + 1);
    if found < MIN_RING_POINTS {
        return Err(DegenerateReason::TooFewVertices { found });
    }

    let warning = area_change(original, ring.points(), area_shrink_threshold);
    Ok(NormalizedRing { ring, warning })
}

/// Count distinct vertices anywhere in `points`.
///
/// Repeats are collapsed regardless of where they occur, so a ring that
/// walks `A, B, A, B, A` has two distinct vertices. The closing duplicate
/// of a closed ring is absorbed the same way.
pub(crate) fn distinct_vertex_count(points: &[Point]) -> usize {
    let mut sorted = points.to_vec();
    sorted.sort_unstable_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    sorted.len()
}

/// Compare bounding-box areas and flag a shrink beyond `threshold`.
fn area_change(original: &[Point], simplified: &[Point], threshold: f64) -> Option<DegenerateReason> {
    let before = bbox_area(original);
    if before <= 0.0 {
        return None;
    }
    let ratio = bbox_area(simplified) / before;
    (1.0 - ratio > threshold).then_some(DegenerateReason::SuspiciousAreaChange { ratio })
}

/// Area of the axis-aligned bounding box, or zero for an empty sequence.
pub(crate) fn bbox_area(points: &[Point]) -> f64 {
    let line = geo::LineString::new(points.iter().map(|&p| geo::Coord::from(p)).collect());
    line.bounding_rect()
        .map_or(0.0, |rect| rect.width() * rect.height())
}
