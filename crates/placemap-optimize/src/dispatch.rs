//! Geometry-type dispatch: route each geometry variant to the right
//! reduction strategy and recombine the results.
//!
//! | Variant | Strategy |
//! |---|---|
//! | `Point` | passed through |
//! | `LineString` | simplified directly, no closure requirement |
//! | `Polygon` | every ring simplified and normalized independently |
//! | `MultiGeometry` | members optimized independently, faults isolated |
//!
//! Whether a sequence gets the fixed policy tolerance or the adaptive
//! search is decided by [`SimplificationPolicy::target_for`].

use serde::{Deserialize, Serialize};

use crate::adaptive::{SearchParams, adaptive_simplify};
use crate::normalize::{MIN_RING_POINTS, distinct_vertex_count, normalize_ring};
use crate::policy::{DegenerateAction, SimplificationPolicy, TargetKind};
use crate::simplify::simplify;
use crate::types::{DegenerateReason, Geometry, GeometryFault, LineString, PartKind, Point, Ring};

/// Minimum points in a valid line string.
pub const MIN_LINE_POINTS: usize = 2;

/// Minimum distinct vertices in a valid input ring.
pub const MIN_RING_VERTICES: usize = 3;

/// Counts describing what optimization did to one geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeometryMetrics {
    /// Vertices before optimization.
    pub original_vertices: usize,
    /// Vertices after optimization (0 if the geometry was dropped).
    pub final_vertices: usize,
    /// Simplification passes performed across all sequences.
    pub iterations: usize,
    /// Rings that collapsed below four points.
    pub degenerate_rings: usize,
    /// Rings flagged with a suspicious bounding-box shrink.
    pub area_warnings: usize,
    /// `true` if any collapsed ring was restored or dropped.
    pub degenerate_repair: bool,
}

impl GeometryMetrics {
    /// Metrics for a geometry left exactly as it was.
    #[must_use]
    pub fn unchanged(geometry: &Geometry) -> Self {
        let vertices = geometry.vertex_count();
        Self {
            original_vertices: vertices,
            final_vertices: vertices,
            ..Self::default()
        }
    }

    /// Add the per-ring counters of a member geometry.
    fn absorb(&mut self, other: &Self) {
        self.iterations += other.iterations;
        self.degenerate_rings += other.degenerate_rings;
        self.area_warnings += other.area_warnings;
        self.degenerate_repair |= other.degenerate_repair;
    }
}

/// Result of optimizing one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryOutcome {
    /// The optimized geometry, or `None` if it degenerated and was dropped.
    pub geometry: Option<Geometry>,
    /// What optimization did.
    pub metrics: GeometryMetrics,
    /// Why the geometry was dropped, when `geometry` is `None`.
    pub dropped_reason: Option<DegenerateReason>,
    /// Faults of multi-geometry members that passed through unmodified.
    pub member_faults: Vec<GeometryFault>,
    /// Holes and members removed from a geometry as degenerate.
    pub dropped_parts: Vec<DroppedPart>,
}

/// A degenerate ring removed from inside a geometry.
///
/// The containing feature is still emitted; this records what it lost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroppedPart {
    /// The ring that collapsed: an interior ring, or the exterior ring of
    /// a collection member.
    pub part: PartKind,
    /// Why it was dropped.
    pub reason: DegenerateReason,
}

/// Optimize a single geometry according to `policy`.
///
/// The policy is assumed valid; run entry points validate it once.
///
/// # Errors
///
/// Returns a [`GeometryFault`] if the geometry is malformed (too few
/// points, non-finite coordinates, empty collection). Faults inside a
/// multi-geometry member do not fail the collection: the member passes
/// through unmodified and the fault is listed in
/// [`GeometryOutcome::member_faults`].
pub fn optimize_geometry(
    geometry: &Geometry,
    policy: &SimplificationPolicy,
) -> Result<GeometryOutcome, GeometryFault> {
    optimize_at(geometry, policy, false)
}

fn optimize_at(
    geometry: &Geometry,
    policy: &SimplificationPolicy,
    nested: bool,
) -> Result<GeometryOutcome, GeometryFault> {
    match geometry {
        Geometry::Point(p) => {
            check_finite(std::slice::from_ref(p))?;
            Ok(GeometryOutcome {
                geometry: Some(geometry.clone()),
                metrics: GeometryMetrics::unchanged(geometry),
                dropped_reason: None,
                member_faults: Vec::new(),
                dropped_parts: Vec::new(),
            })
        }
        Geometry::LineString(line) => {
            check_sequence(line.points(), PartKind::LineString, MIN_LINE_POINTS)?;
            let kind = if nested {
                TargetKind::Member
            } else {
                TargetKind::LineString
            };
            let (points, iterations) = reduce(line.points(), kind, policy);
            let output = Geometry::LineString(LineString::new(points));
            Ok(GeometryOutcome {
                metrics: GeometryMetrics {
                    original_vertices: line.len(),
                    final_vertices: output.vertex_count(),
                    iterations,
                    ..GeometryMetrics::default()
                },
                geometry: Some(output),
                dropped_reason: None,
                member_faults: Vec::new(),
                dropped_parts: Vec::new(),
            })
        }
        Geometry::Polygon {
            exterior,
            interiors,
        } => {
            check_ring(exterior, PartKind::ExteriorRing)?;
            for hole in interiors {
                check_ring(hole, PartKind::InteriorRing)?;
            }
            let kind = if nested {
                TargetKind::Member
            } else {
                TargetKind::PolygonRing
            };
            Ok(optimize_polygon(geometry, exterior, interiors, kind, policy))
        }
        Geometry::MultiGeometry(members) => optimize_collection(geometry, members, policy),
    }
}

fn optimize_polygon(
    original: &Geometry,
    exterior: &Ring,
    interiors: &[Ring],
    kind: TargetKind,
    policy: &SimplificationPolicy,
) -> GeometryOutcome {
    let mut metrics = GeometryMetrics {
        original_vertices: original.vertex_count(),
        ..GeometryMetrics::default()
    };

    let exterior = match optimize_ring(exterior, kind, policy, &mut metrics) {
        Ok(ring) => ring,
        Err(reason) => {
            return GeometryOutcome {
                geometry: None,
                metrics,
                dropped_reason: Some(reason),
                member_faults: Vec::new(),
                dropped_parts: Vec::new(),
            };
        }
    };

    // A collapsed hole only loses itself.
    let mut kept = Vec::with_capacity(interiors.len());
    let mut dropped_parts = Vec::new();
    for hole in interiors {
        match optimize_ring(hole, kind, policy, &mut metrics) {
            Ok(ring) => kept.push(ring),
            Err(reason) => dropped_parts.push(DroppedPart {
                part: PartKind::InteriorRing,
                reason,
            }),
        }
    }

    let output = Geometry::Polygon {
        exterior,
        interiors: kept,
    };
    metrics.final_vertices = output.vertex_count();
    GeometryOutcome {
        geometry: Some(output),
        metrics,
        dropped_reason: None,
        member_faults: Vec::new(),
        dropped_parts,
    }
}

fn optimize_collection(
    original: &Geometry,
    members: &[Geometry],
    policy: &SimplificationPolicy,
) -> Result<GeometryOutcome, GeometryFault> {
    if members.is_empty() {
        return Err(GeometryFault::EmptyCollection);
    }

    let mut metrics = GeometryMetrics {
        original_vertices: original.vertex_count(),
        ..GeometryMetrics::default()
    };
    let mut kept = Vec::with_capacity(members.len());
    let mut member_faults = Vec::new();
    let mut dropped_parts = Vec::new();
    let mut first_drop = None;

    for member in members {
        match optimize_at(member, policy, true) {
            Ok(outcome) => {
                metrics.absorb(&outcome.metrics);
                member_faults.extend(outcome.member_faults);
                dropped_parts.extend(outcome.dropped_parts);
                match outcome.geometry {
                    Some(g) => kept.push(g),
                    None => {
                        if let Some(reason) = outcome.dropped_reason {
                            dropped_parts.push(DroppedPart {
                                part: PartKind::ExteriorRing,
                                reason,
                            });
                        }
                        first_drop = first_drop.or(outcome.dropped_reason);
                    }
                }
            }
            Err(fault) => {
                member_faults.push(fault);
                kept.push(member.clone());
            }
        }
    }

    if kept.is_empty() {
        return Ok(GeometryOutcome {
            geometry: None,
            metrics,
            dropped_reason: first_drop,
            member_faults,
            dropped_parts,
        });
    }

    let output = Geometry::MultiGeometry(kept);
    metrics.final_vertices = output.vertex_count();
    Ok(GeometryOutcome {
        geometry: Some(output),
        metrics,
        dropped_reason: None,
        member_faults,
        dropped_parts,
    })
}

/// Simplify and normalize one ring, applying the degenerate policy.
///
/// Returns the ring to keep, or the reason it was dropped.
fn optimize_ring(
    ring: &Ring,
    kind: TargetKind,
    policy: &SimplificationPolicy,
    metrics: &mut GeometryMetrics,
) -> Result<Ring, DegenerateReason> {
    let (reduced, iterations) = reduce(ring.points(), kind, policy);
    metrics.iterations += iterations;

    match normalize_ring(ring.points(), reduced, policy.area_shrink_threshold) {
        Ok(normalized) => {
            if normalized.warning.is_some() {
                metrics.area_warnings += 1;
            }
            Ok(normalized.ring)
        }
        Err(reason) => {
            metrics.degenerate_rings += 1;
            metrics.degenerate_repair = true;
            match policy.on_degenerate {
                DegenerateAction::KeepOriginal => Ok(ring.clone()),
                DegenerateAction::Drop => Err(reason),
            }
        }
    }
}

/// Reduce a point sequence with the fixed tolerance or the adaptive
/// search, returning the points and the number of passes used.
fn reduce(points: &[Point], kind: TargetKind, policy: &SimplificationPolicy) -> (Vec<Point>, usize) {
    match policy.target_for(kind) {
        Some(range) => {
            let params = SearchParams {
                max_iterations: policy.max_iterations,
                step_factor: policy.step_factor,
            };
            let outcome = adaptive_simplify(points, range, policy.tolerance, params);
            (outcome.points, outcome.iterations)
        }
        None => (simplify(points, policy.tolerance), 1),
    }
}

fn check_sequence(points: &[Point], part: PartKind, required: usize) -> Result<(), GeometryFault> {
    if points.len() < required {
        return Err(GeometryFault::TooFewPoints {
            part,
            found: points.len(),
            required,
        });
    }
    check_finite(points)
}

/// Validate an input ring: enough points, finite coordinates, and at
/// least three distinct vertices anywhere along it.
fn check_ring(ring: &Ring, part: PartKind) -> Result<(), GeometryFault> {
    check_sequence(ring.points(), part, MIN_RING_POINTS)?;
    let found = distinct_vertex_count(ring.points());
    if found < MIN_RING_VERTICES {
        return Err(GeometryFault::TooFewDistinctVertices { part, found });
    }
    Ok(())
}

fn check_finite(points: &[Point]) -> Result<(), GeometryFault> {
    match points.iter().find(|p| !p.is_finite()) {
        Some(p) => Err(GeometryFault::NonFiniteCoordinate { x: p.x, y: p.y }),
        None => Ok(()),
    }
}
