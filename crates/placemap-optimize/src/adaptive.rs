//! Adaptive tolerance search.
//!
//! A single fixed tolerance over-simplifies small features and
//! under-simplifies large ones. This module searches, per point
//! sequence, for a tolerance whose result lands in a target vertex
//! range.
//!
//! The search steps the tolerance multiplicatively (up when the result
//! has too many points, down when it has too few). As soon as one
//! tolerance has been seen on each side of the range it bisects
//! geometrically between the two, so it cannot oscillate between a
//! too-fine and a too-coarse value. The search is deterministic and
//! bounded by an iteration budget; when the budget runs out the result
//! closest to the range wins.

use crate::policy::VertexRange;
use crate::simplify::simplify;
use crate::types::Point;

/// Starting tolerance when the caller's initial tolerance is zero,
/// since multiplicative steps cannot leave zero.
pub const SEED_TOLERANCE: f64 = 1e-6;

/// Search budget and step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Maximum simplification passes.
    pub max_iterations: usize,
    /// Multiplicative step applied until the range is bracketed.
    pub step_factor: f64,
}

/// Result of an adaptive search.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveOutcome {
    /// The chosen simplified points.
    pub points: Vec<Point>,
    /// Tolerance that produced `points` (0.0 when no pass was needed).
    pub tolerance_used: f64,
    /// Simplification passes performed.
    pub iterations: usize,
}

impl AdaptiveOutcome {
    /// Returns `true` if the final point count lies in `range`.
    #[must_use]
    pub const fn converged(&self, range: VertexRange) -> bool {
        range.contains(self.points.len())
    }
}

/// Search for a tolerance that brings `points` into `range`.
///
/// Sequences already at or below `range.max` are returned unchanged with
/// zero iterations: simplification can only remove points, so nothing
/// can bring a short sequence closer to the range.
///
/// Otherwise the search starts at `initial_tolerance` and stops at the
/// first pass that lands in range. If `params.max_iterations` passes
/// elapse first, the pass closest to the range is returned (earliest
/// wins a tie) with `iterations == params.max_iterations`.
#[must_use = "returns the simplified points and search statistics"]
pub fn adaptive_simplify(
    points: &[Point],
    range: VertexRange,
    initial_tolerance: f64,
    params: SearchParams,
) -> AdaptiveOutcome {
    if points.len() <= range.max {
        return AdaptiveOutcome {
            points: points.to_vec(),
            tolerance_used: 0.0,
            iterations: 0,
        };
    }

    let mut tolerance = if initial_tolerance > 0.0 {
        initial_tolerance
    } else {
        SEED_TOLERANCE
    };

    // Largest tolerance seen that left too many points, and smallest
    // that left too few.
    let mut too_fine: Option<f64> = None;
    let mut too_coarse: Option<f64> = None;
    let mut best: Option<(usize, AdaptiveOutcome)> = None;

    for iteration in 1..=params.max_iterations {
        let candidate = simplify(points, tolerance);
        let count = candidate.len();
        let distance = range.distance(count);

        if best.as_ref().is_none_or(|(d, _)| distance < *d) {
            best = Some((
                distance,
                AdaptiveOutcome {
                    points: candidate,
                    tolerance_used: tolerance,
                    iterations: iteration,
                },
            ));
        }
        if distance == 0 {
            break;
        }

        if count > range.max {
            too_fine = Some(too_fine.map_or(tolerance, |t| t.max(tolerance)));
        } else {
            too_coarse = Some(too_coarse.map_or(tolerance, |t| t.min(tolerance)));
        }

        tolerance = match (too_fine, too_coarse) {
            (Some(fine), Some(coarse)) => (fine * coarse).sqrt(),
            (Some(_), None) => tolerance * params.step_factor,
            (None, _) => tolerance / params.step_factor,
        };
    }

    match best {
        Some((0, outcome)) => outcome,
        Some((_, mut outcome)) => {
            tracing::trace!(
                input = points.len(),
                output = outcome.points.len(),
                min = range.min,
                max = range.max,
                "adaptive search exhausted its budget"
            );
            outcome.iterations = params.max_iterations;
            outcome
        }
        None => AdaptiveOutcome {
            points: points.to_vec(),
            tolerance_used: 0.0,
            iterations: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: SearchParams = SearchParams {
        max_iterations: 10,
        step_factor: 2.0,
    };

    /// A gently curving line: each halving of tolerance keeps roughly
    /// 1.4x as many points.
    fn sine_line(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64;
                Point::new(x, 50.0 * (x / 200.0).sin())
            })
            .collect()
    }

    #[test]
    fn short_input_returned_unchanged() {
        let pts = sine_line(40);
        let out = adaptive_simplify(&pts, VertexRange::new(50, 100), 1.0, PARAMS);
        assert_eq!(out.points, pts);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn input_within_range_returned_unchanged() {
        let pts = sine_line(80);
        let out = adaptive_simplify(&pts, VertexRange::new(50, 100), 1.0, PARAMS);
        assert_eq!(out.points.len(), 80);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn first_pass_in_range_stops_immediately() {
        let pts = sine_line(2000);
        let out = adaptive_simplify(&pts, VertexRange::new(2, 1999), 0.01, PARAMS);
        assert_eq!(out.iterations, 1);
        assert!((out.tolerance_used - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn increases_tolerance_when_too_many_points() {
        let pts = sine_line(5000);
        let range = VertexRange::new(20, 60);
        let out = adaptive_simplify(&pts, range, 1e-4, SearchParams {
            max_iterations: 40,
            step_factor: 2.0,
        });
        assert!(out.converged(range), "got {} points", out.points.len());
        assert!(out.tolerance_used > 1e-4);
    }

    #[test]
    fn decreases_tolerance_when_too_few_points() {
        let pts = sine_line(5000);
        let range = VertexRange::new(20, 60);
        let out = adaptive_simplify(&pts, range, 1000.0, SearchParams {
            max_iterations: 40,
            step_factor: 2.0,
        });
        assert!(out.converged(range), "got {} points", out.points.len());
        assert!(out.tolerance_used < 1000.0);
    }

    #[test]
    fn unreachable_range_returns_closest_after_budget() {
        // Exactly collinear points collapse to 2 at any positive
        // tolerance, so a minimum of 5 is unreachable.
        let pts: Vec<Point> = (0..10).map(|i| Point::new(f64::from(i), 0.0)).collect();
        let out = adaptive_simplify(&pts, VertexRange::new(5, 8), 1.0, PARAMS);
        assert_eq!(out.iterations, PARAMS.max_iterations);
        assert_eq!(out.points.len(), 2);
    }

    #[test]
    fn zero_initial_tolerance_is_seeded() {
        let pts = sine_line(3000);
        let out = adaptive_simplify(&pts, VertexRange::at_most(100), 0.0, PARAMS);
        assert!(out.tolerance_used >= SEED_TOLERANCE);
        assert!(out.iterations >= 1);
    }

    #[test]
    fn search_is_deterministic() {
        let pts = sine_line(4000);
        let range = VertexRange::new(30, 45);
        let a = adaptive_simplify(&pts, range, 1e-3, PARAMS);
        let b = adaptive_simplify(&pts, range, 1e-3, PARAMS);
        assert_eq!(a, b);
    }

    #[test]
    fn never_exceeds_budget() {
        let pts = sine_line(4000);
        for max_iterations in 1..6 {
            let params = SearchParams {
                max_iterations,
                step_factor: 2.0,
            };
            let out = adaptive_simplify(&pts, VertexRange::new(3, 4), 1e-6, params);
            assert!(out.iterations <= max_iterations);
            assert!(out.points.len() <= pts.len());
        }
    }
}
