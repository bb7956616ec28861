//! Point reduction using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces point count in lines and rings by removing points that are
//! within a given tolerance of the chord between their neighbours.
//!
//! The recursion of the textbook algorithm is replaced by an explicit
//! worklist of index ranges, so a 100k-point coastline cannot overflow
//! the call stack.

use crate::types::Point;

/// Simplify an ordered point sequence using Ramer-Douglas-Peucker.
///
/// Points within `tolerance` of the chord between the current range's
/// endpoints are removed. The first and last points are always kept and
/// input order is preserved, so the output is never longer than the
/// input.
///
/// Sequences of two or fewer points, and a tolerance of `0.0` (or any
/// non-positive value), return the input unchanged. When several points
/// tie for the maximum distance the first one in sequence order is
/// kept.
#[must_use = "returns the simplified points"]
pub fn simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 || tolerance <= 0.0 {
        return points.to_vec();
    }

    let kept = kept_mask(points, tolerance);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Mark which points survive simplification.
///
/// Ranges are popped from a stack; a range whose farthest interior point
/// exceeds `tolerance` is split at that point and both halves are pushed.
fn kept_mask(points: &[Point], tolerance: f64) -> Vec<bool> {
    let last = points.len() - 1;
    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[last] = true;

    let mut stack = vec![(0, last)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let chord = Chord::new(points[start], points[end]);
        let mut max_dist = 0.0;
        let mut max_idx = start;

        for (i, &p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = chord.offset(p);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist > tolerance {
            kept[max_idx] = true;
            stack.push((max_idx, end));
            stack.push((start, max_idx));
        }
    }

    kept
}

/// The line through a range's endpoints, set up once per range.
struct Chord {
    origin: Point,
    dx: f64,
    dy: f64,
    length: f64,
}

impl Chord {
    fn new(start: Point, end: Point) -> Self {
        Self {
            origin: start,
            dx: end.x - start.x,
            dy: end.y - start.y,
            length: start.distance(end),
        }
    }

    /// How far `p` lies off the chord's line. A zero-length chord (the
    /// seam of a closed ring) measures straight to its origin instead.
    fn offset(&self, p: Point) -> f64 {
        if self.length == 0.0 {
            return p.distance(self.origin);
        }
        let (px, py) = (p.x - self.origin.x, p.y - self.origin.y);
        self.dx.mul_add(py, -(self.dy * px)).abs() / self.length
    }
}
