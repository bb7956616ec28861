//! Simplification policy: every tunable knob of an optimization run.
//!
//! A policy is validated once, at the start of a run. Invalid values are
//! the only condition that aborts a whole run
//! ([`OptimizeError::InvalidPolicy`]); everything data-related degrades
//! per feature instead.

use serde::{Deserialize, Serialize};

use crate::types::OptimizeError;

/// Inclusive vertex-count range the adaptive search aims for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRange {
    /// Lower bound (inclusive).
    pub min: usize,
    /// Upper bound (inclusive).
    pub max: usize,
}

impl VertexRange {
    /// Create a range. Not validated until the owning policy is.
    #[must_use]
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// A range with no lower bound.
    #[must_use]
    pub const fn at_most(max: usize) -> Self {
        Self { min: 0, max }
    }

    /// Returns `true` if `count` lies inside the range.
    #[must_use]
    pub const fn contains(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }

    /// How far `count` lies outside the range (0 when inside).
    #[must_use]
    pub const fn distance(&self, count: usize) -> usize {
        if count > self.max {
            count - self.max
        } else if count < self.min {
            self.min - count
        } else {
            0
        }
    }
}

/// Upper vertex targets per geometry kind.
///
/// Used by the adaptive search when no explicit
/// [`target_vertex_range`](SimplificationPolicy::target_vertex_range) is
/// set. Members of a multi-geometry get their own, tighter target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindTargets {
    /// Target for each ring of a top-level polygon.
    pub polygon: usize,
    /// Target for a top-level line string.
    pub line_string: usize,
    /// Target for each line or ring inside a multi-geometry.
    pub member: usize,
}

impl KindTargets {
    /// Default polygon ring target.
    pub const DEFAULT_POLYGON: usize = 400;
    /// Default line string target.
    pub const DEFAULT_LINE_STRING: usize = 300;
    /// Default multi-geometry member target.
    pub const DEFAULT_MEMBER: usize = 200;

    /// Halved targets used for very large inputs.
    #[must_use]
    pub const fn large_input() -> Self {
        Self {
            polygon: Self::DEFAULT_POLYGON / 2,
            line_string: Self::DEFAULT_LINE_STRING / 2,
            member: Self::DEFAULT_MEMBER / 2,
        }
    }
}

impl Default for KindTargets {
    fn default() -> Self {
        Self {
            polygon: Self::DEFAULT_POLYGON,
            line_string: Self::DEFAULT_LINE_STRING,
            member: Self::DEFAULT_MEMBER,
        }
    }
}

/// What to do with a ring that simplification collapsed below four
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DegenerateAction {
    /// Drop the ring. A dropped exterior ring drops the whole polygon.
    #[default]
    Drop,
    /// Keep the pre-simplification ring instead.
    KeepOriginal,
}

/// Which kind of point sequence is being reduced, for target lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A ring of a top-level polygon.
    PolygonRing,
    /// A top-level line string.
    LineString,
    /// A line or ring nested in a multi-geometry.
    Member,
}

/// Configuration for one optimization run.
///
/// All fields have defaults; deserializing a partial JSON object fills
/// the rest from [`SimplificationPolicy::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplificationPolicy {
    /// Base Ramer-Douglas-Peucker tolerance in coordinate units.
    /// Zero disables simplification.
    pub tolerance: f64,

    /// Search for a tolerance that lands each sequence in its target
    /// vertex range, starting from `tolerance`.
    pub adaptive: bool,

    /// Explicit target range for every sequence. Overrides
    /// `kind_targets` when set.
    pub target_vertex_range: Option<VertexRange>,

    /// Per-kind upper targets used when adaptive and no explicit range
    /// is set.
    pub kind_targets: KindTargets,

    /// Process at most this many features, in input order.
    pub max_features: Option<usize>,

    /// Features held in memory per batch. Has no effect on output.
    pub batch_size: usize,

    /// Adaptive search budget (simplification passes per sequence).
    pub max_iterations: usize,

    /// Multiplicative tolerance step of the adaptive search.
    pub step_factor: f64,

    /// Fraction of bounding-box area a ring may lose before it is
    /// flagged as a suspicious area change (0.5 = more than half).
    pub area_shrink_threshold: f64,

    /// Handling of rings collapsed below four points.
    pub on_degenerate: DegenerateAction,

    /// Optimize the features of each batch on the rayon thread pool.
    pub parallel: bool,
}

impl SimplificationPolicy {
    /// Default base tolerance (about a metre in degrees).
    pub const DEFAULT_TOLERANCE: f64 = 1e-5;
    /// Default batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 500;
    /// Default adaptive search budget.
    pub const DEFAULT_MAX_ITERATIONS: usize = 10;
    /// Default adaptive step factor.
    pub const DEFAULT_STEP_FACTOR: f64 = 2.0;
    /// Default area-shrink warning threshold.
    pub const DEFAULT_AREA_SHRINK_THRESHOLD: f64 = 0.5;

    /// Inputs above this many bytes get [`Self::large_input`].
    pub const LARGE_INPUT_BYTES: u64 = 10 * 1024 * 1024;
    /// Batch size of the large-input preset.
    pub const LARGE_INPUT_BATCH_SIZE: usize = 1000;
    /// Feature cutoff of the large-input preset.
    pub const LARGE_INPUT_MAX_FEATURES: usize = 5000;

    /// Preset for very large inputs: adaptive with halved targets,
    /// bigger batches and a feature cutoff.
    #[must_use]
    pub fn large_input() -> Self {
        Self {
            adaptive: true,
            kind_targets: KindTargets::large_input(),
            max_features: Some(Self::LARGE_INPUT_MAX_FEATURES),
            batch_size: Self::LARGE_INPUT_BATCH_SIZE,
            ..Self::default()
        }
    }

    /// Pick a policy from the size of the source file in bytes.
    #[must_use]
    pub fn for_input_size(bytes: u64) -> Self {
        if bytes > Self::LARGE_INPUT_BYTES {
            Self::large_input()
        } else {
            Self::default()
        }
    }

    /// Target range for a sequence of the given kind, or `None` when
    /// the fixed tolerance applies.
    #[must_use]
    pub const fn target_for(&self, kind: TargetKind) -> Option<VertexRange> {
        if !self.adaptive {
            return None;
        }
        if let Some(range) = self.target_vertex_range {
            return Some(range);
        }
        let max = match kind {
            TargetKind::PolygonRing => self.kind_targets.polygon,
            TargetKind::LineString => self.kind_targets.line_string,
            TargetKind::Member => self.kind_targets.member,
        };
        Some(VertexRange::at_most(max))
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::InvalidPolicy`] naming the first invalid
    /// field.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid(format!(
                "tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if let Some(range) = self.target_vertex_range {
            if range.min > range.max {
                return Err(invalid(format!(
                    "target_vertex_range min ({}) exceeds max ({})",
                    range.min, range.max
                )));
            }
            if range.max < 2 {
                return Err(invalid(format!(
                    "target_vertex_range max must be >= 2, got {}",
                    range.max
                )));
            }
        }
        let targets = self.kind_targets;
        if targets.polygon < 2 || targets.line_string < 2 || targets.member < 2 {
            return Err(invalid(format!(
                "kind_targets must all be >= 2, got {targets:?}"
            )));
        }
        if self.max_features == Some(0) {
            return Err(invalid("max_features must be >= 1 when set".to_string()));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be >= 1".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be >= 1".to_string()));
        }
        if !self.step_factor.is_finite() || self.step_factor <= 1.0 {
            return Err(invalid(format!(
                "step_factor must be finite and > 1, got {}",
                self.step_factor
            )));
        }
        if !(self.area_shrink_threshold > 0.0 && self.area_shrink_threshold <= 1.0) {
            return Err(invalid(format!(
                "area_shrink_threshold must be in (0, 1], got {}",
                self.area_shrink_threshold
            )));
        }
        Ok(())
    }
}

impl Default for SimplificationPolicy {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            adaptive: false,
            target_vertex_range: None,
            kind_targets: KindTargets::default(),
            max_features: None,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            step_factor: Self::DEFAULT_STEP_FACTOR,
            area_shrink_threshold: Self::DEFAULT_AREA_SHRINK_THRESHOLD,
            on_degenerate: DegenerateAction::default(),
            parallel: false,
        }
    }
}

const fn invalid(msg: String) -> OptimizeError {
    OptimizeError::InvalidPolicy(msg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_invalid(policy: &SimplificationPolicy, needle: &str) {
        let OptimizeError::InvalidPolicy(msg) = policy.validate().unwrap_err();
        assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}");
    }

    #[test]
    fn default_is_valid() {
        assert!(SimplificationPolicy::default().validate().is_ok());
        assert!(SimplificationPolicy::large_input().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let p = SimplificationPolicy::default();
        assert!((p.tolerance - 1e-5).abs() < f64::EPSILON);
        assert!(!p.adaptive);
        assert_eq!(p.batch_size, 500);
        assert_eq!(p.max_iterations, 10);
        assert_eq!(p.on_degenerate, DegenerateAction::Drop);
        assert!(p.max_features.is_none());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let p = SimplificationPolicy {
            tolerance: -1.0,
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "tolerance");
    }

    #[test]
    fn nan_tolerance_rejected() {
        let p = SimplificationPolicy {
            tolerance: f64::NAN,
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "tolerance");
    }

    #[test]
    fn inverted_range_rejected() {
        let p = SimplificationPolicy {
            target_vertex_range: Some(VertexRange::new(100, 50)),
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "exceeds max");
    }

    #[test]
    fn zero_batch_size_rejected() {
        let p = SimplificationPolicy {
            batch_size: 0,
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "batch_size");
    }

    #[test]
    fn zero_max_features_rejected() {
        let p = SimplificationPolicy {
            max_features: Some(0),
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "max_features");
    }

    #[test]
    fn step_factor_must_grow() {
        let p = SimplificationPolicy {
            step_factor: 1.0,
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "step_factor");
    }

    #[test]
    fn area_threshold_bounds() {
        let p = SimplificationPolicy {
            area_shrink_threshold: 0.0,
            ..SimplificationPolicy::default()
        };
        assert_invalid(&p, "area_shrink_threshold");
        let p = SimplificationPolicy {
            area_shrink_threshold: 1.0,
            ..SimplificationPolicy::default()
        };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn target_for_fixed_tolerance_is_none() {
        let p = SimplificationPolicy::default();
        assert_eq!(p.target_for(TargetKind::LineString), None);
    }

    #[test]
    fn target_for_uses_kind_targets() {
        let p = SimplificationPolicy {
            adaptive: true,
            ..SimplificationPolicy::default()
        };
        assert_eq!(
            p.target_for(TargetKind::PolygonRing),
            Some(VertexRange::at_most(400))
        );
        assert_eq!(
            p.target_for(TargetKind::Member),
            Some(VertexRange::at_most(200))
        );
    }

    #[test]
    fn explicit_range_overrides_kind_targets() {
        let p = SimplificationPolicy {
            adaptive: true,
            target_vertex_range: Some(VertexRange::new(50, 100)),
            ..SimplificationPolicy::default()
        };
        assert_eq!(
            p.target_for(TargetKind::LineString),
            Some(VertexRange::new(50, 100))
        );
    }

    #[test]
    fn input_size_picks_preset() {
        assert_eq!(
            SimplificationPolicy::for_input_size(1024),
            SimplificationPolicy::default()
        );
        let large = SimplificationPolicy::for_input_size(11 * 1024 * 1024);
        assert!(large.adaptive);
        assert_eq!(large.max_features, Some(5000));
        assert_eq!(large.batch_size, 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: SimplificationPolicy =
            serde_json::from_str(r#"{"adaptive": true, "batch_size": 7}"#).unwrap();
        assert!(p.adaptive);
        assert_eq!(p.batch_size, 7);
        assert!((p.tolerance - 1e-5).abs() < f64::EPSILON);
    }

    #[test]
    fn range_distance() {
        let r = VertexRange::new(50, 100);
        assert_eq!(r.distance(75), 0);
        assert_eq!(r.distance(120), 20);
        assert_eq!(r.distance(10), 40);
        assert!(r.contains(50));
        assert!(!r.contains(101));
    }
}
