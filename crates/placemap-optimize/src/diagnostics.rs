//! Run diagnostics: counts, per-feature problems and timing.
//!
//! Every run accumulates a [`RunSummary`]. For tuning and benchmarking,
//! [`optimize_with_diagnostics`] also measures wall-clock duration
//! through a caller-supplied [`Clock`], which keeps this crate free of
//! platform time sources.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{NoProgress, OptimizedFeature, optimize_features};
use crate::policy::SimplificationPolicy;
use crate::types::{DegenerateReason, Feature, GeometryFault, OptimizeError, PartKind};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for timed runs.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A malformed geometry that passed through unmodified.
///
/// There is one record per malformed geometry, so a multi-geometry with
/// two broken members produces two records against the same `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Input position of the feature.
    pub index: usize,
    /// Feature name, if it had one.
    pub name: Option<String>,
    /// `true` if the fault is in a collection member. The rest of the
    /// feature was still optimized.
    #[serde(default)]
    pub member: bool,
    /// What was wrong with it.
    pub fault: GeometryFault,
}

/// A feature removed from the output because its geometry degenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedFeature {
    /// Input position of the feature.
    pub index: usize,
    /// Feature name, if it had one.
    pub name: Option<String>,
    /// Why its geometry was dropped.
    pub reason: Option<DegenerateReason>,
}

/// A degenerate ring removed from a feature that was still emitted: a
/// collapsed hole, or a collapsed member of a multi-geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRing {
    /// Input position of the feature.
    pub index: usize,
    /// Feature name, if it had one.
    pub name: Option<String>,
    /// Which ring collapsed.
    pub part: PartKind,
    /// Why it was dropped.
    pub reason: DegenerateReason,
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Features in the input sequence.
    pub total_input: usize,
    /// Features processed (input minus the cutoff).
    pub processed: usize,
    /// Features emitted.
    pub output_count: usize,
    /// Vertices across all processed features before optimization.
    pub vertices_before: usize,
    /// Vertices across all emitted features after optimization.
    pub vertices_after: usize,
    /// Simplification passes across all sequences.
    pub iterations: usize,
    /// Rings that collapsed below four points.
    pub degenerate_rejections: usize,
    /// Rings flagged with a suspicious bounding-box shrink.
    pub area_warnings: usize,
    /// Malformed geometries, one per feature or collection member, in
    /// input order. See [`RunSummary::fault_count`] for a per-feature
    /// count.
    pub faults: Vec<FaultRecord>,
    /// Features dropped as degenerate, in input order.
    pub dropped: Vec<DroppedFeature>,
    /// Rings dropped from features that were still emitted, in input
    /// order.
    #[serde(default)]
    pub dropped_rings: Vec<DroppedRing>,
    /// `true` if `max_features` cut the input short.
    pub truncated: bool,
    /// Features skipped by the cutoff.
    pub truncated_count: usize,
}

impl RunSummary {
    /// Empty summary for a run over `total_input` features of which
    /// `limit` will be processed.
    #[must_use]
    pub fn new(total_input: usize, limit: usize) -> Self {
        let truncated_count = total_input.saturating_sub(limit);
        Self {
            total_input,
            truncated: truncated_count > 0,
            truncated_count,
            ..Self::default()
        }
    }

    /// Number of features with at least one fault.
    ///
    /// This can be lower than `faults.len()`, which counts every
    /// malformed collection member separately.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.faults.chunk_by(|a, b| a.index == b.index).count()
    }

    /// Fraction of vertices removed, in `[0, 1]`.
    #[must_use]
    pub fn reduction_ratio(&self) -> f64 {
        if self.vertices_before == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let kept = self.vertices_after as f64 / self.vertices_before as f64;
        1.0 - kept
    }
}

/// A run summary plus its wall-clock duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Counts and per-feature problems.
    pub summary: RunSummary,
}

impl RunDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let s = &self.summary;
        let mut lines = Vec::new();

        lines.push(format!("Optimization Report\n{}", "=".repeat(60)));
        lines.push(format!("Duration: {:.3}ms", duration_ms(self.duration)));
        lines.push(String::new());

        lines.push(format!(
            "Features: {} input, {} processed, {} output",
            s.total_input, s.processed, s.output_count,
        ));
        if s.truncated {
            lines.push(format!(
                "Truncated: {} features beyond max_features",
                s.truncated_count
            ));
        }
        lines.push(format!(
            "Vertices: {} -> {} ({:.1}% reduction)",
            s.vertices_before,
            s.vertices_after,
            s.reduction_ratio() * 100.0,
        ));
        lines.push(format!(
            "Passes: {}  |  Degenerate rings: {}  |  Area warnings: {}",
            s.iterations, s.degenerate_rejections, s.area_warnings,
        ));

        if !s.faults.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "Faults ({} in {} features)",
                s.faults.len(),
                s.fault_count()
            ));
            lines.push("-".repeat(60));
            for record in &s.faults {
                let scope = if record.member { "member: " } else { "" };
                lines.push(format!(
                    "#{:<8} {:<24} {scope}{}",
                    record.index,
                    record.name.as_deref().unwrap_or("-"),
                    record.fault,
                ));
            }
        }

        if !s.dropped.is_empty() {
            lines.push(String::new());
            lines.push(format!("Dropped ({})", s.dropped.len()));
            lines.push("-".repeat(60));
            for dropped in &s.dropped {
                let reason = dropped
                    .reason
                    .map_or_else(|| "degenerate".to_string(), |r| r.to_string());
                lines.push(format!(
                    "#{:<8} {:<24} {reason}",
                    dropped.index,
                    dropped.name.as_deref().unwrap_or("-"),
                ));
            }
        }

        if !s.dropped_rings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Dropped rings ({})", s.dropped_rings.len()));
            lines.push("-".repeat(60));
            for dropped in &s.dropped_rings {
                lines.push(format!(
                    "#{:<8} {:<24} {}: {}",
                    dropped.index,
                    dropped.name.as_deref().unwrap_or("-"),
                    dropped.part,
                    dropped.reason,
                ));
            }
        }

        lines.join("\n")
    }
}

/// Run an optimization to completion and time it.
///
/// # Errors
///
/// Returns [`OptimizeError::InvalidPolicy`] if `policy` is invalid.
pub fn optimize_with_diagnostics<C: Clock>(
    features: Vec<Feature>,
    policy: &SimplificationPolicy,
    clock: &C,
) -> Result<(Vec<OptimizedFeature>, RunDiagnostics), OptimizeError> {
    let start = clock.now();
    let run = optimize_features(features, policy, NoProgress)?.finish();
    let duration = clock.elapsed(&start);

    Ok((
        run.features,
        RunDiagnostics {
            duration,
            summary: run.summary,
        },
    ))
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::{Geometry, LineString, PartKind, Point};

    /// Clock that advances 5ms on every reading.
    struct StepClock(Cell<u64>);

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get() + 5;
            self.0.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn summary_new_tracks_truncation() {
        let s = RunSummary::new(10, 4);
        assert!(s.truncated);
        assert_eq!(s.truncated_count, 6);
        assert!(!RunSummary::new(10, 10).truncated);
    }

    #[test]
    fn reduction_ratio_of_empty_run_is_zero() {
        assert!(RunSummary::default().reduction_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn reduction_ratio_computes() {
        let s = RunSummary {
            vertices_before: 200,
            vertices_after: 50,
            ..RunSummary::default()
        };
        assert!((s.reduction_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn fault_count_is_per_feature() {
        let record = |index: usize| FaultRecord {
            index,
            name: None,
            member: true,
            fault: GeometryFault::EmptyCollection,
        };
        let s = RunSummary {
            faults: vec![record(2), record(2), record(2), record(9)],
            ..RunSummary::default()
        };
        assert_eq!(s.fault_count(), 2);
        assert_eq!(RunSummary::default().fault_count(), 0);
    }

    #[test]
    fn timed_run_uses_clock() {
        let features = vec![Feature::new(Geometry::LineString(LineString::new(
            (0..10).map(|i| Point::new(f64::from(i), 0.0)).collect(),
        )))];
        let (out, diag) = optimize_with_diagnostics(
            features,
            &SimplificationPolicy::default(),
            &StepClock(Cell::new(0)),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(diag.duration, Duration::from_millis(5));
        assert_eq!(diag.summary.vertices_after, 2);
    }

    #[test]
    fn report_lists_problems() {
        let diag = RunDiagnostics {
            duration: Duration::from_millis(12),
            summary: RunSummary {
                total_input: 10,
                processed: 8,
                output_count: 7,
                vertices_before: 1000,
                vertices_after: 250,
                iterations: 30,
                degenerate_rejections: 1,
                area_warnings: 0,
                faults: vec![
                    FaultRecord {
                        index: 3,
                        name: Some("Harbour".to_string()),
                        member: false,
                        fault: GeometryFault::TooFewPoints {
                            part: PartKind::ExteriorRing,
                            found: 1,
                            required: 4,
                        },
                    },
                    FaultRecord {
                        index: 6,
                        name: Some("Islands".to_string()),
                        member: true,
                        fault: GeometryFault::EmptyCollection,
                    },
                    FaultRecord {
                        index: 6,
                        name: Some("Islands".to_string()),
                        member: true,
                        fault: GeometryFault::TooFewDistinctVertices {
                            part: PartKind::ExteriorRing,
                            found: 2,
                        },
                    },
                ],
                dropped: vec![DroppedFeature {
                    index: 5,
                    name: None,
                    reason: Some(DegenerateReason::TooFewVertices { found: 3 }),
                }],
                dropped_rings: vec![DroppedRing {
                    index: 8,
                    name: Some("Old town".to_string()),
                    part: PartKind::InteriorRing,
                    reason: DegenerateReason::TooFewVertices { found: 3 },
                }],
                truncated: true,
                truncated_count: 2,
            },
        };

        let report = diag.report();
        assert!(report.contains("Optimization Report"));
        assert!(report.contains("75.0% reduction"));
        assert!(report.contains("Truncated: 2"));
        assert!(report.contains("Harbour"));
        assert!(report.contains("Faults (3 in 2 features)"));
        assert!(report.contains("member: exterior ring has 2 distinct vertices"));
        assert!(report.contains("Dropped (1)"));
        assert!(report.contains("Dropped rings (1)"));
        assert!(report.contains("interior ring: ring collapsed to 3 points"));
    }

    #[test]
    fn diagnostics_serialize_duration_as_seconds() {
        let diag = RunDiagnostics {
            duration: Duration::from_millis(1500),
            summary: RunSummary::default(),
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < f64::EPSILON);
        let back: RunDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
