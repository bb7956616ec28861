//! Batch feature processing.
//!
//! [`optimize_features`] turns an input sequence of features into a lazy
//! iterator of [`OptimizedFeature`]s. Features are pulled from the
//! source `batch_size` at a time, so at most one batch of inputs and
//! outputs is held in memory. Batch boundaries never affect results.
//!
//! With [`SimplificationPolicy::parallel`] each batch is optimized on the
//! rayon thread pool. Results are collected in input order and folded
//! into the [`RunSummary`] on the driving thread, so a parallel run is
//! indistinguishable from a sequential one.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{DroppedFeature, DroppedRing, FaultRecord, RunSummary};
use crate::dispatch::{DroppedPart, GeometryMetrics, optimize_geometry};
use crate::policy::SimplificationPolicy;
use crate::types::{DegenerateReason, Feature, GeometryFault, OptimizeError};

/// How far a run has got, reported after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Features processed so far.
    pub processed: usize,
    /// Features that will be processed in total (after the cutoff).
    pub total: usize,
}

impl Progress {
    /// Fraction complete in `[0, 1]`. An empty run is complete.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.processed as f64 / self.total as f64;
        fraction
    }
}

/// Receives [`Progress`] after each batch.
///
/// Implemented for closures, for [`Sender<Progress>`] (a disconnected
/// receiver is ignored), for [`NoProgress`] and for [`LogProgress`].
pub trait ProgressObserver {
    /// Called on the driving thread once per completed batch.
    fn on_progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressObserver for F {
    fn on_progress(&mut self, progress: Progress) {
        self(progress);
    }
}

impl ProgressObserver for Sender<Progress> {
    fn on_progress(&mut self, progress: Progress) {
        // The receiver may have stopped listening; the run goes on.
        let _ = self.send(progress);
    }
}

/// Observer that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: Progress) {}
}

/// Observer that logs progress at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, progress: Progress) {
        tracing::info!(
            processed = progress.processed,
            total = progress.total,
            "optimizing features: {:.0}%",
            progress.fraction() * 100.0,
        );
    }
}

/// One output feature and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedFeature {
    /// Position of the feature in the input sequence.
    pub index: usize,
    /// The optimized feature. Style, name and properties are untouched.
    pub feature: Feature,
    /// Vertex counts and search statistics.
    pub metrics: GeometryMetrics,
    /// Set when the geometry was malformed and passed through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<GeometryFault>,
    /// Faults of multi-geometry members that passed through unmodified
    /// while the rest of the collection was optimized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_faults: Vec<GeometryFault>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRun {
    /// Output features in input order.
    pub features: Vec<OptimizedFeature>,
    /// Aggregate statistics.
    pub summary: RunSummary,
}

/// Start a lazy optimization run over `features`.
///
/// The policy is validated before anything else happens; nothing is
/// pulled from `features` until the returned iterator is advanced.
///
/// # Errors
///
/// Returns [`OptimizeError::InvalidPolicy`] if `policy` is invalid.
pub fn optimize_features<I, O>(
    features: I,
    policy: &SimplificationPolicy,
    observer: O,
) -> Result<OptimizeFeatures<I::IntoIter, O>, OptimizeError>
where
    I: IntoIterator<Item = Feature>,
    I::IntoIter: ExactSizeIterator,
    O: ProgressObserver,
{
    policy.validate()?;

    let source = features.into_iter();
    let total_input = source.len();
    let limit = policy.max_features.map_or(total_input, |max| max.min(total_input));

    if limit < total_input {
        tracing::warn!(
            total_input,
            max_features = limit,
            "input exceeds max_features, truncating"
        );
    }

    Ok(OptimizeFeatures {
        source: source.take(limit),
        policy: policy.clone(),
        observer,
        buffer: VecDeque::with_capacity(policy.batch_size),
        next_index: 0,
        limit,
        summary: RunSummary::new(total_input, limit),
        batches: 0,
        exhausted: false,
    })
}

/// Lazy iterator returned by [`optimize_features`].
///
/// Yields one [`OptimizedFeature`] per surviving input feature, in input
/// order. Features dropped as degenerate are not yielded; they are
/// listed in [`RunSummary::dropped`].
pub struct OptimizeFeatures<I, O> {
    source: std::iter::Take<I>,
    policy: SimplificationPolicy,
    observer: O,
    buffer: VecDeque<OptimizedFeature>,
    next_index: usize,
    limit: usize,
    summary: RunSummary,
    batches: usize,
    exhausted: bool,
}

impl<I, O> OptimizeFeatures<I, O>
where
    I: Iterator<Item = Feature>,
    O: ProgressObserver,
{
    /// Statistics for the features processed so far.
    #[must_use]
    pub const fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Drain the remaining features and return them with the final
    /// summary.
    #[must_use]
    pub fn finish(mut self) -> OptimizedRun {
        let features: Vec<OptimizedFeature> = self.by_ref().collect();
        OptimizedRun {
            features,
            summary: self.summary,
        }
    }

    /// Pull and optimize the next batch into the buffer.
    fn fill(&mut self) {
        let start = self.next_index;
        let batch: Vec<(usize, Feature)> = self
            .source
            .by_ref()
            .take(self.policy.batch_size)
            .enumerate()
            .map(|(offset, feature)| (start + offset, feature))
            .collect();

        if batch.is_empty() {
            self.exhausted = true;
            log_summary(&self.summary, self.batches);
            return;
        }
        self.next_index += batch.len();
        self.batches += 1;

        let policy = &self.policy;
        let records: Vec<FeatureRecord> = if policy.parallel {
            batch
                .into_par_iter()
                .map(|(index, feature)| process_feature(index, feature, policy))
                .collect()
        } else {
            batch
                .into_iter()
                .map(|(index, feature)| process_feature(index, feature, policy))
                .collect()
        };

        tracing::debug!(
            batch = self.batches,
            features = records.len(),
            "batch optimized"
        );

        for record in records {
            self.record(record);
        }

        self.observer.on_progress(Progress {
            processed: self.summary.processed,
            total: self.limit,
        });
    }

    fn record(&mut self, record: FeatureRecord) {
        let summary = &mut self.summary;
        summary.processed += 1;
        summary.vertices_before += record.metrics.original_vertices;
        summary.vertices_after += record.metrics.final_vertices;
        summary.iterations += record.metrics.iterations;
        summary.degenerate_rejections += record.metrics.degenerate_rings;
        summary.area_warnings += record.metrics.area_warnings;

        summary
            .faults
            .extend(record.faults.into_iter().map(|fault| FaultRecord {
                index: record.index,
                name: record.name.clone(),
                member: record.member_faults,
                fault,
            }));
        summary
            .dropped_rings
            .extend(record.dropped_parts.into_iter().map(|part| DroppedRing {
                index: record.index,
                name: record.name.clone(),
                part: part.part,
                reason: part.reason,
            }));

        match record.output {
            Some(output) => {
                summary.output_count += 1;
                self.buffer.push_back(output);
            }
            None => summary.dropped.push(DroppedFeature {
                index: record.index,
                name: record.name,
                reason: record.dropped,
            }),
        }
    }
}

impl<I, O> Iterator for OptimizeFeatures<I, O>
where
    I: Iterator<Item = Feature>,
    O: ProgressObserver,
{
    type Item = OptimizedFeature;

    fn next(&mut self) -> Option<OptimizedFeature> {
        loop {
            if let Some(feature) = self.buffer.pop_front() {
                return Some(feature);
            }
            if self.exhausted {
                return None;
            }
            self.fill();
        }
    }
}

/// Per-feature result handed from the workers to the driving thread.
struct FeatureRecord {
    index: usize,
    name: Option<String>,
    metrics: GeometryMetrics,
    faults: Vec<GeometryFault>,
    /// `faults` belong to collection members, not the whole feature.
    member_faults: bool,
    output: Option<OptimizedFeature>,
    dropped: Option<DegenerateReason>,
    dropped_parts: Vec<DroppedPart>,
}

fn process_feature(index: usize, feature: Feature, policy: &SimplificationPolicy) -> FeatureRecord {
    let name = feature.name.clone();
    match optimize_geometry(&feature.geometry, policy) {
        Ok(outcome) => {
            for fault in &outcome.member_faults {
                tracing::warn!(index, ?name, %fault, "malformed member passed through");
            }
            for dropped in &outcome.dropped_parts {
                tracing::warn!(
                    index,
                    ?name,
                    part = %dropped.part,
                    reason = %dropped.reason,
                    "degenerate ring dropped"
                );
            }
            let output = outcome.geometry.map(|geometry| OptimizedFeature {
                index,
                feature: Feature {
                    geometry,
                    ..feature
                },
                metrics: outcome.metrics,
                fault: None,
                member_faults: outcome.member_faults.clone(),
            });
            if output.is_none() {
                tracing::warn!(
                    index,
                    ?name,
                    reason = ?outcome.dropped_reason,
                    "degenerate feature dropped"
                );
            }
            FeatureRecord {
                index,
                name,
                metrics: outcome.metrics,
                faults: outcome.member_faults,
                member_faults: true,
                output,
                dropped: outcome.dropped_reason,
                dropped_parts: outcome.dropped_parts,
            }
        }
        Err(fault) => {
            tracing::warn!(
                index,
                ?name,
                kind = %feature.geometry.kind(),
                %fault,
                "malformed feature passed through"
            );
            let metrics = GeometryMetrics::unchanged(&feature.geometry);
            FeatureRecord {
                index,
                name,
                metrics,
                faults: vec![fault.clone()],
                member_faults: false,
                output: Some(OptimizedFeature {
                    index,
                    feature,
                    metrics,
                    fault: Some(fault),
                    member_faults: Vec::new(),
                }),
                dropped: None,
                dropped_parts: Vec::new(),
            }
        }
    }
}

fn log_summary(summary: &RunSummary, batches: usize) {
    tracing::info!(
        processed = summary.processed,
        output = summary.output_count,
        batches,
        vertices_before = summary.vertices_before,
        vertices_after = summary.vertices_after,
        faults = summary.fault_count(),
        dropped = summary.dropped.len(),
        dropped_rings = summary.dropped_rings.len(),
        truncated = summary.truncated_count,
        "optimization finished, {:.1}% vertex reduction",
        summary.reduction_ratio() * 100.0,
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Geometry, LineString, Point, Ring};

    fn line(n: u32) -> Feature {
        Feature::new(Geometry::LineString(LineString::new(
            (0..n).map(|i| Point::new(f64::from(i), 0.0)).collect(),
        )))
    }

    fn features(n: usize) -> Vec<Feature> {
        (0..n)
            .map(|i| line(10).with_name(format!("line {i}")))
            .collect()
    }

    fn policy(batch_size: usize) -> SimplificationPolicy {
        SimplificationPolicy {
            tolerance: 0.1,
            batch_size,
            ..SimplificationPolicy::default()
        }
    }

    #[test]
    fn invalid_policy_rejected_before_reading() {
        let bad = SimplificationPolicy {
            batch_size: 0,
            ..SimplificationPolicy::default()
        };
        assert!(matches!(
            optimize_features(features(3), &bad, NoProgress),
            Err(OptimizeError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn yields_in_input_order() {
        let run = optimize_features(features(25), &policy(4), NoProgress)
            .unwrap()
            .finish();
        let indices: Vec<usize> = run.features.iter().map(|f| f.index).collect();
        assert_eq!(indices, (0..25).collect::<Vec<_>>());
        assert_eq!(run.summary.processed, 25);
        assert_eq!(run.summary.output_count, 25);
        assert_eq!(run.summary.vertices_before, 250);
        assert_eq!(run.summary.vertices_after, 50);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let run = optimize_features(Vec::new(), &policy(4), NoProgress)
            .unwrap()
            .finish();
        assert!(run.features.is_empty());
        assert_eq!(run.summary.total_input, 0);
    }

    #[test]
    fn cutoff_truncates_and_counts() {
        let p = SimplificationPolicy {
            max_features: Some(7),
            ..policy(3)
        };
        let run = optimize_features(features(20), &p, NoProgress)
            .unwrap()
            .finish();
        assert_eq!(run.features.len(), 7);
        assert!(run.summary.truncated);
        assert_eq!(run.summary.truncated_count, 13);
    }

    #[test]
    fn progress_reported_per_batch() {
        let mut seen = Vec::new();
        let run = optimize_features(features(10), &policy(4), |p: Progress| seen.push(p))
            .unwrap()
            .finish();
        assert_eq!(run.features.len(), 10);
        let processed: Vec<usize> = seen.iter().map(|p| p.processed).collect();
        assert_eq!(processed, vec![4, 8, 10]);
        assert!(seen.iter().all(|p| p.total == 10));
    }

    #[test]
    fn progress_over_channel() {
        let (tx, rx) = std::sync::mpsc::channel();
        let run = optimize_features(features(6), &policy(2), tx)
            .unwrap()
            .finish();
        assert_eq!(run.features.len(), 6);
        let last = rx.iter().last().unwrap();
        assert_eq!(last.processed, 6);
    }

    #[test]
    fn pulls_lazily() {
        let mut iter = optimize_features(features(100), &policy(10), NoProgress).unwrap();
        assert_eq!(iter.summary().processed, 0);
        let first = iter.next().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(iter.summary().processed, 10);
    }

    #[test]
    fn fault_passes_feature_through() {
        let bad = Feature::new(Geometry::LineString(LineString::new(vec![Point::new(
            1.0, 1.0,
        )])))
        .with_name("bad");
        let input = vec![line(10), bad.clone(), line(10)];
        let run = optimize_features(input, &policy(500), NoProgress)
            .unwrap()
            .finish();
        assert_eq!(run.features.len(), 3);
        assert_eq!(run.features[1].feature, bad);
        assert!(run.features[1].fault.is_some());
        assert_eq!(run.summary.fault_count(), 1);
        assert_eq!(run.summary.faults[0].index, 1);
        assert_eq!(run.summary.faults[0].name.as_deref(), Some("bad"));
    }

    #[test]
    fn degenerate_feature_dropped_from_output() {
        let sliver = Feature::new(Geometry::Polygon {
            exterior: Ring::new(vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 0.001),
                Point::new(0.0, 0.001),
            ]),
            interiors: vec![],
        });
        let input = vec![line(10), sliver, line(10)];
        let run = optimize_features(input, &policy(500), NoProgress)
            .unwrap()
            .finish();
        let indices: Vec<usize> = run.features.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(run.summary.dropped.len(), 1);
        assert_eq!(run.summary.dropped[0].index, 1);
        assert_eq!(run.summary.degenerate_rejections, 1);
    }

    #[test]
    fn member_faults_count_once_per_feature() {
        let stub = Geometry::LineString(LineString::new(vec![Point::new(0.0, 0.0)]));
        let islands = Feature::new(Geometry::MultiGeometry(vec![
            stub.clone(),
            Geometry::MultiGeometry(vec![]),
            line(10).geometry,
        ]))
        .with_name("islands");
        let run = optimize_features(vec![line(10), islands], &policy(500), NoProgress)
            .unwrap()
            .finish();

        assert_eq!(run.features.len(), 2);
        let out = &run.features[1];
        assert!(out.fault.is_none());
        assert_eq!(out.member_faults.len(), 2);
        assert_eq!(out.metrics.final_vertices, 1 + 2);
        assert_eq!(run.summary.faults.len(), 2);
        assert!(run.summary.faults.iter().all(|f| f.member && f.index == 1));
        assert_eq!(run.summary.fault_count(), 1);
    }

    #[test]
    fn dropped_hole_recorded_against_feature() {
        let square = |x: f64, y: f64, size: f64| {
            Ring::new(vec![
                Point::new(x, y),
                Point::new(x + size, y),
                Point::new(x + size, y + size),
                Point::new(x, y + size),
            ])
        };
        let courtyard = Ring::new(vec![
            Point::new(20.0, 20.0),
            Point::new(30.0, 20.0),
            Point::new(30.0, 20.001),
            Point::new(20.0, 20.001),
        ]);
        let block = Feature::new(Geometry::Polygon {
            exterior: square(0.0, 0.0, 100.0),
            interiors: vec![square(10.0, 10.0, 5.0), courtyard],
        })
        .with_name("block");
        let run = optimize_features(vec![line(10), block], &policy(500), NoProgress)
            .unwrap()
            .finish();

        assert_eq!(run.features.len(), 2);
        assert!(run.summary.dropped.is_empty());
        assert_eq!(run.summary.dropped_rings.len(), 1);
        let dropped = &run.summary.dropped_rings[0];
        assert_eq!(dropped.index, 1);
        assert_eq!(dropped.name.as_deref(), Some("block"));
        assert_eq!(dropped.part, crate::types::PartKind::InteriorRing);
        assert_eq!(dropped.reason, DegenerateReason::TooFewVertices { found: 3 });
    }

    #[test]
    fn parallel_matches_sequential() {
        let sequential = optimize_features(features(50), &policy(8), NoProgress)
            .unwrap()
            .finish();
        let p = SimplificationPolicy {
            parallel: true,
            ..policy(8)
        };
        let parallel = optimize_features(features(50), &p, NoProgress)
            .unwrap()
            .finish();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn progress_fraction() {
        let p = Progress {
            processed: 1,
            total: 4,
        };
        assert!((p.fraction() - 0.25).abs() < f64::EPSILON);
        let empty = Progress {
            processed: 0,
            total: 0,
        };
        assert!((empty.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
