//! placemap-bench: CLI tool for simplification policy experimentation.
//!
//! Runs the optimizer over a JSON feature file with configurable policy
//! parameters, printing run diagnostics. Useful for:
//!
//! - Comparing fixed-tolerance and adaptive runs
//! - Tuning tolerance, vertex targets and the search budget
//! - Measuring run duration and vertex reduction on real data
//! - Finding which features are malformed or collapse when simplified
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin placemap-bench -- [OPTIONS] <FEATURES_JSON>
//! ```
//!
//! Set `RUST_LOG` (for example `RUST_LOG=placemap_optimize=debug`) to see
//! per-batch and per-fault log lines on stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use placemap_optimize::diagnostics::{Clock, RunDiagnostics, optimize_with_diagnostics};
use placemap_optimize::{
    DegenerateAction, Feature, KindTargets, SimplificationPolicy, VertexRange,
};
use tracing_subscriber::EnvFilter;

/// Tolerances compared by `--sweep`.
const SWEEP_TOLERANCES: [f64; 6] = [1e-6, 5e-6, 1e-5, 5e-5, 1e-4, 5e-4];

/// Simplification policy experimentation and diagnostics for placemap.
///
/// Optimizes the features of a JSON file with configurable parameters
/// and prints vertex counts, faults and timing.
#[derive(Parser)]
#[command(name = "placemap-bench", version)]
struct Cli {
    /// Path to a JSON array of features.
    features_path: PathBuf,

    /// Base RDP tolerance in coordinate units.
    #[arg(long, default_value_t = SimplificationPolicy::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Search for a per-geometry tolerance that meets the vertex targets.
    #[arg(long)]
    adaptive: bool,

    /// Lower bound of an explicit target vertex range (needs --target-max).
    #[arg(long, requires = "target_max")]
    target_min: Option<usize>,

    /// Upper bound of an explicit target vertex range.
    #[arg(long)]
    target_max: Option<usize>,

    /// Adaptive upper target for polygon rings.
    #[arg(long, default_value_t = KindTargets::DEFAULT_POLYGON)]
    polygon_target: usize,

    /// Adaptive upper target for line strings.
    #[arg(long, default_value_t = KindTargets::DEFAULT_LINE_STRING)]
    line_target: usize,

    /// Adaptive upper target for multi-geometry members.
    #[arg(long, default_value_t = KindTargets::DEFAULT_MEMBER)]
    member_target: usize,

    /// Process at most this many features.
    #[arg(long)]
    max_features: Option<usize>,

    /// Features held in memory per batch.
    #[arg(long, default_value_t = SimplificationPolicy::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Adaptive search budget per sequence.
    #[arg(long, default_value_t = SimplificationPolicy::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Adaptive multiplicative tolerance step.
    #[arg(long, default_value_t = SimplificationPolicy::DEFAULT_STEP_FACTOR)]
    step_factor: f64,

    /// Bounding-box area fraction a ring may lose before a warning.
    #[arg(long, default_value_t = SimplificationPolicy::DEFAULT_AREA_SHRINK_THRESHOLD)]
    area_shrink_threshold: f64,

    /// Keep the original ring when simplification collapses it.
    #[arg(long)]
    keep_degenerate: bool,

    /// Optimize each batch on all cores.
    #[arg(long)]
    parallel: bool,

    /// Use the large-input preset. Other policy flags are ignored.
    #[arg(long, conflicts_with = "auto_preset")]
    large_input: bool,

    /// Pick the preset from the input file size. Other policy flags are
    /// ignored.
    #[arg(long)]
    auto_preset: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Write the optimized features of the first run to this file as JSON.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Compare total vertices across a fixed ladder of tolerances.
    #[arg(long)]
    sweep: bool,

    /// Full simplification policy as a JSON string.
    ///
    /// When provided, all other policy flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`SimplificationPolicy`] from CLI arguments.
///
/// `--config-json` wins over the presets, which win over the individual
/// parameter flags.
fn policy_from_cli(cli: &Cli, input_bytes: u64) -> Result<SimplificationPolicy, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if cli.large_input {
        return Ok(SimplificationPolicy::large_input());
    }
    if cli.auto_preset {
        return Ok(SimplificationPolicy::for_input_size(input_bytes));
    }

    Ok(SimplificationPolicy {
        tolerance: cli.tolerance,
        adaptive: cli.adaptive,
        target_vertex_range: cli
            .target_max
            .map(|max| VertexRange::new(cli.target_min.unwrap_or(0), max)),
        kind_targets: KindTargets {
            polygon: cli.polygon_target,
            line_string: cli.line_target,
            member: cli.member_target,
        },
        max_features: cli.max_features,
        batch_size: cli.batch_size,
        max_iterations: cli.max_iterations,
        step_factor: cli.step_factor,
        area_shrink_threshold: cli.area_shrink_threshold,
        on_degenerate: if cli.keep_degenerate {
            DegenerateAction::KeepOriginal
        } else {
            DegenerateAction::Drop
        },
        parallel: cli.parallel,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let bytes = match std::fs::read(&cli.features_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.features_path.display());
            return ExitCode::FAILURE;
        }
    };

    let features: Vec<Feature> = match serde_json::from_slice(&bytes) {
        Ok(features) => features,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", cli.features_path.display());
            return ExitCode::FAILURE;
        }
    };

    let input_bytes = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    let policy = match policy_from_cli(&cli, input_bytes) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = policy.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    eprintln!(
        "Input: {} ({} bytes, {} features)",
        cli.features_path.display(),
        bytes.len(),
        features.len(),
    );
    eprintln!("Policy: {policy:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    if cli.sweep {
        return sweep(&features, &policy);
    }

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match optimize_with_diagnostics(features.clone(), &policy, &StdClock) {
            Ok((optimized, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write features on the first run only.
                if run == 0
                    && let Some(ref path) = cli.output
                {
                    let out: Vec<&Feature> = optimized.iter().map(|o| &o.feature).collect();
                    let written = serde_json::to_vec_pretty(&out)
                        .map_err(|e| e.to_string())
                        .and_then(|json| {
                            std::fs::write(path, &json)
                                .map(|()| json.len())
                                .map_err(|e| e.to_string())
                        });
                    match written {
                        Ok(len) => eprintln!("Features written to {} ({len} bytes)", path.display()),
                        Err(e) => eprintln!("Error writing features to {}: {e}", path.display()),
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Optimization error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Run a fixed-tolerance pass at each sweep tolerance and tabulate the
/// vertex counts.
fn sweep(features: &[Feature], base: &SimplificationPolicy) -> ExitCode {
    println!("Tolerance Sweep\n{}", "=".repeat(60));
    println!(
        "{:>12} {:>12} {:>12} {:>11} {:>10}",
        "Tolerance", "Before", "After", "Reduction", "Duration"
    );
    println!("{}", "-".repeat(60));

    for tolerance in SWEEP_TOLERANCES {
        let policy = SimplificationPolicy {
            tolerance,
            adaptive: false,
            ..base.clone()
        };
        match optimize_with_diagnostics(features.to_vec(), &policy, &StdClock) {
            Ok((_, diag)) => {
                let s = &diag.summary;
                println!(
                    "{tolerance:>12.0e} {:>12} {:>12} {:>10.1}% {:>8.3}ms",
                    s.vertices_before,
                    s.vertices_after,
                    s.reduction_ratio() * 100.0,
                    diag.duration.as_secs_f64() * 1000.0,
                );
            }
            Err(e) => {
                eprintln!("Optimization error at tolerance {tolerance:e}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let features = all_diagnostics
        .iter()
        .map(|d| d.summary.processed as f64)
        .sum::<f64>()
        / all_diagnostics.len() as f64;
    if mean > 0.0 {
        println!("Throughput: {:.0} features/s", features / (mean / 1000.0));
    }
}
