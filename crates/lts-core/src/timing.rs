use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

/// Latency percentiles per operation, collected across all threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    /// Per-operation timing statistics.
    pub operations: Vec<OpTiming>,
}

/// Timing statistics for a single named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: String,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
    pub count: usize,
}

/// Samples kept per operation between reports. Older samples are
/// overwritten once the buffer is full.
pub const MAX_SAMPLES_PER_OP: usize = 65_536;

/// Shared latency recorder.
///
/// Reads run on many threads at once, so samples go into one mutex-guarded
/// map rather than thread-local buffers. Recording is a no-op while
/// disabled. [`Timings::report`] drains what it summarizes.
#[derive(Debug, Default)]
pub struct Timings {
    enabled: AtomicBool,
    samples: Mutex<BTreeMap<&'static str, OpSamples>>,
}

/// Bounded sample buffer for one operation.
#[derive(Debug, Default)]
struct OpSamples {
    values: Vec<Duration>,
    seen: usize,
}

impl OpSamples {
    fn push(&mut self, elapsed: Duration) {
        if self.values.len() < MAX_SAMPLES_PER_OP {
            self.values.push(elapsed);
        } else {
            self.values[self.seen % MAX_SAMPLES_PER_OP] = elapsed;
        }
        self.seen += 1;
    }
}

/// Returns true when `LTS_TIMING` enables timing collection.
///
/// Supported truthy values: `1`, `true`, `yes`, `on` (case-insensitive).
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("LTS_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(value.as_str()))
}

impl Timings {
    /// A recorder that starts enabled or disabled.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            samples: Mutex::new(BTreeMap::new()),
        }
    }

    /// Enable or disable collection. Disabling drops recorded samples.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.clear();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Drop all recorded samples.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Run `f`, recording its duration under `name` when enabled.
    pub fn timed<R>(&self, name: &'static str, f: impl FnOnce() -> R) -> R {
        if !self.is_enabled() {
            return f();
        }

        let started = Instant::now();
        let result = f();
        self.record(name, started.elapsed());
        result
    }

    /// Record one sample directly.
    pub fn record(&self, name: &'static str, elapsed: Duration) {
        self.samples.lock().entry(name).or_default().push(elapsed);
    }

    /// Summarize and drain the samples recorded since the last report.
    ///
    /// `count` is the number of samples recorded; percentiles cover at most
    /// the last [`MAX_SAMPLES_PER_OP`] of them.
    #[must_use]
    pub fn report(&self) -> TimingReport {
        let samples = std::mem::take(&mut *self.samples.lock());
        let operations = samples
            .into_iter()
            .map(|(name, op)| {
                let mut sorted = op.values;
                sorted.sort_unstable();
                OpTiming {
                    name: name.to_string(),
                    p50: percentile(&sorted, 50),
                    p95: percentile(&sorted, 95),
                    p99: percentile(&sorted, 99),
                    max: sorted.last().copied().unwrap_or(Duration::ZERO),
                    count: op.seen,
                }
            })
            .collect();

        TimingReport { operations }
    }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Render the timing report as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_us": op.p50.as_micros(),
                    "p95_us": op.p95.as_micros(),
                    "p99_us": op.p99.as_micros(),
                    "max_us": op.max.as_micros(),
                })
            })
            .collect::<Vec<_>>();

        json!({ "operations": operations })
    }

    /// Render the timing report as a table for terminal output.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.operations.is_empty() {
            return "No timing samples recorded.".to_string();
        }

        let mut out = String::new();
        out.push_str("operation        count      p50      p95      p99      max\n");
        out.push_str("-----------------------------------------------------------\n");

        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<14} {:>7} {:>8} {:>8} {:>8} {:>8}",
                op.name,
                op.count,
                format_duration(op.p50),
                format_duration(op.p95),
                format_duration(op.p99),
                format_duration(op.max)
            );
        }

        out
    }
}

fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let rank = pct.min(100).saturating_mul(sorted.len()).saturating_add(99) / 100;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);

    sorted[index]
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros >= 1_000_000 {
        format!("{}.{:03}s", micros / 1_000_000, (micros % 1_000_000) / 1_000)
    } else if micros >= 1_000 {
        format!("{}.{:03}ms", micros / 1_000, micros % 1_000)
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|truthy| value.eq_ignore_ascii_case(truthy))
}
