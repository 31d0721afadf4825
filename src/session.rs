//! Measurement session state and derived statistics.
//!
//! A [`Session`] lives for one test run. It owns one [`PhaseState`] per
//! throughput phase: the atomic byte counter all workers of that phase feed,
//! and the shared stop flag they poll between requests. Download and upload
//! never share state, and nothing here outlives the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stage of a measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No run in progress.
    Idle,
    /// Round-trip latency probe.
    Ping,
    /// Concurrent download measurement.
    Download,
    /// Concurrent upload measurement.
    Upload,
    /// Run finished, results stable.
    Done,
}

/// Shared state of one throughput phase.
///
/// Workers add completed request sizes to the counter and keep looping while
/// the running flag holds; the sampler flips the flag once the time budget
/// is spent. Increments are commutative, so relaxed ordering suffices — a
/// worker's own increment is sequenced before its next request by program
/// order alone.
#[derive(Debug)]
pub struct PhaseState {
    bytes: AtomicU64,
    running: AtomicBool,
}

impl PhaseState {
    /// Fresh state: zero bytes counted, workers armed to run.
    pub fn new() -> Self {
        PhaseState {
            bytes: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }

    /// Add the size of one completed request.
    pub fn record(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Current counter value.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Whether workers should keep issuing requests.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Tell workers to exit after their in-flight request completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Zero the counter and re-arm the running flag.
    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run container for the two throughput phases.
#[derive(Debug, Default)]
pub struct Session {
    /// Download phase counter and stop flag.
    pub download: Arc<PhaseState>,
    /// Upload phase counter and stop flag.
    pub upload: Arc<PhaseState>,
}

impl Session {
    /// Fresh session with both phases armed.
    pub fn new() -> Self {
        Session::default()
    }

    /// Clear both counters and re-arm both flags for a new run. No value
    /// from a previous run survives this.
    pub fn reset(&self) {
        self.download.reset();
        self.upload.reset();
    }
}

/// One periodic snapshot of an active throughput phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Phase the snapshot belongs to.
    pub phase: Phase,
    /// Bytes transferred since the phase started.
    pub bytes: u64,
    /// Milliseconds elapsed since the phase started.
    pub elapsed_ms: u64,
    /// Current speed estimate in Mbit/s.
    pub mbps: f64,
    /// Overall progress percentage, mapped into this phase's span.
    pub progress: f64,
}

/// Upload probe confirmation body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Bytes the endpoint drained and discarded.
    pub received: u64,
}

/// Speed over a window in megabits per second, with 1 MiB as the divisor
/// base. Zero elapsed time yields zero rather than a division error.
pub fn megabits_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / (1024.0 * 1024.0)
}

/// A phase's slice of the overall 0–100 progress range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSpan {
    /// Percentage where this phase begins.
    pub start: f64,
    /// Percentage where this phase ends.
    pub end: f64,
}

impl ProgressSpan {
    /// Progress at `elapsed` into a phase of length `duration`, pinned to
    /// the span's end once the duration has passed.
    pub fn at(&self, elapsed: Duration, duration: Duration) -> f64 {
        if duration.is_zero() {
            return self.end;
        }
        let frac = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
        self.start + frac * (self.end - self.start)
    }
}
