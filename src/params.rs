//! Tuning constants and run parameters.

use std::time::Duration;

use crate::session::ProgressSpan;

/// Size of the shared download payload buffer (16 MiB).
pub const PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Byte value the payload buffer is filled with.
pub const PAYLOAD_FILL: u8 = b'x';

/// Size of one upload request body (1 MiB).
pub const UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// Concurrent connections per throughput phase. Enough streams to saturate
/// the link past single-connection TCP ramp-up, few enough to not exhaust
/// local sockets.
pub const WORKER_COUNT: usize = 6;

/// Time budget of each throughput phase.
pub const PHASE_DURATION: Duration = Duration::from_secs(10);

/// Interval between speed samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Deadline for a single probe request. Must leave room for a full payload
/// transfer on a slow link, while bounding how far a stalled connection can
/// hold a worker past the phase boundary.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the endpoint keeps an idle keep-alive connection open.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress share of the download phase. The slice below its start covers
/// the latency probe.
pub const DOWNLOAD_SPAN: ProgressSpan = ProgressSpan {
    start: 5.0,
    end: 55.0,
};

/// Progress share of the upload phase.
pub const UPLOAD_SPAN: ProgressSpan = ProgressSpan {
    start: 55.0,
    end: 100.0,
};

/// Run parameters. Defaults come from the constants above; the CLI exposes
/// each one as a flag.
#[derive(Debug, Clone)]
pub struct Params {
    /// Download payload size served by the endpoint, in bytes.
    pub payload_size: usize,
    /// Upload request body size, in bytes.
    pub upload_chunk_size: usize,
    /// Concurrent worker loops per throughput phase.
    pub workers: usize,
    /// Time budget of each throughput phase.
    pub phase_duration: Duration,
    /// Sampler tick interval.
    pub sample_interval: Duration,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            payload_size: PAYLOAD_SIZE,
            upload_chunk_size: UPLOAD_CHUNK_SIZE,
            workers: WORKER_COUNT,
            phase_duration: PHASE_DURATION,
            sample_interval: SAMPLE_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}
