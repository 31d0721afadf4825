use serde::Serialize;

/// Final figures of one measurement run. Stable once produced; a new run
/// starts from a fresh session.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Probe endpoint the run was measured against.
    pub server: String,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// Average download throughput in Mbit/s.
    pub download_mbps: f64,
    /// Average upload throughput in Mbit/s.
    pub upload_mbps: f64,
}
