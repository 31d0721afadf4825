//! Parallel-connection HTTP speed test.
//!
//! Measures round-trip latency, download throughput, and upload throughput
//! against a probe endpoint, using several concurrent HTTP connections per
//! throughput phase so a single stream's TCP ramp-up or head-of-line
//! blocking does not cap the estimate. The crate ships both halves: the
//! stateless [`server::ProbeServer`] answering ping, download, and upload
//! probes, and the [`client::Engine`] driving the three measurement phases.
//!
//! # Quick start
//!
//! ```no_run
//! use speedprobe::client::Engine;
//! use speedprobe::params::Params;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new("http://127.0.0.1:8080/", Params::default())?;
//! let (mut updates, run) = engine.start();
//! while let Some(update) = updates.recv().await {
//!     println!("{:?}", update);
//! }
//! let summary = run.await??;
//! println!(
//!     "{} ms, {:.1} Mbit/s down, {:.1} Mbit/s up",
//!     summary.latency_ms, summary.download_mbps, summary.upload_mbps
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod download;
pub mod emitter;
pub mod error;
pub mod params;
pub mod server;
pub mod session;
pub mod summary;
pub mod upload;
