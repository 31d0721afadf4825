//! Concurrent download measurement.
//!
//! A fixed pool of workers fetches the endpoint's payload in a tight loop
//! while a sampler turns the shared byte counter into periodic speed
//! estimates and ends the phase when the time budget is spent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval};
use url::Url;

use crate::client::{Update, probe_url};
use crate::error::Result;
use crate::params::{DOWNLOAD_SPAN, Params};
use crate::session::{Phase, PhaseState, Sample, megabits_per_sec};

/// Run the download phase and return its average speed in Mbit/s.
///
/// The result is taken from the counter at the instant the stop flag flips,
/// so worker exit timing never affects it; in-flight requests are left to
/// finish on their own.
pub async fn run(
    http: &reqwest::Client,
    base: &Url,
    params: &Params,
    state: Arc<PhaseState>,
    updates: &mpsc::Sender<Update>,
) -> f64 {
    for _ in 0..params.workers {
        tokio::spawn(worker(http.clone(), base.clone(), state.clone()));
    }

    let start = Instant::now();
    let mut ticker = interval(params.sample_interval);
    ticker.tick().await; // first tick resolves immediately

    loop {
        ticker.tick().await;
        let elapsed = start.elapsed();
        let bytes = state.bytes();
        let _ = updates
            .send(Update::Sample(Sample {
                phase: Phase::Download,
                bytes,
                elapsed_ms: elapsed.as_millis() as u64,
                mbps: megabits_per_sec(bytes, elapsed),
                progress: DOWNLOAD_SPAN.at(elapsed, params.phase_duration),
            }))
            .await;
        if elapsed >= params.phase_duration {
            state.stop();
            return megabits_per_sec(bytes, elapsed);
        }
    }
}

async fn worker(http: reqwest::Client, base: Url, state: Arc<PhaseState>) {
    while state.is_running() {
        // A failed attempt is not counted; the loop just tries again.
        if let Ok(n) = fetch_once(&http, &base).await {
            state.record(n);
        }
    }
}

async fn fetch_once(http: &reqwest::Client, base: &Url) -> Result<u64> {
    let response = http
        .get(probe_url(base, "down"))
        .send()
        .await?
        .error_for_status()?;
    let body = response.bytes().await?;
    Ok(body.len() as u64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // Nothing listens on the target port: every request fails, workers must
    // retry, and the sampler must still end the phase on schedule with
    // nothing counted.
    #[tokio::test]
    async fn transport_errors_never_abort_the_phase() {
        let params = Params {
            workers: 2,
            phase_duration: Duration::from_millis(300),
            sample_interval: Duration::from_millis(100),
            ..Params::default()
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let base = Url::parse("http://127.0.0.1:1/").unwrap();
        let state = Arc::new(PhaseState::new());
        let (tx, _rx) = mpsc::channel(64);

        let started = Instant::now();
        let mbps = run(&http, &base, &params, state.clone(), &tx).await;

        assert_eq!(mbps, 0.0);
        assert_eq!(state.bytes(), 0);
        assert!(started.elapsed() >= params.phase_duration);
        assert!(!state.is_running());
    }
}
