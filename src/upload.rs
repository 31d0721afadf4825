use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval};
use url::Url;

use crate::client::{Update, probe_url};
use crate::error::Result;
use crate::params::{Params, UPLOAD_SPAN};
use crate::session::{Phase, PhaseState, Sample, megabits_per_sec};

pub async fn run(
    http: &reqwest::Client,
    base: &Url,
    params: &Params,
    state: Arc<PhaseState>,
    updates: &mpsc::Sender<Update>,
) -> f64 {
    // One filled body per phase; workers clone the handle per request.
    let mut rng = StdRng::from_os_rng();
    let mut buf = vec![0u8; params.upload_chunk_size];
    rng.fill_bytes(&mut buf);
    let chunk = Bytes::from(buf);

    for _ in 0..params.workers {
        tokio::spawn(worker(
            http.clone(),
            base.clone(),
            chunk.clone(),
            state.clone(),
        ));
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
                phase: Phase::Upload,
                bytes,
                elapsed_ms: elapsed.as_millis() as u64,
                mbps: megabits_per_sec(bytes, elapsed),
                progress: UPLOAD_SPAN.at(elapsed, params.phase_duration),
            }))
            .await;
        if elapsed >= params.phase_duration {
            state.stop();
            return megabits_per_sec(bytes, elapsed);
        }
    }
}

async fn worker(http: reqwest::Client, base: Url, chunk: Bytes, state: Arc<PhaseState>) {
    let size = chunk.len() as u64;
    while state.is_running() {
        // Only bodies the endpoint confirmed count toward the total.
        if push_once(&http, &base, chunk.clone()).await.is_ok() {
            state.record(size);
        }
    }
}

async fn push_once(http: &reqwest::Client, base: &Url, chunk: Bytes) -> Result<()> {
    let response = http
        .post(probe_url(base, "up"))
        .body(chunk)
        .send()
        .await?
        .error_for_status()?;
    // Receive the full confirmation so the endpoint has drained the body
    // before this connection is reused.
    response.bytes().await?;
    Ok(())
}
