use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::download;
use crate::error::{ProbeError, Result};
use crate::params::{self, Params};
use crate::session::{Phase, Sample, Session};
use crate::summary::Summary;
use crate::upload;

/// Progress events sent while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A phase is about to begin.
    Starting(Phase),
    /// Result of the latency probe, in milliseconds.
    Latency(u64),
    /// Periodic throughput snapshot.
    Sample(Sample),
    /// A phase finished.
    Complete(Phase),
}

/// Drives a full measurement run against one probe endpoint.
pub struct Engine {
    http: reqwest::Client,
    base: Url,
    params: Params,
}

impl Engine {
    /// Build an engine for the endpoint at `server`.
    pub fn new(server: &str, params: Params) -> Result<Self> {
        if params.workers == 0 {
            return Err(ProbeError::Config(
                "worker count must be at least 1".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(params.request_timeout)
            .connect_timeout(params::CONNECT_TIMEOUT)
            .build()?;
        let base = Url::parse(server)?;
        Ok(Engine { http, base, params })
    }

    /// Spawn [`run`](Self::run) and return the update stream plus a handle
    /// resolving to the final summary.
    pub fn start(self) -> (mpsc::Receiver<Update>, JoinHandle<Result<Summary>>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move { self.run(tx).await });
        (rx, handle)
    }

    /// Run the latency, download, and upload phases in order.
    ///
    /// Individual probe failures inside the throughput phases are retried by
    /// the workers and never surface here; an error return means the run
    /// itself could not proceed (unreachable endpoint, bad configuration).
    pub async fn run(&self, updates: mpsc::Sender<Update>) -> Result<Summary> {
        let session = Session::new();

        let _ = updates.send(Update::Starting(Phase::Ping)).await;
        let latency_ms = self.measure_latency().await?;
        let _ = updates.send(Update::Latency(latency_ms)).await;

        let _ = updates.send(Update::Starting(Phase::Download)).await;
        let download_mbps = download::run(
            &self.http,
            &self.base,
            &self.params,
            session.download.clone(),
            &updates,
        )
        .await;
        let _ = updates.send(Update::Complete(Phase::Download)).await;

        let _ = updates.send(Update::Starting(Phase::Upload)).await;
        let upload_mbps = upload::run(
            &self.http,
            &self.base,
            &self.params,
            session.upload.clone(),
            &updates,
        )
        .await;
        let _ = updates.send(Update::Complete(Phase::Upload)).await;

        Ok(Summary {
            server: self.base.to_string(),
            latency_ms,
            download_mbps,
            upload_mbps,
        })
    }

    /// One cache-busted ping, timed from send to full body receipt.
    async fn measure_latency(&self) -> Result<u64> {
        let url = probe_url(&self.base, "ping");
        let start = Instant::now();
        let response = self.http.get(url).send().await?.error_for_status()?;
        response.bytes().await?;
        Ok(start.elapsed().as_millis() as u64)
    }
}

/// Probe URL with a fresh cache-busting nonce. GET request identity must
/// differ on every call so no intermediary can answer from cache.
pub(crate) fn probe_url(base: &Url, mode: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("mode", mode)
        .append_pair("r", &rand::random::<u64>().to_string());
    url
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::server::ProbeServer;

    fn quick_params() -> Params {
        Params {
            payload_size: 256 * 1024,
            upload_chunk_size: 64 * 1024,
            workers: 3,
            phase_duration: Duration::from_millis(400),
            sample_interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn probe_urls_are_unique_per_call() {
        let base = Url::parse("http://127.0.0.1:8080/").unwrap();
        let first = probe_url(&base, "down");
        let second = probe_url(&base, "down");
        assert!(first.query().unwrap().contains("mode=down"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn zero_workers_is_a_config_error() {
        let params = Params {
            workers: 0,
            ..Params::default()
        };
        assert!(matches!(
            Engine::new("http://127.0.0.1:8080/", params),
            Err(ProbeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn bad_server_url_is_rejected() {
        assert!(matches!(
            Engine::new("not a url", Params::default()),
            Err(ProbeError::BadUrl(_))
        ));
    }

    #[tokio::test]
    async fn full_run_reaches_progress_bounds() {
        let params = quick_params();
        let server = ProbeServer::bind("127.0.0.1:0".parse().unwrap(), &params)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let engine = Engine::new(&format!("http://{addr}/"), params).unwrap();
        let (mut updates, run) = engine.start();

        let mut samples = Vec::new();
        while let Some(update) = updates.recv().await {
            if let Update::Sample(sample) = update {
                samples.push(sample);
            }
        }
        let summary = run.await.unwrap().unwrap();

        assert!(summary.download_mbps > 0.0);
        assert!(summary.upload_mbps > 0.0);

        let last_download = samples
            .iter()
            .rfind(|s| s.phase == Phase::Download)
            .unwrap();
        let last_upload = samples.iter().rfind(|s| s.phase == Phase::Upload).unwrap();
        assert_eq!(last_download.progress, 55.0);
        assert_eq!(last_upload.progress, 100.0);
    }
}
