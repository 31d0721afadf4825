//! Probe endpoint: a stateless HTTP responder for speed test probes.
//!
//! One payload buffer is built when the server binds and served verbatim to
//! every download probe; upload probes drain and count the request body;
//! anything else falls through to the embedded host page. Connections are
//! keep-alive so a measurement run can reuse them across probes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::timeout;

use crate::error::Result;
use crate::params::{self, Params};
use crate::session::UploadAck;

const MAX_REQUEST_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;

const PONG: &[u8] = b"pong";

/// Headers shared by every probe response: cross-origin access open (probes
/// are issued by scripts served from anywhere) and caching off at every
/// layer, or a cached answer would be measured instead of the link.
const PROBE_HEADERS: &str = "Access-Control-Allow-Origin: *\r\nCache-Control: no-store, no-cache, must-revalidate\r\nPragma: no-cache\r\n";

const INDEX_HTML: &str = "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>speedprobe</title></head>\n<body>\n<h1>speedprobe</h1>\n<p>This endpoint answers speed test probes.</p>\n<ul>\n<li><code>GET /?mode=ping</code> &mdash; latency probe</li>\n<li><code>GET /?mode=down</code> &mdash; download probe</li>\n<li><code>POST /?mode=up</code> &mdash; upload probe</li>\n</ul>\n</body>\n</html>\n";

struct State {
    payload: Bytes,
}

/// A bound probe endpoint, ready to serve.
pub struct ProbeServer {
    listener: TcpListener,
    state: Arc<State>,
}

impl ProbeServer {
    /// Bind `addr` and build the payload buffer.
    ///
    /// The buffer is filled once here and shared read-only by every
    /// connection for the life of the process.
    pub async fn bind(addr: SocketAddr, params: &Params) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let payload = Bytes::from(vec![params::PAYLOAD_FILL; params.payload_size]);
        Ok(ProbeServer {
            listener,
            state: Arc::new(State { payload }),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    let _ = stream.set_nodelay(true);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        let _ = serve_connection(stream, state).await;
                    });
                }
                _ = shutdown_signal() => break,
            }
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

struct Request<'a> {
    method: &'a str,
    target: &'a str,
    version: &'a str,
}

async fn serve_connection(mut stream: TcpStream, state: Arc<State>) -> Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut request_line = String::new();
        match timeout(params::IDLE_TIMEOUT, reader.read_line(&mut request_line)).await {
            Ok(Ok(0)) | Err(_) => break, // closed, or idle too long
            Ok(Err(_)) => break,
            Ok(Ok(n)) if n > MAX_REQUEST_LINE => {
                write_simple(&mut write_half, "400 Bad Request", "request line too long").await?;
                break;
            }
            Ok(Ok(_)) => {}
        }

        let line = request_line.trim();
        if line.is_empty() {
            continue; // keep-alive, wait for the next request
        }
        let Some(request) = parse_request_line(line) else {
            write_simple(&mut write_half, "400 Bad Request", "malformed request").await?;
            break;
        };

        let mut content_length: u64 = 0;
        let mut keep_alive = request.version == "HTTP/1.1";
        let mut header = String::new();
        let mut header_count = 0;
        loop {
            header.clear();
            match reader.read_line(&mut header).await {
                Ok(0) | Err(_) => return Ok(()),
                Ok(_) => {}
            }
            let line = header.trim();
            if line.is_empty() {
                break;
            }
            header_count += 1;
            if header_count > MAX_HEADERS {
                write_simple(&mut write_half, "400 Bad Request", "too many headers").await?;
                return Ok(());
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().unwrap_or(0);
                } else if name.eq_ignore_ascii_case("connection") {
                    keep_alive = !value.eq_ignore_ascii_case("close")
                        && (request.version == "HTTP/1.1"
                            || value.eq_ignore_ascii_case("keep-alive"));
                }
            }
        }

        match handle_request(&mut reader, &mut write_half, &request, content_length, &state).await {
            Ok(()) => {
                if !keep_alive {
                    break;
                }
            }
            Err(fault) => {
                // Never fail silently mid-exchange: the peer gets the fault
                // text, then the connection closes.
                let _ = write_simple(
                    &mut write_half,
                    "500 Internal Server Error",
                    &fault.to_string(),
                )
                .await;
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request<R, W>(
    reader: &mut R,
    writer: &mut W,
    request: &Request<'_>,
    content_length: u64,
    state: &State,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mode = query_param(request.target, "mode");
    match (request.method, mode) {
        ("GET", Some("ping")) => write_probe(writer, "text/plain", PONG).await,
        ("GET", Some("down")) => {
            write_probe(writer, "application/octet-stream", &state.payload).await
        }
        ("POST", Some("up")) => {
            // Fully drain before answering, so the client cannot reuse this
            // connection while bytes are still in flight.
            let received = drain_body(reader, content_length).await?;
            let ack = serde_json::to_vec(&UploadAck { received })?;
            write_probe(writer, "application/json", &ack).await
        }
        _ => {
            if content_length > 0 {
                drain_body(reader, content_length).await?;
            }
            write_page(writer).await
        }
    }
}

/// Read and discard exactly `length` body bytes, counting them. A peer that
/// closes early yields the count actually read.
async fn drain_body<R: AsyncRead + Unpin>(reader: &mut R, length: u64) -> std::io::Result<u64> {
    let mut scratch = [0u8; 16 * 1024];
    let mut received: u64 = 0;
    let mut remaining = length;
    while remaining > 0 {
        let want = scratch.len().min(remaining as usize);
        let n = reader.read(&mut scratch[..want]).await?;
        if n == 0 {
            break;
        }
        received += n as u64;
        remaining -= n as u64;
    }
    Ok(received)
}

fn parse_request_line(line: &str) -> Option<Request<'_>> {
    let mut parts = line.split_whitespace();
    let request = Request {
        method: parts.next()?,
        target: parts.next()?,
        version: parts.next()?,
    };
    parts.next().is_none().then_some(request)
}

fn query_param<'a>(target: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

async fn write_probe<W: AsyncWrite + Unpin>(
    writer: &mut W,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: keep-alive\r\n\r\n",
        content_type,
        body.len(),
        PROBE_HEADERS,
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_page<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n",
        INDEX_HTML.len(),
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(INDEX_HTML.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_simple<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: &str,
    body: &str,
) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len(),
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Params {
        Params {
            payload_size: 64 * 1024,
            upload_chunk_size: 16 * 1024,
            ..Params::default()
        }
    }

    async fn spawn_endpoint(params: &Params) -> SocketAddr {
        let server = ProbeServer::bind("127.0.0.1:0".parse().unwrap(), params)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[test]
    fn request_line_parsing() {
        let request = parse_request_line("GET /?mode=down HTTP/1.1").unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/?mode=down");
        assert_eq!(request.version, "HTTP/1.1");
        assert!(parse_request_line("GET /").is_none());
        assert!(parse_request_line("GET / HTTP/1.1 extra").is_none());
    }

    #[test]
    fn query_params_found_by_key() {
        assert_eq!(query_param("/?mode=ping&r=42", "mode"), Some("ping"));
        assert_eq!(query_param("/?r=42&mode=up", "mode"), Some("up"));
        assert_eq!(query_param("/?flag", "flag"), Some(""));
        assert_eq!(query_param("/", "mode"), None);
        assert_eq!(query_param("/?other=1", "mode"), None);
    }

    #[tokio::test]
    async fn ping_answers_pong_without_caching() {
        let addr = spawn_endpoint(&small_params()).await;
        let response = reqwest::get(format!("http://{addr}/?mode=ping&r=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(
            response.headers()["cache-control"]
                .to_str()
                .unwrap()
                .contains("no-store")
        );
        assert_eq!(response.text().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn download_probe_size_is_constant() {
        let params = small_params();
        let addr = spawn_endpoint(&params).await;
        let client = reqwest::Client::new();
        for nonce in 0..3 {
            let response = client
                .get(format!("http://{addr}/?mode=down&r={nonce}"))
                .send()
                .await
                .unwrap();
            assert_eq!(
                response.headers()["content-type"],
                "application/octet-stream"
            );
            let body = response.bytes().await.unwrap();
            assert_eq!(body.len(), params.payload_size);
        }
    }

    #[tokio::test]
    async fn upload_probe_counts_exactly() {
        let params = small_params();
        let addr = spawn_endpoint(&params).await;
        let client = reqwest::Client::new();
        for size in [0usize, 1, params.upload_chunk_size] {
            let ack: UploadAck = client
                .post(format!("http://{addr}/?mode=up&r={size}"))
                .body(vec![7u8; size])
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(ack.received, size as u64);
        }
    }

    #[tokio::test]
    async fn unknown_requests_fall_through_to_page() {
        let addr = spawn_endpoint(&small_params()).await;
        let response = reqwest::get(format!("http://{addr}/anything"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");
        assert!(response.text().await.unwrap().contains("<html"));
    }
}
