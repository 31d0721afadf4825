use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use speedprobe::client::{Engine, Update};
use speedprobe::emitter::{Emitter, HumanReadableEmitter, JsonEmitter};
use speedprobe::params::{self, Params};
use speedprobe::server::ProbeServer;
use speedprobe::session::Phase;

#[derive(Clone, Debug, clap::ValueEnum)]
enum Format {
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "speedprobe", version, about = "Parallel-connection HTTP speed test")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Host a probe endpoint
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
        /// Download payload size in MiB
        #[arg(long, default_value_t = 16)]
        payload_mib: usize,
    },
    /// Measure against a probe endpoint
    Test {
        /// Probe endpoint URL
        #[arg(long, default_value = "http://127.0.0.1:8080/")]
        server: String,
        /// Output format to use: 'human' or 'json' for batch processing
        #[arg(long, default_value = "human")]
        format: Format,
        /// Concurrent connections per throughput phase
        #[arg(long, default_value_t = params::WORKER_COUNT)]
        workers: usize,
        /// Seconds spent in each throughput phase
        #[arg(long, default_value_t = 10)]
        duration: u64,
        /// Upload request body size in MiB
        #[arg(long, default_value_t = 1)]
        chunk_mib: usize,
        /// Milliseconds between speed samples
        #[arg(long, default_value_t = 200)]
        sample_interval_ms: u64,
        /// Emit summary and errors only
        #[arg(long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            listen,
            payload_mib,
        } => {
            let params = Params {
                payload_size: payload_mib * 1024 * 1024,
                ..Params::default()
            };
            let server = ProbeServer::bind(listen, &params).await?;
            println!(
                "probe endpoint listening on http://{}",
                server.local_addr()?
            );
            server.run().await?;
            println!("shutdown complete");
        }
        Command::Test {
            server,
            format,
            workers,
            duration,
            chunk_mib,
            sample_interval_ms,
            quiet,
        } => {
            let params = Params {
                workers,
                phase_duration: Duration::from_secs(duration),
                upload_chunk_size: chunk_mib * 1024 * 1024,
                sample_interval: Duration::from_millis(sample_interval_ms),
                ..Params::default()
            };

            let mut emitter: Box<dyn Emitter> = match format {
                Format::Human => Box::new(HumanReadableEmitter::new(std::io::stdout())),
                Format::Json => Box::new(JsonEmitter::new(std::io::stdout())),
            };

            let engine = Engine::new(&server, params)?;
            let (mut updates, run) = engine.start();

            let mut current = Phase::Idle;
            while let Some(update) = updates.recv().await {
                match update {
                    Update::Starting(phase) => {
                        current = phase;
                        emitter.on_starting(phase)?;
                    }
                    Update::Latency(ms) => emitter.on_latency(ms)?,
                    Update::Sample(sample) => {
                        if !quiet {
                            emitter.on_sample(&sample)?;
                        }
                    }
                    Update::Complete(phase) => emitter.on_complete(phase)?,
                }
            }

            match run.await? {
                Ok(summary) => emitter.on_summary(&summary)?,
                Err(err) => {
                    emitter.on_error(current, &err.to_string())?;
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
