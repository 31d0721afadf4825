//! Output formatting for measurement runs.
//!
//! The [`Emitter`] trait defines callbacks for each stage of a run.
//! Two implementations are provided:
//! - [`HumanReadableEmitter`] — live progress and a formatted summary on a terminal.
//! - [`JsonEmitter`] — one JSON object per line, suitable for machine consumption.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::session::{Phase, Sample};
use crate::summary::Summary;

#[derive(Serialize)]
#[serde(tag = "type")]
enum Event<'a> {
    Starting {
        phase: Phase,
    },
    Latency {
        ms: u64,
    },
    Sample {
        sample: &'a Sample,
    },
    Error {
        phase: Phase,
        error: &'a str,
    },
    Complete {
        phase: Phase,
    },
    Summary {
        summary: &'a Summary,
    },
}

/// Callbacks for measurement run lifecycle events.
pub trait Emitter {
    /// Called when a phase is about to begin.
    fn on_starting(&mut self, phase: Phase) -> Result<()>;
    /// Called with the latency probe's result, in milliseconds.
    fn on_latency(&mut self, ms: u64) -> Result<()>;
    /// Called for each periodic throughput sample.
    fn on_sample(&mut self, sample: &Sample) -> Result<()>;
    /// Called when a phase finishes.
    fn on_complete(&mut self, phase: Phase) -> Result<()>;
    /// Called when the run fails.
    fn on_error(&mut self, phase: Phase, err: &str) -> Result<()>;
    /// Called once with the final figures.
    fn on_summary(&mut self, summary: &Summary) -> Result<()>;
}

/// Emits human-readable progress and results to a writer.
pub struct HumanReadableEmitter<W: Write> {
    out: W,
}

impl<W: Write> HumanReadableEmitter<W> {
    /// Create a new emitter writing to `out`.
    pub fn new(out: W) -> Self {
        HumanReadableEmitter { out }
    }
}

impl<W: Write> Emitter for HumanReadableEmitter<W> {
    fn on_starting(&mut self, phase: Phase) -> Result<()> {
        write!(self.out, "\rstarting {:?}", phase)?;
        self.out.flush()?;
        Ok(())
    }

    fn on_latency(&mut self, ms: u64) -> Result<()> {
        write!(self.out, "\rlatency: {ms} ms\n")?;
        Ok(())
    }

    fn on_sample(&mut self, sample: &Sample) -> Result<()> {
        write!(
            self.out,
            "\r{:?}: {:>7.1} Mbit/s ({:>5.1}%)",
            sample.phase, sample.mbps, sample.progress
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn on_complete(&mut self, phase: Phase) -> Result<()> {
        write!(self.out, "\n{:?}: complete\n", phase)?;
        Ok(())
    }

    fn on_error(&mut self, phase: Phase, err: &str) -> Result<()> {
        write!(self.out, "\n{:?} failed: {err}\n", phase)?;
        Ok(())
    }

    fn on_summary(&mut self, summary: &Summary) -> Result<()> {
        writeln!(self.out, "\nTest results\n")?;
        writeln!(self.out, "{:>10}: {}", "Server", summary.server)?;
        writeln!(self.out, "{:>10}: {:>7} ms", "Latency", summary.latency_ms)?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            "Download", summary.download_mbps
        )?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            "Upload", summary.upload_mbps
        )?;
        Ok(())
    }
}

/// Emits one JSON object per line for each event.
pub struct JsonEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonEmitter<W> {
    /// Create a new JSON emitter writing to `out`.
    pub fn new(out: W) -> Self {
        JsonEmitter { out }
    }

    fn emit(&mut self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.out, "{}", json)?;
        Ok(())
    }
}

impl<W: Write> Emitter for JsonEmitter<W> {
    fn on_starting(&mut self, phase: Phase) -> Result<()> {
        self.emit(&Event::Starting { phase })
    }

    fn on_latency(&mut self, ms: u64) -> Result<()> {
        self.emit(&Event::Latency { ms })
    }

    fn on_sample(&mut self, sample: &Sample) -> Result<()> {
        self.emit(&Event::Sample { sample })
    }

    fn on_complete(&mut self, phase: Phase) -> Result<()> {
        self.emit(&Event::Complete { phase })
    }

    fn on_error(&mut self, phase: Phase, err: &str) -> Result<()> {
        self.emit(&Event::Error { phase, error: err })
    }

    fn on_summary(&mut self, summary: &Summary) -> Result<()> {
        self.emit(&Event::Summary { summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_sample_line() {
        let mut buf = Vec::new();
        let mut emitter = HumanReadableEmitter::new(&mut buf);

        let sample = Sample {
            phase: Phase::Download,
            bytes: 1024 * 1024,
            elapsed_ms: 1000,
            mbps: 8.0,
            progress: 30.0,
        };
        emitter.on_sample(&sample).unwrap();

        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("8.0 Mbit/s"));
    }

    #[test]
    fn json_events_are_valid_objects() {
        let mut buf = Vec::new();
        let mut emitter = JsonEmitter::new(&mut buf);

        emitter.on_starting(Phase::Upload).unwrap();
        emitter.on_latency(12).unwrap();

        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();

        let starting: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(starting["type"], "Starting");
        assert_eq!(starting["phase"], "upload");

        let latency: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(latency["type"], "Latency");
        assert_eq!(latency["ms"], 12);
    }
}
