use super::provider::MetricsProvider;
use crate::protocol::{encode, MemoryUsage, MetricKind, MetricReading, MetricSet};
use std::{
    io::{self, Write},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Round-robin cursor over the enabled metrics.
#[derive(Debug, Clone)]
pub struct Schedule {
    kinds: Vec<MetricKind>,
    cursor: usize,
}

impl Schedule {
    /// Returns `None` when nothing is enabled.
    pub fn new(enabled: MetricSet) -> Option<Self> {
        let kinds: Vec<MetricKind> = enabled.iter().collect();
        if kinds.is_empty() {
            return None;
        }
        Some(Self { kinds, cursor: 0 })
    }

    /// The next kind to send, wrapping after the last.
    pub fn next_kind(&mut self) -> MetricKind {
        let kind = self.kinds[self.cursor];
        self.cursor = (self.cursor + 1) % self.kinds.len();
        kind
    }
}

/// How long to wait after sending `kind`, given how long sampling it took.
///
/// Disk throughput is measured over a full tick, so that slot only tops up
/// whatever part of the tick the measurement did not already use.
pub fn pause_after(kind: MetricKind, tick: Duration, sampling: Duration) -> Duration {
    match kind {
        MetricKind::DiskIo => tick.saturating_sub(sampling),
        _ => tick,
    }
}

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The process is shutting down.
    Stopped,
    /// Writing to the peer failed; it most likely went away.
    WriteFailed(io::Error),
}

/// Streams frames to one connected display.
pub struct Session<P, W> {
    id: u64,
    peer: String,
    schedule: Schedule,
    provider: P,
    out: W,
    tick: Duration,
    frames_sent: u64,
}

impl<P: MetricsProvider, W: Write> Session<P, W> {
    pub fn new(id: u64, peer: String, schedule: Schedule, provider: P, out: W, tick: Duration) -> Self {
        Self {
            id,
            peer,
            schedule,
            provider,
            out,
            tick,
            frames_sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Reads one metric, substituting the degraded value when the provider
    /// fails.
    pub fn sample(&mut self, kind: MetricKind) -> MetricReading {
        let sampled = match kind {
            MetricKind::Cpu => self
                .provider
                .cpu_percent()
                .map(|pct| MetricReading::Cpu(pct.max(0.0).round() as u32)),
            MetricKind::Ram => self
                .provider
                .ram_used_total_gb()
                .map(|(used, total)| MetricReading::Ram(MemoryUsage::new(used, total))),
            MetricKind::DiskIo => self
                .provider
                .disk_delta_bytes(self.tick)
                .map(MetricReading::DiskIo),
            MetricKind::Gpu => self.provider.gpu_percent().map(MetricReading::Gpu),
            MetricKind::Vram => self
                .provider
                .vram_used_total_gb()
                .map(|(used, total)| MetricReading::Vram(MemoryUsage::new(used, total))),
        };
        sampled.unwrap_or_else(|err| {
            warn!(session = self.id, metric = %kind, "sending degraded reading: {err}");
            MetricReading::degraded(kind)
        })
    }

    /// Samples the next scheduled metric and writes its frame.
    pub fn send_next(&mut self) -> io::Result<MetricKind> {
        let kind = self.schedule.next_kind();
        let reading = self.sample(kind);
        let frame = encode(&reading);
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;
        self.frames_sent += 1;
        debug!(session = self.id, frame = frame.trim_end(), "sent");
        Ok(kind)
    }

    /// Sends frames until the peer goes away or `stop` is raised.
    pub fn run(mut self, stop: &AtomicBool) -> SessionEnd {
        info!(session = self.id, peer = %self.peer, "client connected");
        let end = loop {
            if stop.load(Ordering::SeqCst) {
                break SessionEnd::Stopped;
            }
            let started = Instant::now();
            match self.send_next() {
                Ok(kind) => thread::sleep(pause_after(kind, self.tick, started.elapsed())),
                Err(err) => break SessionEnd::WriteFailed(err),
            }
        };
        match &end {
            SessionEnd::Stopped => info!(
                session = self.id,
                peer = %self.peer,
                frames = self.frames_sent,
                "session stopped"
            ),
            SessionEnd::WriteFailed(err) => info!(
                session = self.id,
                peer = %self.peer,
                frames = self.frames_sent,
                "client disconnected: {err}"
            ),
        }
        end
    }
}
