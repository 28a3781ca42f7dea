use crate::{
    net::{BackoffController, Clock, Connector, MetricStream, ReadOutcome, RetryPolicy},
    protocol::{decode, FrameReader, FrameWarning, MetricSet},
    state::{ConnectionState, SharedTelemetry},
};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;

/// Knobs for the client connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Longest a single read may wait for data.
    pub poll_timeout: Duration,
    /// Pause after a read that timed out.
    pub idle_delay: Duration,
    pub policy: RetryPolicy,
    pub enabled: MetricSet,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(200),
            idle_delay: Duration::from_millis(50),
            policy: RetryPolicy::default(),
            enabled: MetricSet::all(),
        }
    }
}

/// Running counters for one client connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connects: u64,
    pub failed_connects: u64,
    pub disconnects: u64,
    pub frames_applied: u64,
    pub frames_rejected: u64,
    /// Frames applied with a fallback value.
    pub degraded: u64,
}

/// Owns the single outbound link to the telemetry server and folds the
/// frames it receives into shared state.
pub struct ClientConnection<C: Connector, K: Clock> {
    connector: C,
    clock: K,
    settings: ClientSettings,
    telemetry: SharedTelemetry,
    backoff: BackoffController,
    reader: FrameReader,
    stream: Option<C::Stream>,
    state: ConnectionState,
    stats: ConnectionStats,
}

impl<C: Connector, K: Clock> ClientConnection<C, K> {
    pub fn new(connector: C, clock: K, settings: ClientSettings, telemetry: SharedTelemetry) -> Self {
        let backoff = BackoffController::new(settings.policy, clock.now());
        telemetry.set_link(ConnectionState::Disconnected);
        Self {
            connector,
            clock,
            settings,
            telemetry,
            backoff,
            reader: FrameReader::new(),
            stream: None,
            state: ConnectionState::Disconnected,
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Runs the state machine until `stop` is raised, then closes the link.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(server = %self.connector.describe(), "connection loop started");
        while !stop.load(Ordering::SeqCst) {
            self.step();
        }
        self.close();
        info!(
            connects = self.stats.connects,
            frames = self.stats.frames_applied,
            rejected = self.stats.frames_rejected,
            "connection loop stopped"
        );
    }

    /// Advances the state machine by one bounded unit of work.
    ///
    /// No call blocks for longer than the poll timeout, so callers can check
    /// for shutdown between steps.
    pub fn step(&mut self) {
        match self.state {
            ConnectionState::Disconnected => self.transition(ConnectionState::Connecting),
            ConnectionState::Connecting => self.try_connect(),
            ConnectionState::Connected => self.poll(),
            ConnectionState::Closing => {}
        }
    }

    /// Drops the link and enters `Closing`.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.transition(ConnectionState::Closing);
    }

    fn try_connect(&mut self) {
        let now = self.clock.now();
        if !self.backoff.should_retry(now) {
            let remaining = self.backoff.next_retry_at().saturating_duration_since(now);
            self.clock.sleep(remaining.min(self.settings.poll_timeout));
            return;
        }

        match self.connector.connect() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.reader.reset();
                self.backoff.mark_success(self.clock.now());
                self.stats.connects += 1;
                info!(server = %self.connector.describe(), "connected");
                self.transition(ConnectionState::Connected);
            }
            Err(err) => {
                let delay = self.backoff.mark_failure(self.clock.now());
                self.stats.failed_connects += 1;
                warn!(
                    server = %self.connector.describe(),
                    attempt = self.backoff.failures(),
                    retry_in_s = delay.as_secs(),
                    "connect failed: {err}"
                );
            }
        }
    }

    fn poll(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            self.transition(ConnectionState::Disconnected);
            return;
        };
        let mut buf = [0u8; READ_CHUNK];
        match stream.poll_read(&mut buf) {
            Ok(ReadOutcome::Data(n)) => {
                self.reader.push(&buf[..n]);
                self.apply_frames();
            }
            Ok(ReadOutcome::Idle) => self.clock.sleep(self.settings.idle_delay),
            Ok(ReadOutcome::Closed) => {
                info!("peer closed the connection");
                self.lose_link();
            }
            Err(err) => {
                warn!("transport error: {err}");
                self.lose_link();
            }
        }
    }

    fn apply_frames(&mut self) {
        while let Some(frame) = self.reader.next_frame() {
            match decode(&frame) {
                Ok(decoded) => {
                    let kind = decoded.reading.kind();
                    if !self.settings.enabled.contains(kind) {
                        debug!(metric = %kind, "ignoring disabled metric");
                        continue;
                    }
                    if let Some(FrameWarning::MemoryFallback { payload, .. }) = &decoded.warning {
                        warn!(metric = %kind, payload = %payload, "unreadable memory payload, using fallback");
                        self.stats.degraded += 1;
                    }
                    self.telemetry.update(decoded.reading);
                    self.stats.frames_applied += 1;
                }
                Err(err) => {
                    warn!(frame = %frame, "discarding frame: {err}");
                    self.stats.frames_rejected += 1;
                }
            }
        }
    }

    fn lose_link(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.stats.disconnects += 1;
        self.backoff.mark_lost(self.clock.now());
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "link state");
            self.state = next;
            self.telemetry.set_link(next);
        }
    }
}
