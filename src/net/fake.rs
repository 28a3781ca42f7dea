//! Scripted stand-ins for sockets and time, used by tests.

use super::{Clock, Connector, MetricStream, ReadOutcome};
use std::{
    collections::VecDeque,
    io::{self, ErrorKind},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

/// One scripted result of [`MetricStream::poll_read`].
#[derive(Debug, Clone)]
pub enum FakeRead {
    Bytes(Vec<u8>),
    Idle,
    Closed,
    Fail(ErrorKind),
}

impl FakeRead {
    pub fn text(s: &str) -> Self {
        FakeRead::Bytes(s.as_bytes().to_vec())
    }
}

/// Minimal fake stream that replays a script of reads.
///
/// Once the script runs out every read is [`ReadOutcome::Idle`].
#[derive(Debug, Default)]
pub struct FakeStream {
    script: VecDeque<FakeRead>,
    closed: Arc<AtomicBool>,
}

impl FakeStream {
    pub fn new(script: Vec<FakeRead>) -> Self {
        Self {
            script: script.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag raised when the stream is explicitly closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl MetricStream for FakeStream {
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        match self.script.pop_front() {
            Some(FakeRead::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.script.push_front(FakeRead::Bytes(bytes.split_off(n)));
                }
                Ok(ReadOutcome::Data(n))
            }
            Some(FakeRead::Idle) | None => Ok(ReadOutcome::Idle),
            Some(FakeRead::Closed) => Ok(ReadOutcome::Closed),
            Some(FakeRead::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that hands out scripted results and records when it was asked.
///
/// Attempts beyond the script are refused.
pub struct ScriptedConnector<K: Clock> {
    clock: K,
    outcomes: VecDeque<io::Result<FakeStream>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl<K: Clock> ScriptedConnector<K> {
    pub fn new(clock: K, outcomes: Vec<io::Result<FakeStream>>) -> Self {
        Self {
            clock,
            outcomes: outcomes.into(),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of attempt times, readable after the connector moved.
    pub fn attempts(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.attempts)
    }
}

/// Convenience result for a refused attempt.
pub fn refused() -> io::Result<FakeStream> {
    Err(io::Error::new(ErrorKind::ConnectionRefused, "scripted refusal"))
}

impl<K: Clock> Connector for ScriptedConnector<K> {
    type Stream = FakeStream;

    fn connect(&mut self) -> io::Result<FakeStream> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.clock.now());
        self.outcomes.pop_front().unwrap_or_else(refused)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
