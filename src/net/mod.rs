//! Transport seams for the display client: connecting, reading with a
//! bounded wait, and telling time.

pub mod backoff;
pub mod fake;
pub mod tcp;

use std::{
    io,
    time::{Duration, Instant},
};

pub use backoff::{BackoffController, RetryPolicy};
pub use tcp::{TcpConnector, TcpMetricStream};

/// Result of one bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were written into the buffer.
    Data(usize),
    /// Nothing arrived before the read timeout.
    Idle,
    /// The peer closed the connection (zero-byte read).
    Closed,
}

/// A connected byte stream that can be read without blocking indefinitely.
pub trait MetricStream {
    /// Waits at most the stream's poll timeout for data.
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

    /// Releases the underlying socket. Dropping the stream does the same.
    fn close(&mut self) {}
}

/// Opens connections to the telemetry server.
pub trait Connector {
    type Stream: MetricStream;

    fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Where this connector points, for logs.
    fn describe(&self) -> String;
}

/// Time source for backoff and idle waits.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
