use super::{Connector, MetricStream, ReadOutcome};
use std::{
    io::{self, ErrorKind, Read},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};
use tracing::debug;

/// Connects to `host:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    poll_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16, connect_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout,
            poll_timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpMetricStream;

    /// Tries each resolved address in turn; all of them share one
    /// `connect_timeout` budget.
    fn connect(&mut self) -> io::Result<TcpMetricStream> {
        let deadline = Instant::now() + self.connect_timeout;
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                last_err = Some(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("connect budget for {} used up", self.describe()),
                ));
                break;
            }
            match TcpStream::connect_timeout(&addr, left) {
                Ok(stream) => return TcpMetricStream::new(stream, self.poll_timeout),
                Err(err) => {
                    debug!(%addr, "connect attempt failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.describe()),
            )
        }))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A connected socket whose reads give up after the poll timeout.
#[derive(Debug)]
pub struct TcpMetricStream {
    stream: TcpStream,
}

impl TcpMetricStream {
    pub fn new(stream: TcpStream, poll_timeout: Duration) -> io::Result<Self> {
        // A zero timeout would mean "block forever" to the OS.
        stream.set_read_timeout(Some(poll_timeout.max(Duration::from_millis(1))))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl MetricStream for TcpMetricStream {
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        match self.stream.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Idle)
            }
            Err(err) => Err(err),
        }
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, net::TcpListener};

    #[test]
    fn reads_data_idle_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut connector = TcpConnector::new(
            "127.0.0.1",
            port,
            Duration::from_secs(1),
            Duration::from_millis(20),
        );
        let mut client = connector.connect().unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(client.poll_read(&mut buf).unwrap(), ReadOutcome::Idle);

        server.write_all(b"cpu:5\r\n").unwrap();
        server.flush().unwrap();
        let mut received = Vec::new();
        while received.len() < 7 {
            match client.poll_read(&mut buf).unwrap() {
                ReadOutcome::Data(n) => received.extend_from_slice(&buf[..n]),
                ReadOutcome::Idle => continue,
                ReadOutcome::Closed => panic!("closed before data arrived"),
            }
        }
        assert_eq!(received, b"cpu:5\r\n");

        drop(server);
        let mut outcome = client.poll_read(&mut buf).unwrap();
        while outcome == ReadOutcome::Idle {
            outcome = client.poll_read(&mut buf).unwrap();
        }
        assert_eq!(outcome, ReadOutcome::Closed);
    }

    #[test]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let mut connector = TcpConnector::new(
            "127.0.0.1",
            port,
            Duration::from_millis(200),
            Duration::from_millis(20),
        );
        assert!(connector.connect().is_err());
        assert_eq!(connector.describe(), format!("127.0.0.1:{port}"));
    }

    #[test]
    fn spent_budget_stops_before_dialing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut connector =
            TcpConnector::new("127.0.0.1", port, Duration::ZERO, Duration::from_millis(20));
        let err = connector.connect().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
