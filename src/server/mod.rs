//! Telemetry server: accepts displays and streams host metrics to each.

pub mod provider;
pub mod session;

use crate::{protocol::MetricSet, Error, Result, DEFAULT_PORT};
use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{info, warn};

pub use provider::{MetricsProvider, NvidiaSmi, SystemProvider};
pub use session::{pause_after, Schedule, Session, SessionEnd};

/// How often the accept loop checks for new clients and the stop flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Builds one provider per session so sessions never share sampling state.
pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn MetricsProvider + Send> + Send + Sync>;

/// Factory producing [`SystemProvider`] instances.
pub fn system_provider_factory() -> ProviderFactory {
    Arc::new(|| Box::new(SystemProvider::new()) as Box<dyn MetricsProvider + Send>)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Delay between frames within one session.
    pub tick: Duration,
    pub enabled: MetricSet,
    /// A write blocked this long ends the session.
    pub write_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick: Duration::from_millis(250),
            enabled: MetricSet::all(),
            write_timeout: Duration::from_secs(2),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    settings: ServerSettings,
    factory: ProviderFactory,
}

impl Server {
    /// Binds the listening socket. Fails before any client is served when the
    /// address is unusable or no metric is enabled.
    pub fn bind(settings: ServerSettings, factory: ProviderFactory) -> Result<Self> {
        if settings.enabled.is_empty() {
            return Err(Error::InvalidArgs("no metrics enabled".to_string()));
        }
        if settings.tick.is_zero() || settings.write_timeout.is_zero() {
            return Err(Error::InvalidArgs(
                "tick and write timeout must be greater than zero".to_string(),
            ));
        }
        let listener = TcpListener::bind((settings.host.as_str(), settings.port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            settings,
            factory,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until `stop` is raised, then waits for every session
    /// to wind down.
    pub fn run(self, stop: Arc<AtomicBool>) -> Result<()> {
        info!(
            addr = %self.local_addr()?,
            metrics = %self.settings.enabled,
            tick_ms = self.settings.tick.as_millis() as u64,
            "telemetry server listening"
        );
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0u64;

        while !stop.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    next_id += 1;
                    match self.spawn_session(next_id, stream, peer, Arc::clone(&stop)) {
                        Ok(handle) => sessions.push(handle),
                        Err(err) => warn!(peer = %peer, "could not start session: {err}"),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(err) => {
                    warn!("accept failed: {err}");
                    thread::sleep(ACCEPT_POLL);
                }
            }
            sessions.retain(|handle| !handle.is_finished());
        }

        info!(active = sessions.len(), "stopping telemetry server");
        for handle in sessions {
            if handle.join().is_err() {
                warn!("a session thread panicked");
            }
        }
        Ok(())
    }

    fn spawn_session(
        &self,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        stop: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        prepare_stream(&stream, self.settings.write_timeout)?;
        let schedule = Schedule::new(self.settings.enabled)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no metrics enabled"))?;
        let factory = Arc::clone(&self.factory);
        let tick = self.settings.tick;
        thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || {
                let session = Session::new(id, peer.to_string(), schedule, factory(), stream, tick);
                session.run(&stop);
            })
    }
}

/// Puts an accepted socket into blocking mode with bounded writes. A peer
/// that stops reading then fails the session's next write with `WouldBlock`
/// or `TimedOut` instead of parking the thread.
fn prepare_stream(stream: &TcpStream, write_timeout: Duration) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(write_timeout))
}
