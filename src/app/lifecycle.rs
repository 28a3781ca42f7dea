use crate::Result;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tracing::info;

/// Returns a stop flag that flips to `true` on the first SIGINT or SIGTERM
/// (Ctrl-C elsewhere).
///
/// The handlers are installed before this returns. The signal is awaited on
/// its own thread with a single-threaded runtime; every other loop only
/// polls the flag.
pub fn create_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let signals = runtime.block_on(async { Signals::install() })?;
    let flag = Arc::clone(&stop);
    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            if let Some(name) = runtime.block_on(signals.recv()) {
                info!(signal = name, "shutting down");
                flag.store(true, Ordering::SeqCst);
            }
        })?;
    Ok(stop)
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) -> Option<&'static str> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some("SIGINT"),
            Some(()) = self.terminate.recv() => Some("SIGTERM"),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> Option<&'static str> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("Ctrl-C"),
            Err(err) => {
                tracing::warn!("cannot listen for interrupts: {err}");
                None
            }
        }
    }
}
