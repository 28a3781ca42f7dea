use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::protocol::{MemoryUsage, MetricKind, MetricReading};

/// Lifecycle of the display's single server connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known reading per metric. Slots stay `None` until a frame arrives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    slots: [Option<MetricReading>; 5],
}

impl TelemetrySnapshot {
    pub fn get(&self, kind: MetricKind) -> Option<MetricReading> {
        self.slots[kind.index()]
    }

    pub fn cpu(&self) -> Option<u32> {
        match self.get(MetricKind::Cpu) {
            Some(MetricReading::Cpu(percent)) => Some(percent),
            _ => None,
        }
    }

    pub fn ram(&self) -> Option<MemoryUsage> {
        match self.get(MetricKind::Ram) {
            Some(MetricReading::Ram(usage)) => Some(usage),
            _ => None,
        }
    }

    pub fn disk_io(&self) -> Option<u64> {
        match self.get(MetricKind::DiskIo) {
            Some(MetricReading::DiskIo(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn gpu(&self) -> Option<f32> {
        match self.get(MetricKind::Gpu) {
            Some(MetricReading::Gpu(percent)) => Some(percent),
            _ => None,
        }
    }

    pub fn vram(&self) -> Option<MemoryUsage> {
        match self.get(MetricKind::Vram) {
            Some(MetricReading::Vram(usage)) => Some(usage),
            _ => None,
        }
    }

    fn apply(&mut self, reading: MetricReading) {
        self.slots[reading.kind().index()] = Some(reading);
    }
}

#[derive(Debug)]
struct Inner {
    snapshot: TelemetrySnapshot,
    link: ConnectionState,
}

/// Telemetry shared between the connection loop (writer) and the render loop
/// (reader). Cloning hands out another handle to the same state.
#[derive(Debug, Clone)]
pub struct SharedTelemetry {
    inner: Arc<Mutex<Inner>>,
}

impl SharedTelemetry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot: TelemetrySnapshot::default(),
                link: ConnectionState::Disconnected,
            })),
        }
    }

    /// Replaces the slot for the reading's kind. Last writer wins.
    pub fn update(&self, reading: MetricReading) {
        self.lock().snapshot.apply(reading);
    }

    /// Consistent copy of every slot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.lock().snapshot.clone()
    }

    pub fn set_link(&self, state: ConnectionState) {
        self.lock().link = state;
    }

    pub fn link(&self) -> ConnectionState {
        self.lock().link
    }

    /// Snapshot and link state read under one lock.
    pub fn view(&self) -> (TelemetrySnapshot, ConnectionState) {
        let guard = self.lock();
        (guard.snapshot.clone(), guard.link)
    }

    // A panic elsewhere cannot leave a half-written reading behind: slots are
    // replaced whole, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_unknown_and_disconnected() {
        let shared = SharedTelemetry::new();
        let snapshot = shared.snapshot();
        for kind in MetricKind::ALL {
            assert!(snapshot.get(kind).is_none());
        }
        assert_eq!(shared.link(), ConnectionState::Disconnected);
    }

    #[test]
    fn newer_reading_replaces_older() {
        let shared = SharedTelemetry::new();
        shared.update(MetricReading::Cpu(10));
        shared.update(MetricReading::Cpu(55));
        shared.update(MetricReading::Gpu(3.5));
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.cpu(), Some(55));
        assert_eq!(snapshot.gpu(), Some(3.5));
        assert_eq!(snapshot.ram(), None);
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let shared = SharedTelemetry::new();
        shared.update(MetricReading::DiskIo(1));
        let before = shared.snapshot();
        shared.update(MetricReading::DiskIo(2));
        assert_eq!(before.disk_io(), Some(1));
        assert_eq!(shared.snapshot().disk_io(), Some(2));
    }

    #[test]
    fn concurrent_readers_never_see_torn_memory_pairs() {
        let shared = SharedTelemetry::new();
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 1..=5_000u32 {
                    let used = i as f32;
                    shared.update(MetricReading::Ram(MemoryUsage::new(used, used * 2.0)));
                }
            })
        };
        let reader = {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..5_000 {
                    if let Some(usage) = shared.snapshot().ram() {
                        assert_eq!(usage.total_gb, usage.used_gb * 2.0);
                    }
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(
            shared.snapshot().ram(),
            Some(MemoryUsage::new(5_000.0, 10_000.0))
        );
    }
}
