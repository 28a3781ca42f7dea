use statline::{
    app::{ClientConnection, ClientSettings, RenderSettings, Renderer},
    display::Framebuffer,
    net::{SystemClock, TcpConnector},
    protocol::MetricSet,
    server::{MetricsProvider, ProviderFactory, Server, ServerSettings},
    state::{ConnectionState, SharedTelemetry},
    Result,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

struct FixedHost;

impl MetricsProvider for FixedHost {
    fn cpu_percent(&mut self) -> Result<f32> {
        Ok(55.0)
    }

    fn ram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        Ok((3.2, 16.0))
    }

    fn disk_delta_bytes(&mut self, window: Duration) -> Result<u64> {
        thread::sleep(window);
        Ok(104_832)
    }

    fn gpu_percent(&mut self) -> Result<f32> {
        Ok(88.0)
    }

    fn vram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        Ok((2.1, 12.0))
    }
}

fn fixed_factory() -> ProviderFactory {
    Arc::new(|| Box::new(FixedHost) as Box<dyn MetricsProvider + Send>)
}

/// A real server on 127.0.0.1 feeding a real client fills every slot.
#[test]
fn server_stream_fills_client_snapshot() {
    let server = Server::bind(
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            tick: Duration::from_millis(10),
            write_timeout: Duration::from_secs(2),
            enabled: MetricSet::all(),
        },
        fixed_factory(),
    )
    .unwrap();
    let port = server.local_addr().unwrap().port();
    let stop = Arc::new(AtomicBool::new(false));
    let server_thread = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || server.run(stop))
    };

    let telemetry = SharedTelemetry::new();
    let settings = ClientSettings {
        poll_timeout: Duration::from_millis(100),
        idle_delay: Duration::from_millis(5),
        ..ClientSettings::default()
    };
    let connector = TcpConnector::new(
        "127.0.0.1",
        port,
        Duration::from_secs(2),
        settings.poll_timeout,
    );
    let mut client = ClientConnection::new(connector, SystemClock, settings, telemetry.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        client.step();
        let snapshot = telemetry.snapshot();
        if snapshot.cpu().is_some()
            && snapshot.ram().is_some()
            && snapshot.disk_io().is_some()
            && snapshot.gpu().is_some()
            && snapshot.vram().is_some()
        {
            break;
        }
    }

    let snapshot = telemetry.snapshot();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(telemetry.link(), ConnectionState::Connected);
    assert_eq!(snapshot.cpu(), Some(55));
    assert_eq!(snapshot.disk_io(), Some(104_832));
    assert_eq!(snapshot.gpu(), Some(88.0));
    assert_eq!(snapshot.ram().and_then(|ram| ram.percent()).map(f32::round), Some(20.0));
    assert_eq!(client.stats().frames_rejected, 0);

    let mut renderer = Renderer::new(Framebuffer::new(128, 64), RenderSettings::default());
    renderer.render(&snapshot, telemetry.link()).unwrap();
    assert!(renderer.display().contains_text("CPU"));
    assert!(!renderer.display().contains_text("offline"));

    client.close();
    stop.store(true, Ordering::SeqCst);
    server_thread.join().unwrap().unwrap();
}

/// Stopping the server drops the link; the client notices and starts over.
#[test]
fn client_notices_server_shutdown() {
    let server = Server::bind(
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            tick: Duration::from_millis(10),
            write_timeout: Duration::from_secs(2),
            enabled: MetricSet::none().with(statline::protocol::MetricKind::Cpu),
        },
        fixed_factory(),
    )
    .unwrap();
    let port = server.local_addr().unwrap().port();
    let stop = Arc::new(AtomicBool::new(false));
    let server_thread = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || server.run(stop))
    };

    let telemetry = SharedTelemetry::new();
    let settings = ClientSettings {
        poll_timeout: Duration::from_millis(100),
        idle_delay: Duration::from_millis(5),
        ..ClientSettings::default()
    };
    let connector = TcpConnector::new("127.0.0.1", port, Duration::from_secs(2), settings.poll_timeout);
    let mut client = ClientConnection::new(connector, SystemClock, settings, telemetry.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while telemetry.snapshot().cpu().is_none() && Instant::now() < deadline {
        client.step();
    }
    assert_eq!(telemetry.snapshot().cpu(), Some(55));

    stop.store(true, Ordering::SeqCst);
    server_thread.join().unwrap().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while client.state() == ConnectionState::Connected && Instant::now() < deadline {
        client.step();
    }
    assert_ne!(client.state(), ConnectionState::Connected);
    assert_eq!(client.stats().disconnects, 1);
    // The last known reading survives the disconnect.
    assert_eq!(telemetry.snapshot().cpu(), Some(55));
}
