use crate::{
    cli::{Command, DisplayOptions, ServeOptions},
    config::{Config, DisplayConfig, ServerConfig},
    display::{Display, Framebuffer, TerminalDisplay},
    net::{RetryPolicy, SystemClock, TcpConnector},
    protocol::MetricSet,
    server::{system_provider_factory, Server, ServerSettings},
    state::SharedTelemetry,
    Error, Result,
};
use std::{
    sync::{atomic::AtomicBool, Arc},
    thread,
    time::Duration,
};
use tracing::{info, warn};

pub mod connection;
pub mod lifecycle;
pub mod logger;
pub mod render;

pub use connection::{ClientConnection, ClientSettings, ConnectionStats};
pub use render::{Layout, RenderSettings, Renderer};

/// State handed to both client loops. Nothing else is shared between them.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub telemetry: SharedTelemetry,
    pub stop: Arc<AtomicBool>,
}

impl ClientContext {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            telemetry: SharedTelemetry::new(),
            stop,
        }
    }
}

/// Fully merged settings for the display client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayAppConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub width: u32,
    pub height: u32,
    pub client: ClientSettings,
    pub render: RenderSettings,
    pub boot_test: bool,
    pub headless: bool,
}

impl DisplayAppConfig {
    /// Command-line values win over the config file.
    pub fn from_sources(config: DisplayConfig, opts: DisplayOptions) -> Result<Self> {
        let enabled = parse_metrics(opts.metrics.as_deref().unwrap_or(&config.metrics))?;
        let poll_ms = opts.poll_ms.unwrap_or(config.poll_ms);
        let render_ms = opts.render_ms.unwrap_or(config.render_ms);
        if poll_ms == 0 || render_ms == 0 || config.connect_timeout_ms == 0 {
            return Err(Error::InvalidArgs(
                "poll, render and connect timeouts must be greater than zero".to_string(),
            ));
        }
        validate_geometry(&config)?;
        Ok(Self {
            host: opts.host.unwrap_or(config.host),
            port: opts.port.unwrap_or(config.port),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            width: config.width,
            height: config.height,
            client: ClientSettings {
                poll_timeout: Duration::from_millis(poll_ms),
                idle_delay: Duration::from_millis(config.idle_ms),
                policy: RetryPolicy {
                    initial: Duration::from_secs(config.initial_retry_secs),
                    subsequent: Duration::from_secs(config.subsequent_retry_secs),
                    reconnect: Duration::from_secs(config.reconnect_secs),
                },
                enabled,
            },
            render: RenderSettings {
                layout: Layout {
                    label_x: config.label_x,
                    bar_x: config.bar_x,
                    bar_width: config.bar_width,
                    bar_height: config.bar_height,
                    row_spacing: config.row_spacing,
                    show_scale: config.show_scale,
                },
                enabled,
                interval: Duration::from_millis(render_ms),
                disk_window: Duration::from_millis(config.disk_window_ms),
                disk_full_scale: config.disk_full_scale_bytes,
            },
            boot_test: opts.boot_test,
            headless: opts.headless,
        })
    }
}

impl ServerSettings {
    /// Command-line values win over the config file.
    pub fn from_sources(config: ServerConfig, opts: ServeOptions) -> Result<Self> {
        let tick_ms = opts.tick_ms.unwrap_or(config.tick_ms);
        if tick_ms == 0 || config.write_timeout_ms == 0 {
            return Err(Error::InvalidArgs(
                "tick and write timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            host: opts.host.unwrap_or(config.host),
            port: opts.port.unwrap_or(config.port),
            tick: Duration::from_millis(tick_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            enabled: parse_metrics(opts.metrics.as_deref().unwrap_or(&config.metrics))?,
        })
    }
}

/// Largest panel side, and largest bar offset or size, accepted from
/// configuration.
const MAX_PANEL_SIDE: u32 = 1024;

fn validate_geometry(config: &DisplayConfig) -> Result<()> {
    let side = 1..=MAX_PANEL_SIDE;
    if !side.contains(&config.width) || !side.contains(&config.height) {
        return Err(Error::InvalidArgs(format!(
            "panel size {}x{} must be 1 to {MAX_PANEL_SIDE} pixels per side",
            config.width, config.height
        )));
    }
    let placement = [
        config.label_x,
        config.bar_x,
        config.bar_width,
        config.bar_height,
        config.row_spacing,
    ];
    if placement.iter().any(|px| *px > MAX_PANEL_SIDE) {
        return Err(Error::InvalidArgs(format!(
            "bar geometry must stay within {MAX_PANEL_SIDE} pixels"
        )));
    }
    Ok(())
}

fn parse_metrics(raw: &str) -> Result<MetricSet> {
    raw.parse()
        .map_err(|err: String| Error::InvalidArgs(format!("metrics '{raw}': {err}")))
}

/// What the binary was asked to do, with every setting resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum App {
    Serve(ServerSettings),
    Display(DisplayAppConfig),
}

impl App {
    pub fn from_sources(config: Config, command: Command) -> Result<Self> {
        match command {
            Command::Serve(opts) => Ok(App::Serve(ServerSettings::from_sources(config.server, opts)?)),
            Command::Display(opts) => Ok(App::Display(DisplayAppConfig::from_sources(
                config.display,
                opts,
            )?)),
        }
    }

    /// Runs until `stop` is raised.
    pub fn run(self, stop: Arc<AtomicBool>) -> Result<()> {
        match self {
            App::Serve(settings) => Server::bind(settings, system_provider_factory())?.run(stop),
            App::Display(config) => run_display(config, stop),
        }
    }
}

fn run_display(config: DisplayAppConfig, stop: Arc<AtomicBool>) -> Result<()> {
    if config.headless {
        let surface = Framebuffer::new(config.width, config.height);
        run_client(&config, surface, stop)
    } else {
        let surface = TerminalDisplay::stdout(config.width, config.height);
        run_client(&config, surface, stop)
    }
}

/// Connection loop on its own thread, render loop on this one.
fn run_client<D: Display>(config: &DisplayAppConfig, surface: D, stop: Arc<AtomicBool>) -> Result<()> {
    let ctx = ClientContext::new(stop);
    let mut renderer = Renderer::new(surface, config.render);
    if config.boot_test {
        info!("running boot sweep");
        renderer.boot_sweep(3, Duration::from_millis(20))?;
    }

    let connector = TcpConnector::new(
        &config.host,
        config.port,
        config.connect_timeout,
        config.client.poll_timeout,
    );
    let mut connection =
        ClientConnection::new(connector, SystemClock, config.client, ctx.telemetry.clone());
    let worker = {
        let stop = Arc::clone(&ctx.stop);
        thread::Builder::new()
            .name("connection".to_string())
            .spawn(move || {
                connection.run(&stop);
                connection.stats()
            })?
    };

    renderer.run(&ctx);

    match worker.join() {
        Ok(stats) => info!(
            connects = stats.connects,
            disconnects = stats.disconnects,
            applied = stats.frames_applied,
            rejected = stats.frames_rejected,
            degraded = stats.degraded,
            "display client stopped"
        ),
        Err(_) => warn!("connection thread panicked"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config_from_file_only() {
        let merged =
            DisplayAppConfig::from_sources(DisplayConfig::default(), DisplayOptions::default())
                .unwrap();
        assert_eq!(merged.host, "127.0.0.1");
        assert_eq!(merged.port, crate::DEFAULT_PORT);
        assert_eq!(merged.client.poll_timeout, Duration::from_millis(200));
        assert_eq!(merged.client.idle_delay, Duration::from_millis(50));
        assert_eq!(merged.client.policy, RetryPolicy::default());
        assert_eq!(merged.render.interval, Duration::from_millis(500));
        assert_eq!(merged.render.layout, Layout::default());
        assert_eq!(merged.render.enabled.to_string(), "cpu,ram,gpu,vram");
        assert_eq!(merged.client.enabled, merged.render.enabled);
    }

    #[test]
    fn cli_values_win_over_file_values() {
        let file = DisplayConfig {
            host: "10.0.0.5".to_string(),
            poll_ms: 300,
            ..DisplayConfig::default()
        };
        let opts = DisplayOptions {
            host: Some("10.0.0.9".to_string()),
            metrics: Some("cpu".to_string()),
            boot_test: true,
            ..DisplayOptions::default()
        };
        let merged = DisplayAppConfig::from_sources(file, opts).unwrap();
        assert_eq!(merged.host, "10.0.0.9");
        assert_eq!(merged.client.poll_timeout, Duration::from_millis(300));
        assert_eq!(merged.render.enabled.len(), 1);
        assert!(merged.boot_test);
    }

    #[test]
    fn out_of_range_geometry_is_rejected() {
        for config in [
            DisplayConfig {
                width: 0,
                ..DisplayConfig::default()
            },
            DisplayConfig {
                height: u32::MAX,
                ..DisplayConfig::default()
            },
            DisplayConfig {
                bar_x: 4_000_000_000,
                ..DisplayConfig::default()
            },
            DisplayConfig {
                connect_timeout_ms: 0,
                ..DisplayConfig::default()
            },
        ] {
            let result = DisplayAppConfig::from_sources(config, DisplayOptions::default());
            assert!(matches!(result, Err(Error::InvalidArgs(_))), "{result:?}");
        }
    }

    #[test]
    fn empty_metric_list_is_a_configuration_error() {
        let opts = ServeOptions {
            metrics: Some(" , ".to_string()),
            ..ServeOptions::default()
        };
        let result = ServerSettings::from_sources(ServerConfig::default(), opts);
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn serve_settings_merge() {
        let opts = ServeOptions {
            port: Some(9100),
            ..ServeOptions::default()
        };
        let app = App::from_sources(Config::default(), Command::Serve(opts)).unwrap();
        match app {
            App::Serve(settings) => {
                assert_eq!(settings.host, "0.0.0.0");
                assert_eq!(settings.port, 9100);
                assert_eq!(settings.tick, Duration::from_millis(250));
                assert_eq!(settings.enabled, MetricSet::all());
                assert_eq!(settings.write_timeout, Duration::from_secs(2));
            }
            other => panic!("unexpected app {other:?}"),
        }
    }

    #[test]
    fn headless_client_stops_with_the_flag() {
        let config = DisplayAppConfig::from_sources(
            DisplayConfig {
                port: 1,
                ..DisplayConfig::default()
            },
            DisplayOptions {
                headless: true,
                ..DisplayOptions::default()
            },
        )
        .unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        run_display(config, stop).unwrap();
    }
}
