use super::ClientContext;
use crate::{
    display::{BarGraph, Display, FULL_SCALE},
    protocol::{MetricKind, MetricReading, MetricSet},
    state::{ConnectionState, TelemetrySnapshot},
    Result,
};
use std::{
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// Longest single sleep inside the render loop, so a stop is noticed quickly.
const STOP_CHECK: Duration = Duration::from_millis(100);

const OFFLINE_MARKER: &str = "offline";

/// Where each row's label and bar go, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub label_x: u32,
    pub bar_x: u32,
    pub bar_width: u32,
    pub bar_height: u32,
    pub row_spacing: u32,
    pub show_scale: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            label_x: 0,
            bar_x: 40,
            bar_width: 80,
            bar_height: 10,
            row_spacing: 14,
            show_scale: true,
        }
    }
}

impl Layout {
    fn row_y(&self, row: usize) -> u32 {
        self.row_spacing.saturating_mul(row as u32)
    }

    fn bar(&self, y: u32) -> BarGraph {
        BarGraph {
            x: self.bar_x,
            y,
            width: self.bar_width,
            height: self.bar_height,
            show_scale: self.show_scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub layout: Layout,
    /// Rows drawn, in enumeration order.
    pub enabled: MetricSet,
    pub interval: Duration,
    /// Sampling window the server measures disk throughput over.
    pub disk_window: Duration,
    /// Throughput in bytes per second drawn as a full disk bar. Without it
    /// the disk row shows the rate as text.
    pub disk_full_scale: Option<u64>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            enabled: MetricSet::all(),
            interval: Duration::from_millis(500),
            disk_window: Duration::from_millis(250),
            disk_full_scale: None,
        }
    }
}

/// What one row shows besides its label.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// Raw percentage; clamped when drawn.
    Percent(f32),
    Text(String),
    /// Unknown or degenerate: empty box.
    Empty,
}

/// Draws the telemetry snapshot onto a display.
pub struct Renderer<D: Display> {
    display: D,
    settings: RenderSettings,
}

impl<D: Display> Renderer<D> {
    pub fn new(display: D, settings: RenderSettings) -> Self {
        Self { display, settings }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Value shown for `kind`, derived from the raw reading.
    pub fn row_value(&self, snapshot: &TelemetrySnapshot, kind: MetricKind) -> RowValue {
        match snapshot.get(kind) {
            None => RowValue::Empty,
            Some(MetricReading::Cpu(percent)) => RowValue::Percent(percent as f32),
            Some(MetricReading::Gpu(percent)) => RowValue::Percent(percent),
            Some(MetricReading::Ram(usage)) | Some(MetricReading::Vram(usage)) => usage
                .percent()
                .map_or(RowValue::Empty, RowValue::Percent),
            Some(MetricReading::DiskIo(bytes)) => {
                let rate = bytes_per_second(bytes, self.settings.disk_window);
                match self.settings.disk_full_scale {
                    Some(full) if full > 0 => RowValue::Percent((rate / full as f64 * 100.0) as f32),
                    _ => RowValue::Text(format_rate(rate)),
                }
            }
        }
    }

    /// Redraws every enabled row and presents the frame.
    pub fn render(&mut self, snapshot: &TelemetrySnapshot, link: ConnectionState) -> Result<()> {
        let layout = self.settings.layout;
        let enabled = self.settings.enabled;
        self.display.clear();

        let mut rows = 0;
        for (row, kind) in enabled.iter().enumerate() {
            let y = layout.row_y(row);
            self.display.draw_text(kind.label(), layout.label_x, y);
            match self.row_value(snapshot, kind) {
                RowValue::Percent(value) => layout.bar(y).draw(&mut self.display, Some(value)),
                RowValue::Empty => layout.bar(y).draw(&mut self.display, None),
                RowValue::Text(text) => self.display.draw_text(&text, layout.bar_x, y),
            }
            rows = row + 1;
        }

        if link != ConnectionState::Connected {
            let y = layout
                .row_y(rows)
                .min(self.display.height().saturating_sub(8));
            self.display.draw_text(OFFLINE_MARKER, layout.bar_x, y);
        }

        self.display.present()
    }

    /// Sweeps a bar from empty to full so the panel can be checked by eye.
    pub fn boot_sweep(&mut self, step: u32, pause: Duration) -> Result<()> {
        let layout = self.settings.layout;
        let sweep = BarGraph {
            height: layout.bar_height.saturating_mul(2),
            ..layout.bar(0)
        };
        let full = FULL_SCALE as u32;
        let mut value = 0;
        loop {
            self.display.clear();
            self.display.draw_text(&format!("{value:04}"), layout.label_x, 0);
            sweep.draw(&mut self.display, Some(value as f32));
            self.display.present()?;
            if value >= full {
                return Ok(());
            }
            thread::sleep(pause);
            value = (value + step.max(1)).min(full);
        }
    }

    /// Redraws on a fixed cadence until the stop flag is raised.
    pub fn run(&mut self, ctx: &ClientContext) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            rows = self.settings.enabled.len(),
            "render loop started"
        );
        while !ctx.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let (snapshot, link) = ctx.telemetry.view();
            if let Err(err) = self.render(&snapshot, link) {
                warn!("render failed: {err}");
            }
            let deadline = started + self.settings.interval;
            while !ctx.stop.load(Ordering::SeqCst) {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break;
                }
                thread::sleep(left.min(STOP_CHECK));
            }
        }
        info!("render loop stopped");
    }
}

fn bytes_per_second(bytes: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        bytes as f64
    }
}

/// Short rate label such as `409.5K/s`, in powers of 1024.
pub fn format_rate(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0}B/s")
    } else {
        format!("{value:.1}{}/s", UNITS[unit])
    }
}
