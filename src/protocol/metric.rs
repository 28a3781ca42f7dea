use std::{fmt, str::FromStr};

/// The metrics carried on the wire, in round-robin order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Cpu,
    Ram,
    DiskIo,
    Gpu,
    Vram,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Cpu,
        MetricKind::Ram,
        MetricKind::DiskIo,
        MetricKind::Gpu,
        MetricKind::Vram,
    ];

    /// Name used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Ram => "ram",
            MetricKind::DiskIo => "disk",
            MetricKind::Gpu => "gpu",
            MetricKind::Vram => "vram",
        }
    }

    /// Short upper-case label drawn next to the bar.
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Ram => "RAM",
            MetricKind::DiskIo => "DISK",
            MetricKind::Gpu => "GPU",
            MetricKind::Vram => "VRAM",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            MetricKind::Cpu => 0,
            MetricKind::Ram => 1,
            MetricKind::DiskIo => 2,
            MetricKind::Gpu => 3,
            MetricKind::Vram => 4,
        }
    }

    fn normalize(name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::normalize(s).as_str() {
            "cpu" => Ok(MetricKind::Cpu),
            "ram" | "mem" => Ok(MetricKind::Ram),
            "disk" | "disk_io" | "diskio" => Ok(MetricKind::DiskIo),
            "gpu" => Ok(MetricKind::Gpu),
            "vram" => Ok(MetricKind::Vram),
            other => Err(format!(
                "unknown metric '{other}', expected cpu|ram|disk|gpu|vram"
            )),
        }
    }
}

/// Used/total pair for RAM and VRAM, in gigabytes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MemoryUsage {
    pub used_gb: f32,
    pub total_gb: f32,
}

impl MemoryUsage {
    /// Fallback pair applied when a memory payload cannot be parsed.
    pub const PARSE_FALLBACK: MemoryUsage = MemoryUsage {
        used_gb: 0.0,
        total_gb: 10.0,
    };

    pub fn new(used_gb: f32, total_gb: f32) -> Self {
        Self { used_gb, total_gb }
    }

    /// Raw usage percentage, or `None` when the total is degenerate.
    pub fn percent(&self) -> Option<f32> {
        if self.total_gb > 0.0 {
            Some(self.used_gb / self.total_gb * 100.0)
        } else {
            None
        }
    }
}

/// One point-in-time reading of a single metric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MetricReading {
    /// Whole percent. Not clamped; values above 100 are kept as received.
    Cpu(u32),
    Ram(MemoryUsage),
    /// Bytes moved during the server's sampling window.
    DiskIo(u64),
    Gpu(f32),
    Vram(MemoryUsage),
}

impl MetricReading {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricReading::Cpu(_) => MetricKind::Cpu,
            MetricReading::Ram(_) => MetricKind::Ram,
            MetricReading::DiskIo(_) => MetricKind::DiskIo,
            MetricReading::Gpu(_) => MetricKind::Gpu,
            MetricReading::Vram(_) => MetricKind::Vram,
        }
    }

    /// Value sent when the server cannot sample `kind`.
    ///
    /// Memory kinds report a zero total so the display shows no bar rather
    /// than a misleading one.
    pub fn degraded(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Cpu => MetricReading::Cpu(0),
            MetricKind::Ram => MetricReading::Ram(MemoryUsage::new(0.0, 0.0)),
            MetricKind::DiskIo => MetricReading::DiskIo(0),
            MetricKind::Gpu => MetricReading::Gpu(0.0),
            MetricKind::Vram => MetricReading::Vram(MemoryUsage::new(0.0, 0.0)),
        }
    }
}

/// The set of metrics enabled for a session or a display.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MetricSet {
    enabled: [bool; 5],
}

impl MetricSet {
    pub fn all() -> Self {
        Self { enabled: [true; 5] }
    }

    pub fn none() -> Self {
        Self {
            enabled: [false; 5],
        }
    }

    pub fn with(mut self, kind: MetricKind) -> Self {
        self.enabled[kind.index()] = true;
        self
    }

    pub fn contains(&self, kind: MetricKind) -> bool {
        self.enabled[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|on| *on)
    }

    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|on| **on).count()
    }

    /// Enabled kinds in round-robin order.
    pub fn iter(&self) -> impl Iterator<Item = MetricKind> + '_ {
        MetricKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for MetricSet {
    type Err = String;

    /// Parses `all` or a comma-separated list such as `cpu,ram,gpu`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut set = Self::none();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            set = set.with(part.parse()?);
        }
        if set.is_empty() {
            return Err("metric list is empty".to_string());
        }
        Ok(set)
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|kind| kind.as_str()).collect();
        f.write_str(&names.join(","))
    }
}
