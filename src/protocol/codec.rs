use super::{MemoryUsage, MetricKind, MetricReading};

/// Two-byte frame terminator.
pub const FRAME_TERMINATOR: &str = "\r\n";

/// A frame that decoded into a reading, possibly through a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub reading: MetricReading,
    /// Set when the reading is a degraded default rather than what was sent.
    pub warning: Option<FrameWarning>,
}

/// A frame was accepted, but its payload was replaced by a fallback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameWarning {
    #[error("{kind} payload '{payload}' is not <used>/<total>, using 0/10")]
    MemoryFallback { kind: MetricKind, payload: String },
}

/// A frame that must not touch the snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame has no ':' separator: '{0}'")]
    MissingSeparator(String),
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("invalid {kind} value '{value}'")]
    InvalidValue { kind: MetricKind, value: String },
}

/// Encodes a reading as one terminated frame, e.g. `ram:3.2/16.0\r\n`.
pub fn encode(reading: &MetricReading) -> String {
    let kind = reading.kind();
    let payload = match reading {
        MetricReading::Cpu(percent) => percent.to_string(),
        MetricReading::DiskIo(bytes) => bytes.to_string(),
        MetricReading::Gpu(percent) if percent.fract() == 0.0 && percent.is_finite() => {
            format!("{percent:.0}")
        }
        MetricReading::Gpu(percent) => percent.to_string(),
        MetricReading::Ram(usage) | MetricReading::Vram(usage) => format!(
            "{}/{}",
            decimal(usage.used_gb),
            decimal(usage.total_gb)
        ),
    };
    format!("{kind}:{payload}{FRAME_TERMINATOR}")
}

/// Decodes one frame with its terminator already removed.
///
/// Memory payloads that fail to parse fall back to used=0, total=10 and carry
/// a [`FrameWarning`]; every other problem is a [`FrameError`].
pub fn decode(frame: &str) -> Result<Decoded, FrameError> {
    let trimmed = frame.trim();
    let (name, payload) = trimmed
        .split_once(':')
        .ok_or_else(|| FrameError::MissingSeparator(trimmed.to_string()))?;
    let name = name.trim().to_ascii_lowercase();
    let payload = payload.trim();

    let kind = match name.as_str() {
        "cpu" => MetricKind::Cpu,
        "ram" => MetricKind::Ram,
        "disk" => MetricKind::DiskIo,
        "gpu" => MetricKind::Gpu,
        "vram" => MetricKind::Vram,
        _ => return Err(FrameError::UnknownMetric(name)),
    };
    let invalid = || FrameError::InvalidValue {
        kind,
        value: payload.to_string(),
    };

    let decoded = match kind {
        MetricKind::Cpu => {
            let percent = parse_whole(payload)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(invalid)?;
            exact(MetricReading::Cpu(percent))
        }
        MetricKind::DiskIo => exact(MetricReading::DiskIo(
            parse_whole(payload).ok_or_else(invalid)?,
        )),
        MetricKind::Gpu => exact(MetricReading::Gpu(
            parse_decimal(payload).ok_or_else(invalid)?,
        )),
        MetricKind::Ram => memory(kind, payload, MetricReading::Ram),
        MetricKind::Vram => memory(kind, payload, MetricReading::Vram),
    };
    Ok(decoded)
}

fn exact(reading: MetricReading) -> Decoded {
    Decoded {
        reading,
        warning: None,
    }
}

fn memory(kind: MetricKind, payload: &str, wrap: fn(MemoryUsage) -> MetricReading) -> Decoded {
    let parsed = payload.split_once('/').and_then(|(used, total)| {
        Some(MemoryUsage::new(
            parse_decimal(used)?,
            parse_decimal(total)?,
        ))
    });
    match parsed {
        Some(usage) => exact(wrap(usage)),
        None => Decoded {
            reading: wrap(MemoryUsage::PARSE_FALLBACK),
            warning: Some(FrameWarning::MemoryFallback {
                kind,
                payload: payload.to_string(),
            }),
        },
    }
}

/// Whole, non-negative number. Decimal input is rounded.
fn parse_whole(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u64::MAX as f64)
            .map(|v| v.round() as u64)
    })
}

fn parse_decimal(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Shortest round-tripping form, always with a fractional part.
fn decimal(value: f32) -> String {
    let text = value.to_string();
    if text.contains('.') || !value.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}
