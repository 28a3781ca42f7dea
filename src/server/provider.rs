//! Host metric sources consumed by server sessions.

use crate::{Error, Result};
use std::{
    fs, io,
    process::Command,
    thread,
    time::Duration,
};
use sysinfo::System;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const SECTOR_BYTES: u64 = 512;

/// Point-in-time host readings. Any call may fail; sessions degrade the
/// affected metric instead of stopping.
pub trait MetricsProvider {
    fn cpu_percent(&mut self) -> Result<f32>;
    /// `(used, total)` in gigabytes.
    fn ram_used_total_gb(&mut self) -> Result<(f32, f32)>;
    /// Bytes read plus written during `window`. Blocks for the window.
    fn disk_delta_bytes(&mut self, window: Duration) -> Result<u64>;
    fn gpu_percent(&mut self) -> Result<f32>;
    /// `(used, total)` in gigabytes.
    fn vram_used_total_gb(&mut self) -> Result<(f32, f32)>;
}

impl<T: MetricsProvider + ?Sized> MetricsProvider for Box<T> {
    fn cpu_percent(&mut self) -> Result<f32> {
        (**self).cpu_percent()
    }

    fn ram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        (**self).ram_used_total_gb()
    }

    fn disk_delta_bytes(&mut self, window: Duration) -> Result<u64> {
        (**self).disk_delta_bytes(window)
    }

    fn gpu_percent(&mut self) -> Result<f32> {
        (**self).gpu_percent()
    }

    fn vram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        (**self).vram_used_total_gb()
    }
}

/// Source of `/proc/diskstats`-formatted text.
pub trait DiskStatsSource {
    fn read(&self) -> io::Result<String>;
}

/// Reads the kernel's `/proc/diskstats`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcDiskStats;

impl ProcDiskStats {
    const PATH: &'static str = "/proc/diskstats";
}

impl DiskStatsSource for ProcDiskStats {
    fn read(&self) -> io::Result<String> {
        fs::read_to_string(Self::PATH)
    }
}

/// Queries `nvidia-smi` for utilization and memory.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    program: String,
}

impl NvidiaSmi {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn query(&self, metric: &'static str, fields: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(format!("--query-gpu={fields}"))
            .arg("--format=csv,noheader,nounits")
            .output()
            .map_err(|err| Error::Provider {
                metric,
                detail: format!("{}: {err}", self.program),
            })?;
        if !output.status.success() {
            return Err(Error::Provider {
                metric,
                detail: format!("{} exited with {}", self.program, output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

/// Metrics from the local machine: sysinfo for CPU and RAM, the kernel disk
/// counters for throughput, and `nvidia-smi` for the GPU.
pub struct SystemProvider<S = ProcDiskStats> {
    sys: System,
    disks: S,
    gpu: NvidiaSmi,
}

impl SystemProvider<ProcDiskStats> {
    pub fn new() -> Self {
        Self::with_sources(ProcDiskStats, NvidiaSmi::default())
    }
}

impl Default for SystemProvider<ProcDiskStats> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DiskStatsSource> SystemProvider<S> {
    pub fn with_sources(disks: S, gpu: NvidiaSmi) -> Self {
        let mut sys = System::new();
        // CPU usage is a delta; take the baseline now so the first tick is real.
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self { sys, disks, gpu }
    }

    fn disk_total_bytes(&self) -> Result<u64> {
        let raw = self.disks.read().map_err(|err| Error::Provider {
            metric: "disk",
            detail: err.to_string(),
        })?;
        Ok(total_disk_bytes(&raw))
    }
}

impl<S: DiskStatsSource> MetricsProvider for SystemProvider<S> {
    fn cpu_percent(&mut self) -> Result<f32> {
        self.sys.refresh_cpu_usage();
        Ok(self.sys.global_cpu_usage())
    }

    fn ram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(Error::Provider {
                metric: "ram",
                detail: "total memory reported as zero".into(),
            });
        }
        Ok((gigabytes(self.sys.used_memory()), gigabytes(total)))
    }

    fn disk_delta_bytes(&mut self, window: Duration) -> Result<u64> {
        let before = self.disk_total_bytes()?;
        thread::sleep(window);
        let after = self.disk_total_bytes()?;
        Ok(after.saturating_sub(before))
    }

    fn gpu_percent(&mut self) -> Result<f32> {
        let raw = self.gpu.query("gpu", "utilization.gpu")?;
        parse_first_number(&raw).ok_or_else(|| Error::Provider {
            metric: "gpu",
            detail: format!("unexpected nvidia-smi output '{}'", raw.trim()),
        })
    }

    fn vram_used_total_gb(&mut self) -> Result<(f32, f32)> {
        let raw = self.gpu.query("vram", "memory.used,memory.total")?;
        parse_vram_mib(&raw).ok_or_else(|| Error::Provider {
            metric: "vram",
            detail: format!("unexpected nvidia-smi output '{}'", raw.trim()),
        })
    }
}

/// Bytes in gigabytes, rounded to one decimal place.
fn gigabytes(bytes: u64) -> f32 {
    round_tenths(bytes as f64 / BYTES_PER_GB)
}

fn round_tenths(value: f64) -> f32 {
    ((value * 10.0).round() / 10.0) as f32
}

/// First value of the first GPU's CSV line.
fn parse_first_number(raw: &str) -> Option<f32> {
    raw.lines()
        .next()?
        .split(',')
        .next()?
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
}

/// `used, total` in MiB for the first GPU, converted to gigabytes.
fn parse_vram_mib(raw: &str) -> Option<(f32, f32)> {
    let line = raw.lines().next()?;
    let (used, total) = line.split_once(',')?;
    let used: f64 = used.trim().parse().ok()?;
    let total: f64 = total.trim().parse().ok()?;
    Some((round_tenths(used / 1024.0), round_tenths(total / 1024.0)))
}

/// Sum of sectors read and written across whole disks, in bytes.
///
/// Partitions are skipped when their parent disk is listed, and virtual
/// devices (loop, ram, zram) are ignored, so traffic is counted once.
pub fn total_disk_bytes(diskstats: &str) -> u64 {
    let devices: Vec<(&str, u64)> = diskstats
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // major minor name reads merged sectors_read ms writes merged sectors_written ...
            if fields.len() < 10 {
                return None;
            }
            let name = fields[2];
            let read: u64 = fields[5].parse().ok()?;
            let written: u64 = fields[9].parse().ok()?;
            Some((name, read.saturating_add(written)))
        })
        .filter(|(name, _)| !["loop", "ram", "zram"].iter().any(|p| name.starts_with(p)))
        .collect();

    devices
        .iter()
        .filter(|(name, _)| !is_partition(name, &devices))
        .map(|(_, sectors)| sectors.saturating_mul(SECTOR_BYTES))
        .fold(0u64, u64::saturating_add)
}

fn is_partition(name: &str, devices: &[(&str, u64)]) -> bool {
    devices.iter().any(|(parent, _)| {
        name.len() > parent.len()
            && name.starts_with(parent)
            && {
                let suffix = &name[parent.len()..];
                let digits = suffix.strip_prefix('p').unwrap_or(suffix);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    const DISKSTATS: &str = "\
   7       0 loop0 100 0 800 10 0 0 0 0 0 10 10 0 0 0 0
   8       0 sda 1000 10 2000 50 500 5 3000 70 0 100 120 0 0 0 0
   8       1 sda1 900 10 1800 45 400 5 2500 60 0 90 105 0 0 0 0
 259       0 nvme0n1 10 0 100 1 20 0 200 2 0 3 3 0 0 0 0
 259       1 nvme0n1p1 10 0 100 1 20 0 200 2 0 3 3 0 0 0 0
";

    #[test]
    fn sums_whole_disks_only() {
        // sda: 2000 + 3000 sectors, nvme0n1: 100 + 200 sectors.
        assert_eq!(total_disk_bytes(DISKSTATS), (5000 + 300) * 512);
    }

    #[test]
    fn ignores_short_or_garbled_lines() {
        assert_eq!(total_disk_bytes("8 0 sda 1 2\nnot a line at all\n"), 0);
    }

    #[test]
    fn partitions_need_a_listed_parent() {
        let devices = [("sda", 0), ("sdb1", 0)];
        assert!(is_partition("sda12", &devices));
        assert!(!is_partition("sdb1", &devices));
        assert!(!is_partition("sdab", &devices));
    }

    #[test]
    fn parses_nvidia_smi_output() {
        assert_eq!(parse_first_number("37\n"), Some(37.0));
        assert_eq!(parse_first_number("[N/A]\n"), None);
        assert_eq!(parse_vram_mib("2150, 12288\n"), Some((2.1, 12.0)));
        assert_eq!(parse_vram_mib("2150\n"), None);
    }

    #[test]
    fn rounds_to_tenths_of_a_gigabyte() {
        assert_eq!(gigabytes(3 * 1024 * 1024 * 1024 + 300 * 1024 * 1024), 3.3);
    }

    struct ScriptedStats {
        reads: RefCell<VecDeque<io::Result<String>>>,
    }

    impl DiskStatsSource for ScriptedStats {
        fn read(&self) -> io::Result<String> {
            self.reads
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::NotFound, "empty")))
        }
    }

    #[test]
    fn disk_delta_is_difference_between_reads() {
        let before = "8 0 sda 0 0 100 0 0 0 100 0 0 0 0";
        let after = "8 0 sda 0 0 150 0 0 0 130 0 0 0 0";
        let stats = ScriptedStats {
            reads: RefCell::new(VecDeque::from(vec![
                Ok(before.to_string()),
                Ok(after.to_string()),
            ])),
        };
        let mut provider = SystemProvider::with_sources(stats, NvidiaSmi::default());
        let delta = provider.disk_delta_bytes(Duration::from_millis(1)).unwrap();
        assert_eq!(delta, 80 * 512);
    }

    #[test]
    fn missing_gpu_tool_is_a_provider_error() {
        let stats = ScriptedStats {
            reads: RefCell::new(VecDeque::new()),
        };
        let mut provider =
            SystemProvider::with_sources(stats, NvidiaSmi::new("statline-no-such-tool"));
        let err = provider.gpu_percent().unwrap_err();
        assert!(matches!(err, Error::Provider { metric: "gpu", .. }));
        assert!(provider.disk_delta_bytes(Duration::ZERO).is_err());
    }
}
