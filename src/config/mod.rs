//! On-disk configuration (`config.toml`), layered under command-line options.

use crate::{Error, Result, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const APP_DIR_NAME: &str = "statline";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `all` or a comma-separated list of metric names.
    pub metrics: String,
    pub tick_ms: u64,
    /// Longest a session waits on a peer that stopped reading.
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            metrics: "all".to_string(),
            tick_ms: 250,
            write_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub host: String,
    pub port: u16,
    pub metrics: String,
    pub render_ms: u64,
    pub poll_ms: u64,
    pub idle_ms: u64,
    /// Budget for one connect attempt, across every resolved address.
    pub connect_timeout_ms: u64,
    pub initial_retry_secs: u64,
    pub subsequent_retry_secs: u64,
    pub reconnect_secs: u64,
    pub width: u32,
    pub height: u32,
    pub label_x: u32,
    pub bar_x: u32,
    pub bar_width: u32,
    pub bar_height: u32,
    pub row_spacing: u32,
    pub show_scale: bool,
    /// Must match the server's tick to turn disk frames into a rate.
    pub disk_window_ms: u64,
    /// Bytes per second drawn as a full disk bar; unset shows the rate as text.
    pub disk_full_scale_bytes: Option<u64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            metrics: "cpu,ram,gpu,vram".to_string(),
            render_ms: 500,
            poll_ms: 200,
            idle_ms: 50,
            connect_timeout_ms: 1_000,
            initial_retry_secs: 10,
            subsequent_retry_secs: 30,
            reconnect_secs: 20,
            width: 128,
            height: 64,
            label_x: 0,
            bar_x: 40,
            bar_width: 80,
            bar_height: 10,
            row_spacing: 14,
            show_scale: true,
            disk_window_ms: 250,
            disk_full_scale_bytes: None,
        }
    }
}

impl Config {
    /// Reads and parses an explicit config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw, path)
    }

    /// Loads the user config if one exists, otherwise the defaults.
    pub fn load_or_default() -> Result<Self> {
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|source| Error::Config {
            path: path.display().to_string(),
            source,
        })
    }
}

/// `$XDG_CONFIG_HOME/statline/config.toml`, or `~/.config/statline/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let file = write_config(
            r#"
            [server]
            port = 9100
            metrics = "cpu,ram"

            [display]
            host = "10.0.0.5"
            disk_full_scale_bytes = 104857600
            "#,
        );
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.metrics, "cpu,ram");
        assert_eq!(cfg.server.tick_ms, 250);
        assert_eq!(cfg.server.write_timeout_ms, 2_000);
        assert_eq!(cfg.display.host, "10.0.0.5");
        assert_eq!(cfg.display.disk_full_scale_bytes, Some(104_857_600));
        assert_eq!(cfg.display.reconnect_secs, 20);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = write_config("");
        assert_eq!(Config::load(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn bad_toml_names_the_file() {
        let file = write_config("[server]\nport = \"not a number\"\n");
        match Config::load(file.path()) {
            Err(Error::Config { path, .. }) => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("[display]\nbaud = 9600\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let raw = toml::to_string(&Config::default()).unwrap();
        let path = Path::new("inline");
        assert_eq!(Config::parse(&raw, path).unwrap(), Config::default());
    }
}
