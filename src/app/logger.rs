use crate::{Error, Result};
use std::{
    fs::{File, OpenOptions},
    str::FromStr,
    sync::Arc,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable naming a log file when `--log-file` is absent.
pub const LOG_PATH_ENV: &str = "STATLINE_LOG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::InvalidArgs(format!(
                "log level must be error, warn, info, debug or trace (got '{other}')"
            ))),
        }
    }
}

/// Builds the filter: an explicit level wins, then `RUST_LOG`, then `info`.
pub fn build_filter(level: Option<LogLevel>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Opens the log file in append mode, creating it when missing.
pub fn open_log_file(path: &str) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Installs the global subscriber. Logs go to stderr, or to the file named
/// by `log_file` (falling back to `STATLINE_LOG_PATH`).
pub fn init(level: Option<LogLevel>, log_file: Option<&str>) -> Result<()> {
    let env_path = std::env::var(LOG_PATH_ENV).ok();
    let path = log_file.or(env_path.as_deref());
    let builder = fmt().with_env_filter(build_filter(level)).with_target(false);

    let installed = match path {
        Some(path) => {
            let file = Arc::new(open_log_file(path)?);
            builder.with_ansi(false).with_writer(file).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|err| Error::InvalidArgs(format!("logger already installed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(Error::InvalidArgs(_))
        ));
    }

    #[test]
    fn explicit_level_sets_the_filter() {
        use tracing::level_filters::LevelFilter;
        assert_eq!(
            build_filter(Some(LogLevel::Trace)).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(
            build_filter(Some(LogLevel::Warn)).max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    fn log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statline.log");
        let path = path.to_str().unwrap();
        writeln!(open_log_file(path).unwrap(), "first").unwrap();
        writeln!(open_log_file(path).unwrap(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }
}
