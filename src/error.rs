use std::io;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("config error in {path}: {source}")]
    Config {
        path: String,
        source: toml::de::Error,
    },

    /// A metrics collaborator could not produce a reading.
    #[error("{metric} unavailable: {detail}")]
    Provider {
        metric: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
