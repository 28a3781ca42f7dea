//! Host telemetry streaming for small bar-graph displays.
//!
//! The server side (`statline serve`) samples the host and writes one
//! `<metric>:<payload>\r\n` frame per tick to every connected display. The
//! client side (`statline display`) keeps one connection alive, folds frames
//! into [`state::SharedTelemetry`], and redraws a display from it on its own
//! cadence.

pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod net;
pub mod protocol;
pub mod server;
pub mod state;

pub use error::{Error, Result};

/// Default TCP port shared by the server and the display client.
pub const DEFAULT_PORT: u16 = 9002;
