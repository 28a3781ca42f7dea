//! The `<metric>:<payload>\r\n` line protocol.

mod codec;
mod framing;
mod metric;

pub use codec::{decode, encode, Decoded, FrameError, FrameWarning, FRAME_TERMINATOR};
pub use framing::{FrameReader, MAX_FRAME_BYTES};
pub use metric::{MemoryUsage, MetricKind, MetricReading, MetricSet};
