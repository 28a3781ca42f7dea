use tracing::warn;

/// Longest unterminated run kept while waiting for a terminator.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Reassembles terminator-delimited frames from arbitrary read chunks.
///
/// A chunk may hold several frames or end halfway through one; the partial
/// tail is kept until a later chunk completes it.
#[derive(Debug, Default)]
pub struct FrameReader {
    pending: Vec<u8>,
    dropped: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, without its terminator.
    ///
    /// Blank lines are skipped. Returns `None` once only a partial frame (or
    /// nothing) is left.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let Some(end) = self.pending.iter().position(|b| *b == b'\n') else {
                self.enforce_limit();
                return None;
            };
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Drains every complete frame currently buffered.
    pub fn frames(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of oversized runs discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Forgets any partial frame, e.g. after the connection is replaced.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    fn enforce_limit(&mut self) {
        if self.pending.len() > MAX_FRAME_BYTES {
            warn!(
                bytes = self.pending.len(),
                "discarding unterminated input longer than {MAX_FRAME_BYTES} bytes"
            );
            self.pending.clear();
            self.dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_concatenated_frames() {
        let mut reader = FrameReader::new();
        reader.push(b"cpu:10\r\nram:1.0/8.0\r\n");
        assert_eq!(reader.frames(), vec!["cpu:10", "ram:1.0/8.0"]);
        assert_eq!(reader.pending_len(), 0);
    }

    #[test]
    fn keeps_partial_tail_for_next_read() {
        let mut reader = FrameReader::new();
        reader.push(b"cpu:10\r\ngp");
        assert_eq!(reader.next_frame().as_deref(), Some("cpu:10"));
        assert_eq!(reader.next_frame(), None);
        assert_eq!(reader.pending_len(), 2);

        reader.push(b"u:5");
        assert_eq!(reader.next_frame(), None);
        reader.push(b"0\r");
        assert_eq!(reader.next_frame(), None);
        reader.push(b"\n");
        assert_eq!(reader.next_frame().as_deref(), Some("gpu:50"));
    }

    #[test]
    fn tolerates_bare_newlines_and_blank_lines() {
        let mut reader = FrameReader::new();
        reader.push(b"\r\n\ncpu:1\ndisk:2\r\n");
        assert_eq!(reader.frames(), vec!["cpu:1", "disk:2"]);
    }

    #[test]
    fn discards_runaway_input() {
        let mut reader = FrameReader::new();
        reader.push(&vec![b'x'; MAX_FRAME_BYTES + 1]);
        assert_eq!(reader.next_frame(), None);
        assert_eq!(reader.pending_len(), 0);
        assert_eq!(reader.dropped(), 1);

        reader.push(b"cpu:3\r\n");
        assert_eq!(reader.next_frame().as_deref(), Some("cpu:3"));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut reader = FrameReader::new();
        reader.push(b"cpu:\xff\r\n");
        let frame = reader.next_frame().unwrap();
        assert!(frame.starts_with("cpu:"));
    }
}
