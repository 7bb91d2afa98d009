//! Byte-capped capture buffer that keeps the tail of a stream.
//!
//! Agent transcripts can be large; capping the in-memory copy bounds the
//! orchestrator's footprint while keeping the most recent output, which is
//! what failure forensics need.

/// A buffer that retains at most `cap` bytes, discarding the oldest bytes
/// when full.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    cap: usize,
    total_written: usize,
}

impl RingBuffer {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            total_written: 0,
        }
    }

    /// Append bytes, evicting from the front when over capacity.
    pub fn write(&mut self, bytes: &[u8]) {
        self.total_written += bytes.len();
        if bytes.len() >= self.cap {
            // The incoming chunk alone fills the buffer.
            self.data.clear();
            self.data.extend_from_slice(&bytes[bytes.len() - self.cap..]);
            return;
        }
        self.data.extend_from_slice(bytes);
        if self.data.len() > self.cap {
            let excess = self.data.len() - self.cap;
            self.data.drain(..excess);
        }
    }

    /// Append a line of text plus a trailing newline.
    pub fn write_line(&mut self, line: &str) {
        self.write(line.as_bytes());
        self.write(b"\n");
    }

    #[must_use]
    pub fn was_truncated(&self) -> bool {
        self.total_written > self.data.len()
    }

    #[must_use]
    pub fn total_bytes_written(&self) -> usize {
        self.total_written
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_everything_under_cap() {
        let mut buf = RingBuffer::new(16);
        buf.write(b"hello");
        assert_eq!(buf.to_string_lossy(), "hello");
        assert!(!buf.was_truncated());
    }

    #[test]
    fn keeps_tail_when_over_cap() {
        let mut buf = RingBuffer::new(4);
        buf.write(b"abcdef");
        assert_eq!(buf.to_string_lossy(), "cdef");
        assert!(buf.was_truncated());
        assert_eq!(buf.total_bytes_written(), 6);
    }

    #[test]
    fn evicts_across_multiple_writes() {
        let mut buf = RingBuffer::new(6);
        buf.write_line("ab");
        buf.write_line("cd");
        buf.write_line("ef");
        // Nine bytes written, last six kept.
        assert_eq!(buf.to_string_lossy(), "cd\nef\n");
    }
}
