//! Newline framing over a per-connection receive buffer.

/// Buffers smaller than this are never shifted, only cleared when drained.
const COMPACT_THRESHOLD: usize = 4096;

/// Append-only byte buffer that yields complete `\n`-terminated lines.
///
/// Consumed bytes are tracked with a cursor rather than removed eagerly, and
/// the position where the last unsuccessful newline search stopped is
/// remembered so each byte is scanned once.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    bytes: Vec<u8>,
    cursor: usize,
    scanned: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes.
    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete line, without its terminator.
    ///
    /// A preceding `\r` is kept; callers that care about CRLF trim it.
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let start = self.scanned.max(self.cursor);
        let tail = self.bytes.get(start..)?;
        if let Some(offset) = tail.iter().position(|byte| *byte == b'\n') {
            let end = start + offset;
            let line = self.bytes.get(self.cursor..end)?.to_vec();
            self.cursor = end + 1;
            self.scanned = self.cursor;
            Some(line)
        } else {
            self.scanned = self.bytes.len();
            None
        }
    }

    /// Releases consumed bytes.
    ///
    /// A fully drained buffer is cleared; otherwise the unread tail is shifted
    /// to the front once the consumed prefix is large and at least half the
    /// buffer.
    pub(crate) fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if self.cursor >= self.bytes.len() {
            self.bytes.clear();
            self.cursor = 0;
            self.scanned = 0;
        } else if self.cursor >= COMPACT_THRESHOLD && self.cursor * 2 >= self.bytes.len() {
            self.bytes.drain(..self.cursor);
            self.scanned = self.scanned.saturating_sub(self.cursor);
            self.cursor = 0;
        }
    }

    /// Bytes received but not yet framed into a line.
    pub(crate) fn pending_len(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    #[cfg(test)]
    fn capacity_in_use(&self) -> usize {
        self.bytes.len()
    }
}
