/// Largest run of unterminated bytes kept between reads.
pub const MAX_PENDING_BYTES: usize = 1_000_000;

/// Splits a byte stream into newline-terminated lines.
///
/// Partial lines are kept until their terminator arrives. If more than
/// `max_pending` bytes accumulate without a newline the buffer is dropped.
#[derive(Debug)]
pub struct LineAssembler {
    pending: Vec<u8>,
    max_pending: usize,
    discarded: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(MAX_PENDING_BYTES)
    }
}

impl LineAssembler {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Vec::with_capacity(128),
            max_pending,
            discarded: 0,
        }
    }

    /// Appends `bytes` and returns every completed line, terminator included.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..=pos]);
            rest = &rest[pos + 1..];
            if self.pending.len() <= self.max_pending {
                lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            } else {
                self.discard();
            }
            self.pending.clear();
        }
        self.pending.extend_from_slice(rest);
        if self.pending.len() > self.max_pending {
            self.discard();
        }
        lines
    }

    fn discard(&mut self) {
        log::error!(
            "dropping {} bytes received without a line terminator",
            self.pending.len()
        );
        self.discarded += self.pending.len();
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes thrown away for exceeding the cap.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
