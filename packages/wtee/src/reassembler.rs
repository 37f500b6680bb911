//! Turns arbitrarily chunked input into complete lines.

use crate::encoding::InputEncoding;

/// One decoded line, including its terminating `\n` unless it is the final
/// unterminated line flushed at end of input.
pub type Line = String;

/// Reassembles newline-terminated lines from raw reads.
///
/// Text after the last newline of a chunk is held back as the pending tail and
/// prepended to the next terminated line. An empty chunk marks end of input:
/// the pending tail is flushed once and every later call yields nothing.
#[derive(Debug)]
pub struct LineReassembler {
    encoding: InputEncoding,
    pending: String,
    /// Bytes of a multi-byte character split across reads.
    partial: Vec<u8>,
    finished: bool,
}

impl LineReassembler {
    pub fn new(encoding: InputEncoding) -> Self {
        Self {
            encoding,
            pending: String::new(),
            partial: Vec::new(),
            finished: false,
        }
    }

    pub fn encoding(&self) -> InputEncoding {
        self.encoding
    }

    /// The unterminated text carried over from previous chunks.
    pub fn pending_tail(&self) -> &str {
        &self.pending
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one raw chunk and return the lines it completed, in input order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Line> {
        if self.finished {
            return Vec::new();
        }
        if chunk.is_empty() {
            return self.finish();
        }

        let mut bytes = std::mem::take(&mut self.partial);
        bytes.extend_from_slice(chunk);
        let keep = self.encoding.incomplete_suffix(&bytes);
        self.partial = bytes.split_off(bytes.len() - keep);

        let text = self.encoding.decode(&bytes);
        let mut lines: Vec<Line> = text.split_inclusive('\n').map(str::to_owned).collect();

        let tail = match lines.last() {
            Some(last) if !last.ends_with('\n') => lines.pop(),
            _ => None,
        };

        if let Some(first) = lines.first_mut() {
            if !self.pending.is_empty() {
                first.insert_str(0, &self.pending);
                self.pending.clear();
            }
        }

        if let Some(tail) = tail {
            self.pending.push_str(&tail);
        }

        lines
    }

    fn finish(&mut self) -> Vec<Line> {
        self.finished = true;

        if !self.partial.is_empty() {
            let partial = std::mem::take(&mut self.partial);
            self.pending.push_str(&self.encoding.decode(&partial));
        }

        if self.pending.is_empty() {
            Vec::new()
        } else {
            vec![std::mem::take(&mut self.pending)]
        }
    }
}
