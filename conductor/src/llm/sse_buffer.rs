//! Line buffering for SSE response bodies.
//!
//! Network chunks split `data:` lines at arbitrary byte boundaries; the
//! buffer accumulates bytes and yields only complete lines, keeping the
//! partial tail for the next chunk.

/// Accumulates SSE body bytes and yields complete lines.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk; returns every newline-terminated line seen so
    /// far. Invalid UTF-8 is replaced rather than dropped so a single bad
    /// byte cannot desynchronize the stream.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_split_across_chunks_is_reassembled() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.feed(b"data: {\"con").is_empty());
        let lines = buf.feed(b"tent\": \"hi\"}\n\n");
        assert_eq!(lines, vec!["data: {\"content\": \"hi\"}".to_string(), String::new()]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.feed(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.feed(b"data: a\ndata: b\n");
        assert_eq!(lines, vec!["data: a".to_string(), "data: b".to_string()]);
    }
}
