//! Byte-fragment to line reassembly for the event stream.

/// Reassembles complete lines from arbitrarily split byte fragments.
///
/// One decoder belongs to one stream. Fragments may split a line anywhere,
/// including inside a multi-byte character; the incomplete tail is held
/// back until the next fragment completes it.
#[derive(Debug, Default)]
pub struct LineDecoder {
    carry: String,
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and return every line it completed, without terminators.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let mut line: String = self.carry.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.carry.push_str(&String::from_utf8_lossy(&tail));
        }
        if self.carry.trim().is_empty() {
            None
        } else {
            Some(self.carry)
        }
    }

    fn decode_pending(&mut self) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    self.carry.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = start + err.valid_up_to();
                    self.carry
                        .push_str(&String::from_utf8_lossy(&self.pending[start..valid]));
                    match err.error_len() {
                        Some(bad) => {
                            self.carry.push(char::REPLACEMENT_CHARACTER);
                            start = valid + bad;
                        }
                        None => {
                            // Truncated character: keep its bytes for the next fragment.
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(fragments: &[&[u8]]) -> Vec<String> {
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        for fragment in fragments {
            lines.extend(decoder.feed(fragment));
        }
        lines.extend(decoder.finish());
        lines
    }

    #[test]
    fn test_complete_and_partial_lines() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"data: one\ndata: tw"), vec!["data: one"]);
        assert_eq!(decoder.feed(b"o\r\n\n"), vec!["data: two", ""]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_finish_emits_trailing_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: [DONE]"));

        let mut blank = LineDecoder::new();
        blank.feed(b"line\n   ");
        assert_eq!(blank.finish(), None);
    }

    #[test]
    fn test_every_split_point_gives_same_lines() {
        let input = "data: {\"content\":\"héllo wörld ✓\"}\r\n\ndata: [DONE]\n".as_bytes();
        let whole = decode_all(&[input]);
        assert_eq!(whole.len(), 3);

        for split in 0..=input.len() {
            let (a, b) = input.split_at(split);
            assert_eq!(decode_all(&[a, b]), whole, "split at byte {}", split);
        }

        let singles: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(decode_all(&singles), whole);
    }

    #[test]
    fn test_invalid_bytes_become_replacement_character() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"a\xffb\n");
        assert_eq!(lines, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_truncated_character_at_end_of_stream() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(&[b'x', 0xE2, 0x9C]).is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("x\u{FFFD}"));
    }
}
