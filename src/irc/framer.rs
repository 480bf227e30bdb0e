// src/irc/framer.rs - Splits the inbound byte stream into protocol lines

/// Buffers a byte stream and yields complete lines.
///
/// Lines end in `\n`; trailing `\r` characters are dropped so `\r\n` and bare
/// `\n` streams frame identically. Bytes after the last newline stay buffered
/// until the rest of the line arrives. Decoding happens per complete line, so
/// a multi-byte character split across reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them, in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let remainder = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let end = line.iter().rposition(|&b| b != b'\r').map_or(0, |i| i + 1);
                String::from_utf8_lossy(&line[..end]).into_owned()
            })
            .collect()
    }

    /// Bytes of the incomplete trailing line
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &[u8] = b":irc.example.org 001 Bot :Welcome\r\nPING :token\r\n\r\n:a!b@c PRIVMSG #chan :caf\xc3\xa9\npartial";

    fn feed_all(chunks: &[&[u8]]) -> (Vec<String>, Vec<u8>) {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(framer.feed(chunk));
        }
        (lines, framer.pending().to_vec())
    }

    #[test]
    fn test_whole_stream() {
        let (lines, pending) = feed_all(&[STREAM]);
        assert_eq!(
            lines,
            vec![
                ":irc.example.org 001 Bot :Welcome".to_string(),
                "PING :token".to_string(),
                String::new(),
                ":a!b@c PRIVMSG #chan :café".to_string(),
            ]
        );
        assert_eq!(pending, b"partial".to_vec());
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let (expected, expected_pending) = feed_all(&[STREAM]);

        for split in 0..=STREAM.len() {
            let (lines, pending) = feed_all(&[&STREAM[..split], &STREAM[split..]]);
            assert_eq!(lines, expected, "split at {}", split);
            assert_eq!(pending, expected_pending, "split at {}", split);
        }

        let single_bytes: Vec<&[u8]> = STREAM.chunks(1).collect();
        let (lines, _) = feed_all(&single_bytes);
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_crlf_and_lf_frame_identically() {
        let (crlf, _) = feed_all(&[b"PING :a\r\nPONG :b\r\n"]);
        let (lf, _) = feed_all(&[b"PING :a\nPONG :b\n"]);
        assert_eq!(crlf, lf);
    }

    #[test]
    fn test_no_newline_yields_nothing() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"PING :tok").is_empty());
        assert!(framer.feed(b"").is_empty());
        assert_eq!(framer.feed(b"en\n"), vec!["PING :token".to_string()]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_lines_are_emitted_once() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"one\ntwo"), vec!["one".to_string()]);
        assert_eq!(framer.feed(b"\n"), vec!["two".to_string()]);
        assert!(framer.feed(b"").is_empty());
    }
}
