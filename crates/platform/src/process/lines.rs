//! Byte chunk to line splitting

/// Incremental line splitter for raw pipe output.
///
/// Splits on `\n` and drops one trailing `\r`. Bytes are decoded as UTF-8
/// per line, invalid sequences become U+FFFD. Since `\n` never occurs inside
/// a multi-byte UTF-8 sequence, the result does not depend on how the input
/// was chunked.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(decode(&self.pending));
            self.pending.clear();
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush an unterminated final line
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn split_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(splitter.push(chunk));
        }
        lines.extend(splitter.finish());
        lines
    }

    #[test]
    fn test_partial_line_across_chunks() {
        let lines = split_all(&[b"Instal", b"ling foo\n==> Pour", b"ing\n"]);
        assert_eq!(lines, vec!["Installing foo", "==> Pouring"]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let lines = split_all(&[b"one\ntwo"]);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let lines = split_all(&[b"a\r\n\nb\r\n"]);
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let lines = split_all(&[b"ok\n", b"bad \xff\xfe byte\n", b"after\n"]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "bad \u{FFFD}\u{FFFD} byte");
        assert_eq!(lines[2], "after");
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "caf\u{e9}\n".as_bytes();
        let lines = split_all(&[&bytes[..4], &bytes[4..]]);
        assert_eq!(lines, vec!["caf\u{e9}"]);
    }

    proptest! {
        #[test]
        fn chunking_never_changes_lines(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            cuts in proptest::collection::vec(any::<usize>(), 0..8),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
            points.sort_unstable();
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for p in points {
                chunks.push(&data[start..p]);
                start = p;
            }
            chunks.push(&data[start..]);

            let whole = split_all(&[&data]);
            prop_assert_eq!(split_all(&chunks), whole.clone());

            let newlines = data.iter().filter(|&&b| b == b'\n').count();
            let trailing = usize::from(!data.is_empty() && data.last() != Some(&b'\n'));
            prop_assert_eq!(whole.len(), newlines + trailing);
        }
    }
}
