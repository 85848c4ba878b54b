#[inline]
pub fn is_whitespace(c: char) -> bool {
    // Include U+FEFF (BOM) so a leading BOM never ends up in field text.
    matches!(
        c,
        '\u{0009}' | '\u{000A}' | '\u{000D}' | '\u{0020}' | '\u{FEFF}'
    )
}

#[inline]
pub fn is_tag_name_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

#[inline]
pub fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

#[inline]
pub fn is_attr_quote(c: char) -> bool {
    // Models sometimes emit typographic quotes around attribute values.
    matches!(c, '"' | '\'' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}')
}

#[inline]
pub fn closing_quote_matches(open: char, c: char) -> bool {
    match open {
        '\u{201C}' => c == '\u{201D}' || c == '"',
        '\u{2018}' => c == '\u{2019}' || c == '\'',
        _ => c == open,
    }
}

/// Incremental UTF-8 decoder for byte chunks.
///
/// A chunk may end in the middle of a multi-byte sequence; the incomplete tail
/// is held back and completed by the next chunk. Invalid sequences decode to
/// U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0usize;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(s) => {
                    out.push_str(s);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.pending[start..start + valid]).unwrap_or(""),
                    );
                    start += valid;
                    match e.error_len() {
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            start += bad;
                        }
                        // incomplete sequence at the end: wait for more bytes
                        None => break,
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Decode whatever is still held back. Called at stream end.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
