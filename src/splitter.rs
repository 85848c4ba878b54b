use memchr::memmem::Finder;

/// Splits the accumulating stream into blocks separated by a literal
/// delimiter. The delimiter is trusted to be out-of-band: no escaping is done
/// and the first match always wins.
pub struct DelimiterSplitter {
    finder: Finder<'static>,
    delim_len: usize,
    buf: String,
    // byte offset where the next search starts; everything before it is known
    // not to contain the start of a delimiter
    scan_pos: usize,
    emitted: usize,
}

impl DelimiterSplitter {
    pub fn new(delimiter: &str) -> Self {
        Self {
            finder: Finder::new(delimiter.as_bytes()).into_owned(),
            delim_len: delimiter.len(),
            buf: String::new(),
            scan_pos: 0,
            emitted: 0,
        }
    }

    pub fn delimiter(&self) -> &str {
        // the needle was built from a &str
        std::str::from_utf8(self.finder.needle()).unwrap_or_default()
    }

    /// Append a chunk and return every block completed by it, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        if self.delim_len == 0 {
            return out;
        }
        loop {
            let Some(bytes) = self.buf.as_bytes().get(self.scan_pos..) else {
                break;
            };
            match self.finder.find(bytes) {
                Some(p) => {
                    let start = self.scan_pos + p;
                    let block = self.buf[..start].to_string();
                    self.drop_prefix(start + self.delim_len);
                    self.emitted += 1;
                    out.push(block);
                }
                None => {
                    // a delimiter may straddle this chunk and the next one
                    self.scan_pos = self.buf.len().saturating_sub(self.delim_len - 1);
                    break;
                }
            }
        }
        out
    }

    /// Emit the remainder at stream end, if anything but whitespace is left.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scan_pos = 0;
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.emitted += 1;
        Some(trimmed.to_string())
    }

    /// Text received after the last delimiter.
    pub fn pending(&self) -> &str {
        &self.buf
    }

    /// Number of blocks emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn drop_prefix(&mut self, end: usize) {
        self.buf.drain(..end);
        self.scan_pos = 0;
    }
}
