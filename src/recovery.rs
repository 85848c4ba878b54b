/// One recovered irregularity in the model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryLogEntry {
    /// Index of the block (JSON modes) or chunk (tag/prose modes) being processed.
    pub block: usize,
    /// Byte offset inside that block or chunk.
    pub position: usize,
    pub message: &'static str,
    /// Sanitizer rule, when the entry records a rule application.
    pub rule: Option<String>,
    pub context: String,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct RecoveryLog {
    enable: bool,
    window: usize,
    block: usize,
    entries: Vec<RecoveryLogEntry>,
}

impl RecoveryLog {
    pub(crate) fn new(enable: bool, window: usize) -> Self {
        Self {
            enable,
            window,
            block: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn set_block(&mut self, block: usize) {
        self.block = block;
    }

    #[inline]
    pub(crate) fn log(&mut self, position: usize, message: &'static str) {
        if self.enable {
            self.entries.push(RecoveryLogEntry {
                block: self.block,
                position,
                message,
                rule: None,
                context: String::new(),
            });
        }
    }

    #[inline]
    pub(crate) fn log_with_context(&mut self, position: usize, message: &'static str, source: &str) {
        if self.enable {
            let context = build_context(source, position, self.window);
            self.entries.push(RecoveryLogEntry {
                block: self.block,
                position,
                message,
                rule: None,
                context,
            });
        }
    }

    #[inline]
    pub(crate) fn log_rule(&mut self, position: usize, rule: &str, source: &str) {
        if self.enable {
            let context = build_context(source, position, self.window);
            self.entries.push(RecoveryLogEntry {
                block: self.block,
                position,
                message: "applied sanitizer rule",
                rule: Some(rule.to_string()),
                context,
            });
        }
    }

    pub(crate) fn entries(&self) -> &[RecoveryLogEntry] {
        &self.entries
    }
}

/// Up to `window` characters on each side of byte offset `pos`.
fn build_context(source: &str, pos: usize, window: usize) -> String {
    let mut pos = pos.min(source.len());
    while !source.is_char_boundary(pos) {
        pos -= 1;
    }
    let before: Vec<char> = source[..pos].chars().rev().take(window).collect();
    let after = source[pos..].chars().take(window);
    before.into_iter().rev().chain(after).collect()
}
