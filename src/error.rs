use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Strict and sanitized parsing both failed.
    Json(String),
    /// Valid JSON, but not a question, question list or final-answer payload.
    UnrecognizedShape,
}

/// Payload-level failure. Recovered inside the parser: the block is demoted to
/// preamble text and the failure is logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} at position {position}", describe(.kind))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
}

fn describe(kind: &ParseErrorKind) -> String {
    match kind {
        ParseErrorKind::Json(msg) => msg.clone(),
        ParseErrorKind::UnrecognizedShape => "Unrecognized payload shape".to_string(),
    }
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }

    /// Error from decoding an already parsed value; there is no source text.
    pub fn from_serde(what: &str, err: serde_json::Error) -> Self {
        Self {
            kind: ParseErrorKind::Json(format!("serde_json {} error: {}", what, err)),
            position: 0,
        }
    }

    /// Error from parsing `source`, positioned at a byte offset into it.
    pub fn from_serde_in(what: &str, err: serde_json::Error, source: &str) -> Self {
        let position = serde_offset(&err, source);
        Self {
            kind: ParseErrorKind::Json(format!("serde_json {} error: {}", what, err)),
            position,
        }
    }
}

/// Byte offset of a serde_json error inside `source`. serde_json reports a
/// 1-based line and a 1-based byte column within that line.
pub(crate) fn serde_offset(err: &serde_json::Error, source: &str) -> usize {
    if err.line() == 0 {
        return 0;
    }
    let line_start: usize = source
        .split_inclusive('\n')
        .take(err.line() - 1)
        .map(str::len)
        .sum();
    (line_start + err.column().saturating_sub(1)).min(source.len())
}

#[derive(Debug, Error)]
pub enum NovaError {
    #[error("invalid sanitizer rule {name:?}: {message}")]
    InvalidRule { name: String, message: String },
    #[error("turn is already complete")]
    TurnComplete,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
