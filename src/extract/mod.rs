//! JSON-object extraction: find the candidate inside a raw block, parse it
//! (strict first, sanitized second) and decode it into a `Payload`.
//!
//! Anything that is not the candidate is preamble. A block whose candidate
//! cannot be recovered is preamble in full; partial JSON never reaches the
//! model.

mod json;

pub use json::{Payload, decode_payload};

use crate::sanitize::Sanitizer;
use crate::recovery::RecoveryLog;
use memchr::memmem;

const FENCE: &str = "```";

/// The JSON candidate of a block and the text around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub before: &'a str,
    pub json: &'a str,
    pub after: &'a str,
    /// Byte offset of `json` inside the block.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    /// Trimmed text outside the candidate, or the whole block on failure.
    pub preamble: String,
    pub payload: Option<Payload>,
}

/// Locate the JSON candidate of `block`.
///
/// With `fenced`, the JSON inside the first ``` fence is preferred; a fence
/// that never closes runs to the end of the block. Otherwise the first `{`
/// (or a leading `[`) and its matching bracket are used.
pub fn locate_candidate(block: &str, fenced: bool) -> Option<Candidate<'_>> {
    if fenced && let Some(c) = locate_fenced(block) {
        return Some(c);
    }
    let open = if block.trim_start().starts_with('[') {
        block.len() - block.trim_start().len()
    } else {
        memchr::memchr(b'{', block.as_bytes())?
    };
    let end = matching_close(block, open)?;
    Some(Candidate {
        before: &block[..open],
        json: &block[open..=end],
        after: &block[end + 1..],
        offset: open,
    })
}

fn locate_fenced(block: &str) -> Option<Candidate<'_>> {
    let start = memmem::find(block.as_bytes(), FENCE.as_bytes())?;
    let body_start = start + FENCE.len() + fence_open_len(&block[start + FENCE.len()..]);
    let (body_end, after_start) = match memmem::find(block[body_start..].as_bytes(), FENCE.as_bytes()) {
        Some(rel) => {
            let close = body_start + rel;
            // tolerate ```` closers
            let extra = block[close..].bytes().take_while(|&b| b == b'`').count();
            (close, close + extra)
        }
        None => (block.len(), block.len()),
    };
    let body = &block[body_start..body_end];
    let open = body.find(['{', '['])?;
    let (rel_start, rel_end) = match matching_close(body, open) {
        Some(close) => (open, close + 1),
        None => (open, body.len()),
    };
    Some(Candidate {
        before: &block[..start],
        json: &body[rel_start..rel_end],
        after: &block[after_start..],
        offset: body_start + rel_start,
    })
}

/// Bytes to skip after an opening fence: extra backticks, an optional
/// language word, spaces and one newline.
fn fence_open_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() && bytes[i] == b'`' {
        i += 1;
    }
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }
    if bytes[i..].starts_with(b"\r\n") {
        i += 2;
    } else if i < bytes.len() && bytes[i] == b'\n' {
        i += 1;
    }
    i
}

/// Index of the bracket closing the one at `open`, by string-aware depth
/// counting. Falls back to the last closing bracket when depth never returns
/// to zero, and to `None` when there is no closing bracket at all.
fn matching_close(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    let closer = if bytes[open] == b'[' { b']' } else { b'}' };
    memchr::memrchr(closer, &bytes[open..]).map(|rel| open + rel)
}

/// Extract one closed block without logging.
pub fn extract_block(block: &str, fenced: bool, sanitizer: &Sanitizer) -> Extraction {
    extract_block_logged(block, fenced, Some(sanitizer), &mut RecoveryLog::disabled())
}

pub(crate) fn extract_block_logged(
    block: &str,
    fenced: bool,
    sanitizer: Option<&Sanitizer>,
    log: &mut RecoveryLog,
) -> Extraction {
    let Some(cand) = locate_candidate(block, fenced) else {
        return demote(block);
    };
    let parsed = match sanitizer {
        Some(s) => s.parse_candidate(cand.json, true, log),
        None => Sanitizer::empty().parse_candidate(cand.json, false, log),
    };
    let payload = match parsed.and_then(decode_payload) {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(error = %err, "demoting malformed block to preamble");
            log.log_with_context(cand.offset + err.position, "demoted block to preamble", block);
            return demote(block);
        }
    };
    let preamble = [cand.before.trim(), cand.after.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    Extraction {
        preamble,
        payload: Some(payload),
    }
}

fn demote(block: &str) -> Extraction {
    Extraction {
        preamble: block.trim().to_string(),
        payload: None,
    }
}
