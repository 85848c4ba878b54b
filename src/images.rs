//! Inline image-generation markers in prose: `[GENERATE_IMAGE: "prompt"]`.
//!
//! The marker is removed from the text and replaced by a pending image slot.
//! Generation itself happens outside the parser: the parser emits a
//! `SideEffect` and later receives an `ImageResolution` for the same
//! placeholder id, in whatever order results arrive.

use crate::model::{ImageStatus, ResponseModel};
use crate::options::Messages;
use serde::{Deserialize, Serialize};

const MARKER_PREFIX: &str = "[GENERATE_IMAGE:";
// A prompt that has not closed within this many bytes is not a marker.
const MAX_MARKER_LEN: usize = 1024;

/// Request emitted by the parser for the caller to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    GenerateImage { placeholder_id: String, prompt: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub mime_type: String,
    /// Base64 payload as returned by the image backend.
    pub data: String,
}

/// Result of an image-generation request, routed back by placeholder id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResolution {
    pub placeholder_id: String,
    pub result: Result<ImageData, String>,
}

impl ImageResolution {
    pub fn ready(placeholder_id: impl Into<String>, image: ImageData) -> Self {
        Self {
            placeholder_id: placeholder_id.into(),
            result: Ok(image),
        }
    }

    pub fn failed(placeholder_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            placeholder_id: placeholder_id.into(),
            result: Err(reason.into()),
        }
    }
}

pub(crate) fn placeholder_id(page: Option<usize>, n: usize) -> String {
    match page {
        Some(p) => format!("img-placeholder-p{p}-{n}"),
        None => format!("img-placeholder-{n}"),
    }
}

/// Patch the slot named by `resolution`. Returns false for an unknown id.
pub(crate) fn apply_resolution(
    model: &mut ResponseModel,
    resolution: ImageResolution,
    messages: &Messages,
) -> bool {
    let Some(slot) = model.image_mut(&resolution.placeholder_id) else {
        tracing::warn!(id = %resolution.placeholder_id, "image result for unknown placeholder");
        return false;
    };
    slot.status = match resolution.result {
        Ok(image) => ImageStatus::Ready {
            mime_type: image.mime_type,
            data: image.data,
        },
        Err(reason) => {
            tracing::warn!(id = %slot.id, reason = %reason, "image generation failed");
            ImageStatus::Failed {
                message: messages.image_failed_for(&slot.prompt),
            }
        }
    };
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProseEvent {
    Text(String),
    Marker(String),
}

#[derive(Debug, PartialEq, Eq)]
enum MarkerMatch {
    Found { len: usize, prompt: String },
    NotMarker,
    Incomplete,
}

/// Splits prose into text and markers, holding back a possible marker that is
/// cut by a chunk boundary.
#[derive(Debug, Default)]
pub(crate) struct MarkerScanner {
    buf: String,
}

impl MarkerScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chunk: &str) -> Vec<ProseEvent> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        let mut emitted = 0usize;
        let mut search = 0usize;
        loop {
            let Some(rel) = memchr::memchr(b'[', &self.buf.as_bytes()[search..]) else {
                break;
            };
            let p = search + rel;
            match match_marker(&self.buf[p..]) {
                MarkerMatch::Found { len, prompt } => {
                    if p > emitted {
                        out.push(ProseEvent::Text(self.buf[emitted..p].to_string()));
                    }
                    out.push(ProseEvent::Marker(prompt));
                    emitted = p + len;
                    search = emitted;
                }
                MarkerMatch::NotMarker => search = p + 1,
                MarkerMatch::Incomplete => {
                    if p > emitted {
                        out.push(ProseEvent::Text(self.buf[emitted..p].to_string()));
                    }
                    self.buf.drain(..p);
                    return out;
                }
            }
        }
        if self.buf.len() > emitted {
            out.push(ProseEvent::Text(self.buf[emitted..].to_string()));
        }
        self.buf.clear();
        out
    }

    /// Release held-back text at stream end. An unfinished marker is plain text.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

fn match_marker(s: &str) -> MarkerMatch {
    if s.len() < MARKER_PREFIX.len() {
        return if MARKER_PREFIX.starts_with(s) {
            MarkerMatch::Incomplete
        } else {
            MarkerMatch::NotMarker
        };
    }
    if !s.starts_with(MARKER_PREFIX) {
        return MarkerMatch::NotMarker;
    }
    let rest = &s[MARKER_PREFIX.len()..];
    let ws = rest.len() - rest.trim_start().len();
    let rest = &rest[ws..];
    let Some(first) = rest.chars().next() else {
        return bounded_incomplete(s);
    };
    if first != '"' {
        return MarkerMatch::NotMarker;
    }
    let body = &rest[1..];
    let Some(close) = memchr::memchr(b'"', body.as_bytes()) else {
        return bounded_incomplete(s);
    };
    let consumed = MARKER_PREFIX.len() + ws + 1 + close + 1;
    if close == 0 || consumed + 1 > MAX_MARKER_LEN {
        return MarkerMatch::NotMarker;
    }
    match body[close + 1..].chars().next() {
        None => MarkerMatch::Incomplete,
        Some(']') => MarkerMatch::Found {
            len: consumed + 1,
            prompt: body[..close].to_string(),
        },
        Some(_) => MarkerMatch::NotMarker,
    }
}

fn bounded_incomplete(s: &str) -> MarkerMatch {
    if s.len() >= MAX_MARKER_LEN {
        MarkerMatch::NotMarker
    } else {
        MarkerMatch::Incomplete
    }
}
