//! Typed, render-safe view of one model turn.
//!
//! Field names on the wire follow the JSON protocol the model is prompted with
//! (`test_code`, `isComplete`, `finalAnswers`), so payloads parsed from the
//! stream deserialize straight into these types.

use crate::merge::{Upsert, upsert_by};
use serde::{Deserialize, Deserializer, Serialize};

/// One sub-part of a multi-part question ("a", "b", ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolvedPart {
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_string")]
    pub answer: Option<String>,
    #[serde(rename = "isComplete", default, deserialize_with = "lenient_bool")]
    pub is_complete: bool,
}

impl SolvedPart {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Default::default()
        }
    }
}

/// Identity of a question within one turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuestionKey {
    pub test_code: Option<String>,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolvedQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_string")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable_vec")]
    pub parts: Vec<SolvedPart>,
    #[serde(rename = "isComplete", default, deserialize_with = "lenient_bool")]
    pub is_complete: bool,
}

impl SolvedQuestion {
    pub fn new(test_code: Option<String>, number: impl Into<String>) -> Self {
        Self {
            test_code,
            number: number.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> QuestionKey {
        QuestionKey {
            test_code: self
                .test_code
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            number: self.number.trim().to_string(),
        }
    }

    /// Mark the question and every part complete.
    pub fn complete(&mut self) {
        self.is_complete = true;
        for part in &mut self.parts {
            part.is_complete = true;
        }
    }

    /// Enforce the flat-vs-multipart shape: blank fields become `None`, and a
    /// question with parts carries no top-level `steps` (they are moved in front
    /// of the first part's steps).
    pub fn normalize(&mut self) {
        clear_blank(&mut self.steps);
        clear_blank(&mut self.answer);
        for part in &mut self.parts {
            clear_blank(&mut part.steps);
            clear_blank(&mut part.answer);
        }
        if !self.parts.is_empty()
            && let Some(intro) = self.steps.take()
        {
            let first = &mut self.parts[0];
            first.steps = Some(match first.steps.take() {
                Some(existing) => format!("{}\n\n{}", intro, existing),
                None => intro,
            });
        }
    }

    pub fn part_mut(&mut self, index: usize) -> Option<&mut SolvedPart> {
        self.parts.get_mut(index)
    }

    /// Insert or replace a part by its `number`.
    pub fn upsert_part(&mut self, part: SolvedPart) -> Upsert {
        upsert_by(&mut self.parts, part, |p| p.number.trim().to_string())
    }
}

fn clear_blank(field: &mut Option<String>) {
    if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
        *field = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    #[serde(deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer: String,
}

impl FinalAnswer {
    pub fn new(number: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            answer: answer.into(),
        }
    }
}

/// Answer key: unique by `number`, first-seen position, last-seen value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinalAnswerSet {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub answers: Vec<FinalAnswer>,
}

impl FinalAnswerSet {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            answers: Vec::new(),
        }
    }

    pub fn upsert(&mut self, answer: FinalAnswer) -> Upsert {
        upsert_by(&mut self.answers, answer, |a| a.number.trim().to_string())
    }

    pub fn get(&self, number: &str) -> Option<&FinalAnswer> {
        self.answers.iter().find(|a| a.number.trim() == number.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    Pending { message: String },
    Ready { mime_type: String, data: String },
    Failed { message: String },
}

/// Placeholder for an image requested by the model, patched by id when the
/// generation request finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSlot {
    pub id: String,
    pub prompt: String,
    /// Byte offset in `ResponseModel::text` where the marker stood.
    #[serde(default)]
    pub offset: usize,
    pub status: ImageStatus,
}

impl ImageSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, ImageStatus::Pending { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Placeholder created, nothing received yet.
    #[default]
    Pending,
    /// Chunks arriving.
    Streaming,
    /// Stream ended, failed or was finalized. No further content changes.
    Complete,
}

/// Discriminated view over a `ResponseModel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    Text(&'a str),
    Questions(&'a [SolvedQuestion]),
    FinalAnswers(&'a FinalAnswerSet),
}

/// Per-turn accumulator. Owned by the parser for the duration of a turn;
/// consumers read clones (snapshots).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseModel {
    /// Prose content, or the preamble that precedes structured content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<SolvedQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answers: Option<FinalAnswerSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub state: TurnState,
    #[serde(default)]
    pub is_streaming: bool,
}

impl ResponseModel {
    /// Fresh accumulator for a turn that has not received anything yet.
    pub fn pending(placeholder: Option<&str>) -> Self {
        Self {
            text: placeholder.unwrap_or_default().to_string(),
            is_streaming: true,
            ..Default::default()
        }
    }

    pub fn shape(&self) -> ResponseShape<'_> {
        if let Some(set) = &self.final_answers
            && !set.is_empty()
        {
            return ResponseShape::FinalAnswers(set);
        }
        if !self.questions.is_empty() {
            return ResponseShape::Questions(&self.questions);
        }
        ResponseShape::Text(&self.text)
    }

    pub fn is_complete(&self) -> bool {
        self.state == TurnState::Complete
    }

    /// Remove every occurrence of the placeholder marker from `text`.
    pub fn strip_placeholder(&mut self, marker: Option<&str>) {
        if let Some(marker) = marker.filter(|m| !m.is_empty())
            && self.text.contains(marker)
        {
            self.text = self.text.replace(marker, "");
        }
    }

    /// Append a preamble block. Blocks are trimmed and separated by a blank line.
    pub fn append_preamble(&mut self, piece: &str, marker: Option<&str>) {
        let piece = piece.trim();
        if piece.is_empty() {
            return;
        }
        self.strip_placeholder(marker);
        let kept = self.text.trim_end().len();
        self.text.truncate(kept);
        if self.text.trim().is_empty() {
            self.text.clear();
        } else {
            self.text.push_str("\n\n");
        }
        self.text.push_str(piece);
    }

    /// Append raw prose, preserving whitespace.
    pub fn append_text(&mut self, piece: &str, marker: Option<&str>) {
        if piece.is_empty() {
            return;
        }
        self.strip_placeholder(marker);
        self.text.push_str(piece);
    }

    pub fn final_answers_mut(&mut self, default_title: &str) -> &mut FinalAnswerSet {
        self.final_answers
            .get_or_insert_with(|| FinalAnswerSet::new(default_title))
    }

    pub fn image_mut(&mut self, id: &str) -> Option<&mut ImageSlot> {
        self.images.iter_mut().find(|slot| slot.id == id)
    }

    pub fn pending_images(&self) -> usize {
        self.images.iter().filter(|s| s.is_pending()).count()
    }

    /// Close every open entity. Used at stream end and on failure.
    pub fn force_close(&mut self) -> usize {
        let mut closed = 0usize;
        for q in &mut self.questions {
            if !q.is_complete || q.parts.iter().any(|p| !p.is_complete) {
                closed += 1;
            }
            q.complete();
        }
        closed
    }

    pub(crate) fn mark_streaming(&mut self) {
        if self.state == TurnState::Pending {
            self.state = TurnState::Streaming;
        }
    }

    pub(crate) fn mark_complete(&mut self) {
        self.state = TurnState::Complete;
        self.is_streaming = false;
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

// Numbers and booleans where the protocol expects a string ("number": 3).
fn scalar_text(v: serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_text(v).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_text(v))
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
