use serde::{Deserialize, Serialize};

/// Sentinel the model is instructed to place between JSON objects.
pub const DEFAULT_DELIMITER: &str = "[NOVA_JSON_SEPARATOR]";

/// Tutoring mode picked by the student before a turn starts.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningMode {
    /// Guided, question-by-question help. Plain prose.
    SolveSocratic,
    /// Full worked solutions, one JSON object per question.
    SolveDirect,
    /// Concept review. Plain prose.
    Review,
    /// Answer key only, a single `finalAnswers` JSON document.
    SolveFinalAnswer,
}

impl LearningMode {
    pub fn extraction_mode(self) -> ExtractionMode {
        match self {
            LearningMode::SolveSocratic | LearningMode::Review => ExtractionMode::Prose,
            LearningMode::SolveDirect => ExtractionMode::JsonBlocks,
            LearningMode::SolveFinalAnswer => ExtractionMode::JsonDocument,
        }
    }
}

/// Strategy used to turn the chunk stream into a `ResponseModel`.
/// Selected once when the turn starts.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Free text, scanned only for image-generation markers.
    Prose,
    /// JSON objects separated by `Options::delimiter`.
    #[default]
    JsonBlocks,
    /// One JSON document for the whole response (final-answer tables).
    JsonDocument,
    /// Pseudo-XML `<question>`/`<steps>`/`<answer>` tags.
    Tags,
}

/// A user-supplied sanitizer rule, compiled when the parser is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    /// Replacement template; `$1`, `${name}` refer to capture groups.
    pub replacement: String,
}

/// User-visible strings. Defaults are the Vietnamese strings the tutor ships with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Replaces the turn content when the chunk stream fails.
    pub transport_error: String,
    /// Shown in an image slot while generation runs. `{prompt}` is substituted.
    pub image_pending: String,
    /// Shown in an image slot when generation fails. `{prompt}` is substituted.
    pub image_failed: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            transport_error:
                "Đã xảy ra lỗi khi nhận phản hồi. Vui lòng kiểm tra lại API key và thử lại."
                    .to_string(),
            image_pending: "Đang tạo hình ảnh: \"{prompt}\"...".to_string(),
            image_failed: "Rất tiếc, không thể tạo hình ảnh cho: \"{prompt}\"".to_string(),
        }
    }
}

impl Messages {
    pub fn image_pending_for(&self, prompt: &str) -> String {
        self.image_pending.replace("{prompt}", prompt)
    }

    pub fn image_failed_for(&self, prompt: &str) -> String {
        self.image_failed.replace("{prompt}", prompt)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Extraction strategy for the turn.
    pub mode: ExtractionMode,
    /// Block separator for `ExtractionMode::JsonBlocks`. Matched literally, never escaped.
    pub delimiter: String,
    /// Prefer the body of a Markdown fenced code block like ```json ... ``` as the JSON candidate.
    pub fenced_code_blocks: bool,
    /// Run the regex sanitizer when a candidate fails strict parsing.
    pub sanitize: bool,
    /// Extra sanitizer rules, applied after the built-in ones in the given order.
    pub extra_rules: Vec<RuleSpec>,
    /// Placeholder text the turn starts with. Removed once real text arrives.
    pub placeholder: Option<String>,
    /// Title for final-answer payloads that carry none.
    pub final_answer_title: String,
    /// Scan prose for `[GENERATE_IMAGE: "prompt"]` markers.
    pub image_markers: bool,
    /// Trim leading/trailing whitespace of a tag-scanner field when its closing tag arrives.
    pub trim_closed_fields: bool,
    /// Enable recovery logging. Use `TurnParser::log` to retrieve entries.
    pub logging: bool,
    /// Characters captured on both sides of a position when building log context snippets.
    pub log_context_window: usize,
    /// Localized user-visible strings.
    pub messages: Messages,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            fenced_code_blocks: true,
            sanitize: true,
            extra_rules: Vec::new(),
            placeholder: Some("Đang phân tích...".to_string()),
            final_answer_title: "Bảng Đáp Án".to_string(),
            image_markers: true,
            trim_closed_fields: true,
            logging: false,
            log_context_window: 16,
            messages: Messages::default(),
        }
    }
}

impl Options {
    pub fn for_mode(mode: LearningMode) -> Self {
        Self {
            mode: mode.extraction_mode(),
            ..Default::default()
        }
    }

    pub fn with_extraction(mode: ExtractionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }
}
