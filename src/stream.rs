use crate::classify::Utf8Decoder;
use crate::error::NovaError;
use crate::extract::{self, Extraction};
use crate::images::{
    ImageResolution, MarkerScanner, ProseEvent, SideEffect, apply_resolution, placeholder_id,
};
use crate::merge::merge_payload;
use crate::model::{ImageSlot, ImageStatus, ResponseModel, TurnState};
use crate::options::{ExtractionMode, Options};
use crate::recovery::{RecoveryLog, RecoveryLogEntry};
use crate::sanitize::Sanitizer;
use crate::scanner::TagScanner;
use crate::splitter::DelimiterSplitter;

enum Strategy {
    Prose(Option<MarkerScanner>),
    JsonBlocks(DelimiterSplitter),
    JsonDocument(String),
    Tags(TagScanner),
}

/// Per-turn parser. Owns the accumulator for one model response: feed it
/// chunks as they arrive, read snapshots between chunks, then `finish` (or
/// `fail`) exactly once.
///
/// Every call leaves the model renderable. Splitting the same response into
/// different chunks yields the same final model.
pub struct TurnParser {
    opts: Options,
    model: ResponseModel,
    strategy: Strategy,
    decoder: Utf8Decoder,
    sanitizer: Sanitizer,
    log: RecoveryLog,
    chunks: usize,
    images_requested: usize,
    page: Option<usize>,
}

impl TurnParser {
    /// Build a parser for one turn. Fails only when an extra sanitizer rule
    /// does not compile.
    pub fn new(opts: Options) -> Result<Self, NovaError> {
        let sanitizer = Sanitizer::with_extra(&opts.extra_rules)?;
        let strategy = match opts.mode {
            ExtractionMode::Prose => Strategy::Prose(opts.image_markers.then(MarkerScanner::new)),
            ExtractionMode::JsonBlocks => Strategy::JsonBlocks(DelimiterSplitter::new(&opts.delimiter)),
            ExtractionMode::JsonDocument => Strategy::JsonDocument(String::new()),
            ExtractionMode::Tags => Strategy::Tags(TagScanner::new(&opts)),
        };
        Ok(Self {
            model: ResponseModel::pending(opts.placeholder.as_deref()),
            log: RecoveryLog::new(opts.logging, opts.log_context_window),
            opts,
            strategy,
            decoder: Utf8Decoder::new(),
            sanitizer,
            chunks: 0,
            images_requested: 0,
            page: None,
        })
    }

    /// Parser for one page of a multi-page document. Image placeholder ids
    /// carry the page so they stay unique across pages.
    pub fn for_page(opts: Options, page: usize) -> Result<Self, NovaError> {
        let mut parser = Self::new(opts)?;
        parser.page = Some(page);
        Ok(parser)
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn model(&self) -> &ResponseModel {
        &self.model
    }

    pub fn snapshot(&self) -> ResponseModel {
        self.model.clone()
    }

    pub fn into_model(self) -> ResponseModel {
        self.model
    }

    pub fn state(&self) -> TurnState {
        self.model.state
    }

    /// Recovery log entries; empty unless `Options::logging` is set.
    pub fn log(&self) -> &[RecoveryLogEntry] {
        self.log.entries()
    }

    /// Feed one text chunk. Returns the side effects it triggered.
    pub fn push(&mut self, chunk: &str) -> Result<Vec<SideEffect>, NovaError> {
        if self.model.is_complete() {
            return Err(NovaError::TurnComplete);
        }
        self.model.mark_streaming();
        Ok(self.process(chunk))
    }

    /// Feed raw bytes. A multi-byte character cut by the chunk boundary is
    /// completed by the next call.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<SideEffect>, NovaError> {
        if self.model.is_complete() {
            return Err(NovaError::TurnComplete);
        }
        self.model.mark_streaming();
        let text = self.decoder.decode(bytes);
        Ok(self.process(&text))
    }

    fn process(&mut self, chunk: &str) -> Vec<SideEffect> {
        self.chunks += 1;
        let mut effects = Vec::new();
        if chunk.is_empty() {
            return effects;
        }
        let placeholder = self.opts.placeholder.clone();
        match &mut self.strategy {
            Strategy::Prose(scanner) => {
                let events = match scanner {
                    Some(s) => s.push(chunk),
                    None => vec![ProseEvent::Text(chunk.to_string())],
                };
                self.apply_prose(events, &mut effects);
            }
            Strategy::JsonBlocks(splitter) => {
                let first = splitter.emitted();
                let blocks = splitter.push(chunk);
                for (i, block) in blocks.iter().enumerate() {
                    self.apply_block(first + i, block);
                }
            }
            Strategy::JsonDocument(buf) => {
                buf.push_str(chunk);
                // live view; the extraction at finish is authoritative. The
                // document can only become parseable on a closing bracket.
                if memchr::memchr2(b'}', b']', chunk.as_bytes()).is_some() {
                    let sanitizer = self.opts.sanitize.then_some(&self.sanitizer);
                    let live = extract::extract_block_logged(
                        buf,
                        self.opts.fenced_code_blocks,
                        sanitizer,
                        &mut RecoveryLog::disabled(),
                    );
                    if live.payload.is_some() {
                        self.render_document(live);
                    }
                }
            }
            Strategy::Tags(scanner) => {
                self.log.set_block(self.chunks - 1);
                scanner.feed_logged(chunk, &mut self.model, &mut self.log);
            }
        }
        if !self.model.questions.is_empty() || self.model.final_answers.is_some() {
            self.model.strip_placeholder(placeholder.as_deref());
        }
        tracing::trace!(chunk = self.chunks, len = chunk.len(), "chunk processed");
        effects
    }

    fn apply_prose(&mut self, events: Vec<ProseEvent>, effects: &mut Vec<SideEffect>) {
        let placeholder = self.opts.placeholder.as_deref();
        for event in events {
            match event {
                ProseEvent::Text(text) => self.model.append_text(&text, placeholder),
                ProseEvent::Marker(prompt) => {
                    self.model.strip_placeholder(placeholder);
                    let id = placeholder_id(self.page, self.images_requested);
                    self.images_requested += 1;
                    tracing::debug!(id = %id, prompt = %prompt, "image requested");
                    self.model.images.push(ImageSlot {
                        id: id.clone(),
                        prompt: prompt.clone(),
                        offset: self.model.text.len(),
                        status: ImageStatus::Pending {
                            message: self.opts.messages.image_pending_for(&prompt),
                        },
                    });
                    effects.push(SideEffect::GenerateImage {
                        placeholder_id: id,
                        prompt,
                    });
                }
            }
        }
    }

    fn apply_block(&mut self, index: usize, block: &str) {
        self.log.set_block(index);
        let sanitizer = self.opts.sanitize.then_some(&self.sanitizer);
        let extraction =
            extract::extract_block_logged(block, self.opts.fenced_code_blocks, sanitizer, &mut self.log);
        self.model
            .append_preamble(&extraction.preamble, self.opts.placeholder.as_deref());
        if let Some(payload) = extraction.payload {
            let replaced = merge_payload(&mut self.model, payload, &self.opts.final_answer_title);
            if replaced > 0 {
                self.log.log(0, "replaced duplicate identity");
                tracing::debug!(block = index, replaced, "replaced duplicate identity");
            }
        }
    }

    /// Replace the structured content with a fresh extraction of the whole document.
    fn render_document(&mut self, extraction: Extraction) {
        self.model.questions.clear();
        self.model.final_answers = None;
        self.model.text = self.opts.placeholder.clone().unwrap_or_default();
        self.model
            .append_preamble(&extraction.preamble, self.opts.placeholder.as_deref());
        if let Some(payload) = extraction.payload {
            merge_payload(&mut self.model, payload, &self.opts.final_answer_title);
        }
    }

    /// End of stream: flush buffered input, force-close open entities and
    /// freeze the model. No-op once the turn is complete.
    pub fn finish(&mut self) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if self.model.is_complete() {
            return effects;
        }
        let tail = self.decoder.finish();
        if !tail.is_empty() {
            effects = self.process(&tail);
        }
        match &mut self.strategy {
            Strategy::Prose(scanner) => {
                if let Some(rest) = scanner.as_mut().and_then(MarkerScanner::finish) {
                    self.apply_prose(vec![ProseEvent::Text(rest)], &mut effects);
                }
            }
            Strategy::JsonBlocks(splitter) => {
                let index = splitter.emitted();
                if let Some(block) = splitter.flush() {
                    self.apply_block(index, &block);
                }
            }
            Strategy::JsonDocument(buf) => {
                let doc = std::mem::take(buf);
                self.log.set_block(0);
                let sanitizer = self.opts.sanitize.then_some(&self.sanitizer);
                let extraction =
                    extract::extract_block_logged(&doc, self.opts.fenced_code_blocks, sanitizer, &mut self.log);
                self.render_document(extraction);
            }
            Strategy::Tags(scanner) => scanner.finish_logged(&mut self.model, &mut self.log),
        }
        let closed = self.model.force_close();
        if closed > 0 {
            self.log.log(0, "force-closed open entities at stream end");
            tracing::debug!(closed, "force-closed open entities at stream end");
        }
        self.model.strip_placeholder(self.opts.placeholder.as_deref());
        if self.model.text.trim().is_empty() {
            self.model.text.clear();
        }
        self.model.mark_complete();
        tracing::debug!(
            chunks = self.chunks,
            questions = self.model.questions.len(),
            images = self.model.images.len(),
            "turn complete"
        );
        effects
    }

    /// Transport failure: the message becomes the text, structured content
    /// already merged is kept and closed, buffered input is dropped.
    pub fn fail(&mut self, message: &str) {
        if self.model.is_complete() {
            return;
        }
        tracing::warn!(chunks = self.chunks, "turn failed: {message}");
        self.model.force_close();
        self.model.text = message.to_string();
        self.model.error = Some(message.to_string());
        self.model.mark_complete();
    }

    /// Patch the image slot named by the resolution. Allowed after the turn
    /// completed. Returns false for an unknown id.
    pub fn apply_image(&mut self, resolution: ImageResolution) -> bool {
        apply_resolution(&mut self.model, resolution, &self.opts.messages)
    }
}
