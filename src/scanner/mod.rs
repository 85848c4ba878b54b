//! Character-level state machine over the pseudo-XML answer protocol.
//!
//! The stream is incomplete XML at every intermediate point, so this is not an
//! XML parser: tags are recognized one at a time, text is routed to whichever
//! field is currently open, and anything unexpected is skipped. A tag cut by a
//! chunk boundary stays in the tag buffer until its `>` arrives.

mod tag;

pub use tag::{Tag, parse_tag};

use crate::classify::is_tag_name_start;
use crate::merge::upsert_question;
use crate::model::{FinalAnswer, ResponseModel, SolvedPart, SolvedQuestion};
use crate::options::Options;
use crate::recovery::RecoveryLog;

// Longer "tags" are literal text (e.g. `a < b` followed by prose).
const MAX_TAG_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No question open; text is discarded.
    OutsideTag,
    /// Buffering `<...>`.
    InTag,
    InSteps,
    InAnswer,
    InPartSteps,
    InPartAnswer,
    /// Inside a question or part, between fields.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Steps,
    Answer,
    PartSteps,
    PartAnswer,
    FinalAnswer,
}

#[derive(Debug)]
pub struct TagScanner {
    tag_buf: Option<String>,
    target: Option<Target>,
    pending: String,
    question: Option<usize>,
    part: Option<usize>,
    // index into the final-answer set of the open top-level answer
    final_answer: Option<usize>,
    opened: usize,
    trim_closed: bool,
    default_title: String,
    // byte offset of the current char in the current chunk, for the log
    pos: usize,
}

impl TagScanner {
    pub fn new(opts: &Options) -> Self {
        Self {
            tag_buf: None,
            target: None,
            pending: String::new(),
            question: None,
            part: None,
            final_answer: None,
            opened: 0,
            trim_closed: opts.trim_closed_fields,
            default_title: opts.final_answer_title.clone(),
            pos: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        if self.tag_buf.is_some() {
            return ScanState::InTag;
        }
        match self.target {
            Some(Target::Steps) => ScanState::InSteps,
            Some(Target::Answer | Target::FinalAnswer) => ScanState::InAnswer,
            Some(Target::PartSteps) => ScanState::InPartSteps,
            Some(Target::PartAnswer) => ScanState::InPartAnswer,
            None if self.question.is_some() => ScanState::Idle,
            None => ScanState::OutsideTag,
        }
    }

    /// Index of the open question in `ResponseModel::questions`.
    pub fn current_question(&self) -> Option<usize> {
        self.question
    }

    pub fn feed(&mut self, chunk: &str, model: &mut ResponseModel) {
        self.feed_logged(chunk, model, &mut RecoveryLog::disabled());
    }

    pub(crate) fn feed_logged(&mut self, chunk: &str, model: &mut ResponseModel, log: &mut RecoveryLog) {
        for (pos, c) in chunk.char_indices() {
            self.pos = pos;
            self.step(c, model, log);
        }
        // publish field text seen so far; a partial tag stays buffered
        self.flush(model);
    }

    /// Force-close everything still open at stream end.
    pub fn finish(&mut self, model: &mut ResponseModel) {
        self.finish_logged(model, &mut RecoveryLog::disabled());
    }

    pub(crate) fn finish_logged(&mut self, model: &mut ResponseModel, log: &mut RecoveryLog) {
        if let Some(buf) = self.tag_buf.take() {
            log.log(self.pos, "dropped unterminated tag at stream end");
            tracing::debug!(tag = %buf, "dropped unterminated tag at stream end");
        }
        self.flush(model);
        self.close_target(model);
        if self.question.is_some() {
            log.log(self.pos, "force-closed open question at stream end");
        }
        self.close_question(model);
    }

    fn step(&mut self, c: char, model: &mut ResponseModel, log: &mut RecoveryLog) {
        let Some(buf) = self.tag_buf.as_mut() else {
            if c == '<' {
                self.flush(model);
                self.tag_buf = Some(String::new());
            } else if self.target.is_some() {
                self.pending.push(c);
            }
            return;
        };
        if c == '>' {
            let inner = std::mem::take(buf);
            self.tag_buf = None;
            match parse_tag(&inner) {
                Some(tag) => self.dispatch(tag, &inner, model, log),
                None => self.literal(&inner, Some('>'), log),
            }
            return;
        }
        let starts_tag = match buf.as_str() {
            "" => is_tag_name_start(c) || c == '/',
            "/" => is_tag_name_start(c),
            _ => true,
        };
        if !starts_tag || c == '<' {
            // the previous `<` was literal; `c` is handled on its own
            let inner = std::mem::take(buf);
            self.tag_buf = None;
            self.literal(&inner, None, log);
            self.step(c, model, log);
            return;
        }
        buf.push(c);
        if buf.len() > MAX_TAG_LEN {
            let inner = std::mem::take(buf);
            self.tag_buf = None;
            self.literal(&inner, None, log);
        }
    }

    /// Keep `<inner[tail]` as field text, or drop it outside a field.
    fn literal(&mut self, inner: &str, tail: Option<char>, log: &mut RecoveryLog) {
        if self.target.is_none() {
            return;
        }
        log.log(self.pos, "kept '<' as literal text");
        self.pending.push('<');
        self.pending.push_str(inner);
        if let Some(t) = tail {
            self.pending.push(t);
        }
    }

    fn dispatch(&mut self, tag: Tag, raw: &str, model: &mut ResponseModel, log: &mut RecoveryLog) {
        match (tag.name.as_str(), tag.closing) {
            ("question", false) => {
                self.open_question(&tag, model, log);
                if tag.self_closing {
                    self.close_question(model);
                }
            }
            ("question", true) => {
                self.close_target(model);
                self.close_question(model);
            }
            ("part", false) if self.question.is_some() => {
                self.open_part(&tag, model, log);
                if tag.self_closing {
                    self.close_part(model);
                }
            }
            ("part", true) if self.question.is_some() => {
                self.close_target(model);
                self.close_part(model);
            }
            ("steps", false) if self.question.is_some() => {
                self.close_target(model);
                let target = if self.part.is_some() { Target::PartSteps } else { Target::Steps };
                self.open_field(target, model);
            }
            ("answer", false) if self.question.is_some() => {
                self.close_target(model);
                let target = if self.part.is_some() { Target::PartAnswer } else { Target::Answer };
                self.open_field(target, model);
            }
            ("answer", false) if tag.attr_nonblank("number").is_some() => {
                self.close_target(model);
                let number = tag.attr_nonblank("number").unwrap_or_default();
                let title = self.default_title.clone();
                let upsert = model.final_answers_mut(&title).upsert(FinalAnswer::new(number, ""));
                if upsert.replaced() {
                    log.log(self.pos, "replaced duplicate final answer");
                }
                self.final_answer = Some(upsert.index());
                self.target = Some(Target::FinalAnswer);
                if tag.self_closing {
                    self.close_target(model);
                }
            }
            ("steps" | "answer", true) => self.close_target(model),
            ("final_answers", false) => {
                let title = self.default_title.clone();
                let set = model.final_answers_mut(&title);
                if let Some(t) = tag.attr_nonblank("title") {
                    set.title = t.to_string();
                }
            }
            ("final_answers", true) => {}
            _ if self.target.is_some() => {
                // unknown markup inside a field is part of the text
                self.pending.push('<');
                self.pending.push_str(raw);
                self.pending.push('>');
            }
            _ => {
                log.log(self.pos, "ignored unknown tag");
                tracing::debug!(tag = %tag.name, "ignored unknown tag");
            }
        }
    }

    fn open_question(&mut self, tag: &Tag, model: &mut ResponseModel, log: &mut RecoveryLog) {
        if self.question.is_some() {
            log.log(self.pos, "closed question missing its closing tag");
            self.close_target(model);
            self.close_question(model);
        }
        self.opened += 1;
        let number = tag
            .attr_nonblank("number")
            .map(str::to_string)
            .unwrap_or_else(|| self.opened.to_string());
        let test_code = tag.attr_nonblank("test_code").map(str::to_string);
        let upsert = upsert_question(&mut model.questions, SolvedQuestion::new(test_code, number));
        if upsert.replaced() {
            log.log(self.pos, "replaced duplicate question");
            tracing::debug!(index = upsert.index(), "replaced duplicate question");
        }
        self.question = Some(upsert.index());
        self.part = None;
    }

    fn open_part(&mut self, tag: &Tag, model: &mut ResponseModel, log: &mut RecoveryLog) {
        self.close_target(model);
        self.close_part(model);
        let Some(q) = self.question.and_then(|i| model.questions.get_mut(i)) else {
            return;
        };
        let number = tag
            .attr_nonblank("number")
            .map(str::to_string)
            .unwrap_or_else(|| part_label(q.parts.len()));
        let upsert = q.upsert_part(SolvedPart::new(number));
        if upsert.replaced() {
            log.log(self.pos, "replaced duplicate part");
        }
        self.part = Some(upsert.index());
    }

    fn open_field(&mut self, target: Target, model: &mut ResponseModel) {
        if let Some(field) = self.field_mut(target, model) {
            *field = Some(String::new());
            self.target = Some(target);
        }
    }

    fn field_mut<'m>(&self, target: Target, model: &'m mut ResponseModel) -> Option<&'m mut Option<String>> {
        let q = model.questions.get_mut(self.question?)?;
        match target {
            Target::Steps => Some(&mut q.steps),
            Target::Answer => Some(&mut q.answer),
            Target::PartSteps => Some(&mut q.parts.get_mut(self.part?)?.steps),
            Target::PartAnswer => Some(&mut q.parts.get_mut(self.part?)?.answer),
            Target::FinalAnswer => None,
        }
    }

    fn final_answer_mut<'m>(&self, model: &'m mut ResponseModel) -> Option<&'m mut FinalAnswer> {
        model.final_answers.as_mut()?.answers.get_mut(self.final_answer?)
    }

    fn flush(&mut self, model: &mut ResponseModel) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        match self.target {
            Some(Target::FinalAnswer) => {
                if let Some(fa) = self.final_answer_mut(model) {
                    fa.answer.push_str(&text);
                }
            }
            Some(t) => {
                if let Some(field) = self.field_mut(t, model) {
                    field.get_or_insert_with(String::new).push_str(&text);
                }
            }
            None => {}
        }
    }

    fn close_target(&mut self, model: &mut ResponseModel) {
        self.flush(model);
        let Some(target) = self.target.take() else {
            return;
        };
        if target == Target::FinalAnswer {
            if self.trim_closed
                && let Some(fa) = self.final_answer_mut(model)
            {
                fa.answer = fa.answer.trim().to_string();
            }
            self.final_answer = None;
            return;
        }
        let trim = self.trim_closed;
        if let Some(field) = self.field_mut(target, model)
            && trim
            && let Some(text) = field.as_mut()
        {
            *text = text.trim().to_string();
        }
    }

    fn close_part(&mut self, model: &mut ResponseModel) {
        if let Some(p) = self.part.take()
            && let Some(part) = self.question.and_then(|q| model.questions.get_mut(q)?.part_mut(p))
        {
            part.is_complete = true;
        }
    }

    fn close_question(&mut self, model: &mut ResponseModel) {
        self.close_part(model);
        if let Some(q) = self.question.take().and_then(|i| model.questions.get_mut(i)) {
            q.normalize();
            q.complete();
        }
    }
}

fn part_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'a' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}
