//! Identity-keyed merging of extracted entities into the turn accumulator.

use crate::extract::Payload;
use crate::images::{ImageResolution, apply_resolution};
use crate::model::{FinalAnswerSet, QuestionKey, ResponseModel, SolvedQuestion};
use crate::options::{Messages, Options};
use std::collections::BTreeMap;

/// Outcome of inserting an entity by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(usize),
    Replaced(usize),
}

impl Upsert {
    pub fn index(self) -> usize {
        match self {
            Upsert::Inserted(i) | Upsert::Replaced(i) => i,
        }
    }

    pub fn replaced(self) -> bool {
        matches!(self, Upsert::Replaced(_))
    }
}

/// Replace the element with the same key in place, or append.
pub fn upsert_by<T, K, F>(items: &mut Vec<T>, item: T, key: F) -> Upsert
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let k = key(&item);
    match items.iter().position(|existing| key(existing) == k) {
        Some(i) => {
            items[i] = item;
            Upsert::Replaced(i)
        }
        None => {
            items.push(item);
            Upsert::Inserted(items.len() - 1)
        }
    }
}

pub fn upsert_question(questions: &mut Vec<SolvedQuestion>, question: SolvedQuestion) -> Upsert {
    upsert_by(questions, question, SolvedQuestion::key)
}

/// Merge a decoded payload into the turn model. Returns how many entries
/// replaced an existing one.
pub fn merge_payload(model: &mut ResponseModel, payload: Payload, default_title: &str) -> usize {
    let mut replaced = 0usize;
    match payload {
        Payload::Question(q) => {
            replaced += usize::from(upsert_question(&mut model.questions, q).replaced());
        }
        Payload::Questions(qs) => {
            for q in qs {
                replaced += usize::from(upsert_question(&mut model.questions, q).replaced());
            }
        }
        Payload::FinalAnswers(fresh) => {
            let set = model.final_answers_mut(default_title);
            if !fresh.title.trim().is_empty() {
                set.title = fresh.title;
            }
            for a in fresh.answers {
                replaced += usize::from(set.upsert(a).replaced());
            }
        }
    }
    replaced
}

/// Cross-page accumulator for documents processed one page per model call.
///
/// Each entry remembers the page that last wrote it. Re-merging a page first
/// drops the entries that page owned but no longer produces, then upserts the
/// page's fresh set, so a later page overrides an earlier one in place and a
/// reprocessed page never leaves stale in-progress entries behind.
#[derive(Debug, Clone)]
pub struct PagedAccumulator {
    model: ResponseModel,
    question_owner: Vec<usize>,
    answer_owner: Vec<usize>,
    page_text: BTreeMap<usize, String>,
    default_title: String,
    placeholder: Option<String>,
    messages: Messages,
}

impl PagedAccumulator {
    pub fn new(opts: &Options) -> Self {
        Self {
            model: ResponseModel::pending(opts.placeholder.as_deref()),
            question_owner: Vec::new(),
            answer_owner: Vec::new(),
            page_text: BTreeMap::new(),
            default_title: opts.final_answer_title.clone(),
            placeholder: opts.placeholder.clone(),
            messages: opts.messages.clone(),
        }
    }

    pub fn model(&self) -> &ResponseModel {
        &self.model
    }

    pub fn snapshot(&self) -> ResponseModel {
        self.model.clone()
    }

    /// Page that currently owns the question at `index`.
    pub fn question_page(&self, index: usize) -> Option<usize> {
        self.question_owner.get(index).copied()
    }

    pub fn merge_page(&mut self, page: usize, fresh: &ResponseModel) {
        if self.model.is_complete() {
            return;
        }
        self.model.mark_streaming();
        self.merge_questions(page, fresh);
        if let Some(set) = &fresh.final_answers {
            self.merge_answers(page, set);
        }
        for slot in &fresh.images {
            // a resolved slot is never downgraded by a later merge of its page
            let resolved = self
                .model
                .images
                .iter()
                .any(|s| s.id == slot.id && !s.is_pending());
            if !resolved {
                upsert_by(&mut self.model.images, slot.clone(), |s| s.id.clone());
            }
        }
        if fresh.error.is_some() {
            self.model.error = fresh.error.clone();
        }

        let mut text = fresh.text.clone();
        if let Some(marker) = self.placeholder.as_deref().filter(|m| !m.is_empty()) {
            text = text.replace(marker, "");
        }
        self.page_text.insert(page, text);
        self.rebuild_text();
    }

    fn merge_questions(&mut self, page: usize, fresh: &ResponseModel) {
        let fresh_keys: Vec<QuestionKey> = fresh.questions.iter().map(SolvedQuestion::key).collect();
        let mut i = 0;
        while i < self.model.questions.len() {
            if self.question_owner[i] == page && !fresh_keys.contains(&self.model.questions[i].key()) {
                self.model.questions.remove(i);
                self.question_owner.remove(i);
            } else {
                i += 1;
            }
        }
        for q in &fresh.questions {
            match upsert_question(&mut self.model.questions, q.clone()) {
                Upsert::Inserted(_) => self.question_owner.push(page),
                Upsert::Replaced(idx) => self.question_owner[idx] = page,
            }
        }
    }

    fn merge_answers(&mut self, page: usize, fresh: &FinalAnswerSet) {
        let title = self.default_title.clone();
        let set = self.model.final_answers_mut(&title);
        // a page parser fills in the default title; that never overrides a real one
        if !fresh.title.trim().is_empty() && fresh.title != title {
            set.title = fresh.title.clone();
        }
        let fresh_numbers: Vec<&str> = fresh.answers.iter().map(|a| a.number.trim()).collect();
        let mut i = 0;
        while i < set.answers.len() {
            if self.answer_owner[i] == page && !fresh_numbers.contains(&set.answers[i].number.trim()) {
                set.answers.remove(i);
                self.answer_owner.remove(i);
            } else {
                i += 1;
            }
        }
        for a in &fresh.answers {
            match set.upsert(a.clone()) {
                Upsert::Inserted(_) => self.answer_owner.push(page),
                Upsert::Replaced(idx) => self.answer_owner[idx] = page,
            }
        }
    }

    fn rebuild_text(&mut self) {
        let pieces: Vec<&str> = self
            .page_text
            .values()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if pieces.is_empty() {
            // keep the placeholder until some page produces text
            if self.model.questions.is_empty() && self.model.final_answers.is_none() {
                return;
            }
            self.model.text.clear();
        } else {
            self.model.text = pieces.join("\n\n");
        }
    }

    /// Patch an image slot; allowed after `finish`.
    pub fn apply_image(&mut self, resolution: ImageResolution) -> bool {
        apply_resolution(&mut self.model, resolution, &self.messages)
    }

    /// Freeze the accumulator. Dangling entities are force-closed.
    pub fn finish(&mut self) {
        if self.model.is_complete() {
            return;
        }
        self.model.force_close();
        self.model.strip_placeholder(self.placeholder.as_deref());
        self.model.text = self.model.text.trim().to_string();
        self.model.mark_complete();
    }

    /// Freeze after a transport failure, keeping whatever structured content arrived.
    pub fn fail(&mut self, message: &str) {
        if self.model.is_complete() {
            return;
        }
        self.model.force_close();
        self.model.text = message.to_string();
        self.model.error = Some(message.to_string());
        self.model.mark_complete();
    }
}
