use crate::error::{ParseError, ParseErrorKind};
use crate::model::{FinalAnswer, FinalAnswerSet, SolvedQuestion};
use serde_json::{Map, Value};

/// A structured entity decoded from one JSON candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Question(SolvedQuestion),
    Questions(Vec<SolvedQuestion>),
    FinalAnswers(FinalAnswerSet),
}

impl Payload {
    /// Number of entities carried.
    pub fn len(&self) -> usize {
        match self {
            Payload::Question(_) => 1,
            Payload::Questions(qs) => qs.len(),
            Payload::FinalAnswers(set) => set.answers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode a parsed candidate. The block it came from is closed, so every
/// question and part is marked complete.
pub fn decode_payload(value: Value) -> Result<Payload, ParseError> {
    match value {
        Value::Array(items) => decode_questions(items).map(Payload::Questions),
        Value::Object(mut obj) => {
            if let Some(inner) = obj.remove("finalAnswers") {
                return decode_final_answers(inner).map(Payload::FinalAnswers);
            }
            if let Some(Value::Array(items)) = obj.get("questions")
                && !obj.contains_key("number")
            {
                return decode_questions(items.clone()).map(Payload::Questions);
            }
            if obj.contains_key("number") {
                return decode_question(obj).map(Payload::Question);
            }
            if matches!(obj.get("answers"), Some(Value::Array(_))) {
                return decode_final_answers(Value::Object(obj)).map(Payload::FinalAnswers);
            }
            Err(unrecognized())
        }
        _ => Err(unrecognized()),
    }
}

fn unrecognized() -> ParseError {
    ParseError::new(ParseErrorKind::UnrecognizedShape, 0)
}

fn decode_question(obj: Map<String, Value>) -> Result<SolvedQuestion, ParseError> {
    let mut q: SolvedQuestion = serde_json::from_value(Value::Object(obj))
        .map_err(|e| ParseError::from_serde("decode", e))?;
    if q.number.trim().is_empty() {
        return Err(unrecognized());
    }
    q.normalize();
    q.complete();
    Ok(q)
}

fn decode_questions(items: Vec<Value>) -> Result<Vec<SolvedQuestion>, ParseError> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(obj) => decode_question(obj),
            _ => Err(unrecognized()),
        })
        .collect()
}

fn decode_final_answers(value: Value) -> Result<FinalAnswerSet, ParseError> {
    let mut set = match value {
        // `"finalAnswers": [{...}]` without the title wrapper
        Value::Array(items) => FinalAnswerSet {
            title: String::new(),
            answers: serde_json::from_value::<Vec<FinalAnswer>>(Value::Array(items))
                .map_err(|e| ParseError::from_serde("decode", e))?,
        },
        other @ Value::Object(_) => serde_json::from_value::<FinalAnswerSet>(other)
            .map_err(|e| ParseError::from_serde("decode", e))?,
        _ => return Err(unrecognized()),
    };
    // duplicates inside one payload collapse the same way as across payloads
    let answers = std::mem::take(&mut set.answers);
    for a in answers {
        if !a.number.trim().is_empty() {
            set.upsert(a);
        }
    }
    Ok(set)
}
