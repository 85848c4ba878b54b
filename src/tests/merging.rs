use super::*;
use crate::merge::{merge_payload, upsert_by, upsert_question};

fn answer(number: &str, answer: &str) -> SolvedQuestion {
    SolvedQuestion {
        answer: Some(answer.to_string()),
        ..question(number)
    }
}

fn final_page(answers: &[(&str, &str)]) -> ResponseModel {
    let body: Vec<String> = answers
        .iter()
        .map(|(n, a)| format!(r#"{{"number": "{n}", "answer": "{a}"}}"#))
        .collect();
    let doc = format!(r#"{{"finalAnswers": {{"answers": [{}]}}}}"#, body.join(", "));
    parse_to_model(&doc, &Options::for_mode(LearningMode::SolveFinalAnswer)).unwrap()
}

#[test]
fn upsert_keeps_first_seen_position() {
    let mut qs = vec![answer("1", "A"), answer("2", "B")];
    let r = upsert_question(&mut qs, answer("1", "C"));
    assert_eq!(r, Upsert::Replaced(0));
    let r = upsert_question(&mut qs, answer("3", "D"));
    assert_eq!(r, Upsert::Inserted(2));
    let got: Vec<(&str, Option<&str>)> =
        qs.iter().map(|q| (q.number.as_str(), q.answer.as_deref())).collect();
    assert_eq!(got, vec![("1", Some("C")), ("2", Some("B")), ("3", Some("D"))]);
}

#[test]
fn identity_ignores_surrounding_whitespace() {
    let mut qs = vec![answer(" 4 ", "A")];
    assert!(upsert_question(&mut qs, answer("4", "B")).replaced());
    assert_eq!(qs.len(), 1);

    let mut items = vec![1, 2, 3];
    assert_eq!(upsert_by(&mut items, 12, |x| x % 10), Upsert::Replaced(1));
    assert_eq!(items, vec![1, 12, 3]);
}

#[test]
fn merging_the_same_payload_twice_is_idempotent() {
    let mut m = ResponseModel::pending(None);
    let payload = Payload::Questions(vec![answer("1", "A"), answer("2", "B")]);
    assert_eq!(merge_payload(&mut m, payload.clone(), "T"), 0);
    let once = serde_json::to_string(&m).unwrap();
    assert_eq!(merge_payload(&mut m, payload, "T"), 2);
    assert_eq!(serde_json::to_string(&m).unwrap(), once);
}

#[test]
fn final_answer_payload_keeps_existing_title_when_blank() {
    let mut m = ResponseModel::pending(None);
    let mut set = FinalAnswerSet::new("Đề 102");
    set.upsert(FinalAnswer::new("1", "A"));
    merge_payload(&mut m, Payload::FinalAnswers(set), "Bảng Đáp Án");

    let mut untitled = FinalAnswerSet::new("");
    untitled.upsert(FinalAnswer::new("1", "B"));
    untitled.upsert(FinalAnswer::new("2", "C"));
    assert_eq!(merge_payload(&mut m, Payload::FinalAnswers(untitled), "Bảng Đáp Án"), 1);

    let set = m.final_answers.unwrap();
    assert_eq!(set.title, "Đề 102");
    assert_eq!(set.answers, vec![FinalAnswer::new("1", "B"), FinalAnswer::new("2", "C")]);
}

#[test]
fn later_page_overrides_answer_in_place() {
    let opts = Options::for_mode(LearningMode::SolveFinalAnswer);
    let mut acc = PagedAccumulator::new(&opts);
    acc.merge_page(1, &final_page(&[("1", "A"), ("2", "B")]));
    acc.merge_page(2, &final_page(&[("1", "C"), ("3", "D")]));
    acc.finish();

    let m = acc.model();
    let set = m.final_answers.as_ref().unwrap();
    assert_eq!(
        set.answers,
        vec![
            FinalAnswer::new("1", "C"),
            FinalAnswer::new("2", "B"),
            FinalAnswer::new("3", "D")
        ]
    );
    assert_eq!(set.title, "Bảng Đáp Án");
    assert!(m.is_complete());
    assert_eq!(m.text, "");
}

#[test]
fn reprocessed_page_drops_stale_entries() {
    let opts = sep_opts(ExtractionMode::JsonBlocks);
    let mut acc = PagedAccumulator::new(&opts);

    let page1 = parse_to_model(r#"{"number":"1","answer":"A"}[SEP]{"number":"2","answer":"B"}"#, &opts).unwrap();
    let page2 = parse_to_model(r#"{"number":"3","answer":"C"}"#, &opts).unwrap();
    acc.merge_page(1, &page1);
    acc.merge_page(2, &page2);

    // page 1 again, this time without question 2
    let retry = parse_to_model(r#"{"number":"1","answer":"A2"}"#, &opts).unwrap();
    acc.merge_page(1, &retry);

    let numbers: Vec<&str> = acc.model().questions.iter().map(|q| q.number.as_str()).collect();
    assert_eq!(numbers, vec!["1", "3"]);
    assert_eq!(acc.model().questions[0].answer.as_deref(), Some("A2"));
    assert_eq!(acc.question_page(0), Some(1));
    assert_eq!(acc.question_page(1), Some(2));
}

#[test]
fn question_moved_to_later_page_changes_owner() {
    let opts = sep_opts(ExtractionMode::JsonBlocks);
    let mut acc = PagedAccumulator::new(&opts);
    acc.merge_page(1, &parse_to_model(r#"{"number":"7","answer":"A"}"#, &opts).unwrap());
    acc.merge_page(2, &parse_to_model(r#"{"number":"7","answer":"B"}"#, &opts).unwrap());
    assert_eq!(acc.question_page(0), Some(2));
    // reprocessing page 1 without the question no longer removes it
    acc.merge_page(1, &parse_to_model("Trang này không có câu hỏi.", &opts).unwrap());
    assert_eq!(acc.model().questions.len(), 1);
    assert_eq!(acc.model().questions[0].answer.as_deref(), Some("B"));
    assert_eq!(acc.model().text, "Trang này không có câu hỏi.");
}

#[test]
fn page_text_is_joined_in_page_order() {
    let opts = Options::for_mode(LearningMode::Review);
    let mut acc = PagedAccumulator::new(&opts);
    assert_eq!(acc.model().text, "Đang phân tích...");
    acc.merge_page(2, &parse_to_model("second", &opts).unwrap());
    acc.merge_page(1, &parse_to_model("first", &opts).unwrap());
    assert_eq!(acc.model().text, "first\n\nsecond");
    acc.finish();
    // frozen
    acc.merge_page(3, &parse_to_model("third", &opts).unwrap());
    assert_eq!(acc.model().text, "first\n\nsecond");
}

#[test]
fn failed_accumulator_keeps_structured_content() {
    let opts = sep_opts(ExtractionMode::JsonBlocks);
    let mut acc = PagedAccumulator::new(&opts);
    acc.merge_page(1, &parse_to_model(r#"{"number":"1","answer":"A"}"#, &opts).unwrap());
    acc.fail("mất kết nối");
    let m = acc.snapshot();
    assert_eq!(m.text, "mất kết nối");
    assert_eq!(m.error.as_deref(), Some("mất kết nối"));
    assert_eq!(m.questions.len(), 1);
    assert!(m.is_complete());
}
