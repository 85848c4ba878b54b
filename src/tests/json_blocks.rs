use super::*;

fn blocks(chunks: &[&str]) -> ResponseModel {
    parse_chunks_to_model(chunks.iter().copied(), &sep_opts(ExtractionMode::JsonBlocks)).unwrap()
}

#[test]
fn question_completes_when_separator_arrives() {
    let opts = sep_opts(ExtractionMode::JsonBlocks);
    let mut p = TurnParser::new(opts).unwrap();
    p.push(r#"{"number":"1","ans"#).unwrap();
    assert!(p.model().questions.is_empty());
    p.push(r#"wer":"A"}[SEP]"#).unwrap();
    let q = &p.model().questions[0];
    assert_eq!(q.number, "1");
    assert_eq!(q.answer.as_deref(), Some("A"));
    assert!(q.is_complete);
    assert_eq!(p.model().text, "");
}

#[test]
fn every_split_point_gives_the_same_question() {
    let input = r#"{"number":"1","answer":"A"}[SEP]"#;
    let whole = blocks(&[input]);
    for cut in 1..input.len() {
        let m = blocks(&[&input[..cut], &input[cut..]]);
        assert_eq!(m, whole, "cut at {cut}");
    }
    assert_eq!(whole.questions.len(), 1);
    assert_eq!(whole.questions[0].answer.as_deref(), Some("A"));
}

#[test]
fn fenced_block_with_bare_enum() {
    let m = blocks(&["```json\n{\"number\": \"2\", \"answer\": A}\n```[SEP]"]);
    assert_eq!(m.questions.len(), 1);
    assert_eq!(m.questions[0].number, "2");
    assert_eq!(m.questions[0].answer.as_deref(), Some("A"));
    assert_eq!(m.text, "");
}

#[test]
fn text_around_candidate_becomes_preamble() {
    let m = blocks(&[
        "Chúng ta cùng giải nhé.\n```json\n{\"number\": \"1\", \"answer\": \"B\"}\n```\nXem tiếp.[SEP]",
        "Intro two {\"number\": \"2\", \"steps\": \"a {b} c\"}[SEP]",
    ]);
    assert_eq!(m.text, "Chúng ta cùng giải nhé.\n\nXem tiếp.\n\nIntro two");
    assert_eq!(m.questions.len(), 2);
    assert_eq!(m.questions[1].steps.as_deref(), Some("a {b} c"));
}

#[test]
fn nested_objects_and_braces_in_strings() {
    let block = r#"{"number": "3", "steps": "set {x | x > 0} and \"}\"", "parts": [{"number": "a", "answer": "1"}, {"number": "b", "answer": "2"}]} trailing"#;
    let c = extract::locate_candidate(block, true).unwrap();
    assert!(c.json.ends_with("]}"));
    assert_eq!(c.after, " trailing");
    let m = blocks(&[block, "[SEP]"]);
    let q = &m.questions[0];
    assert_eq!(q.parts.len(), 2);
    assert!(q.parts.iter().all(|p| p.is_complete));
    assert_eq!(m.text, "trailing");
}

#[test]
fn unterminated_fence_runs_to_block_end() {
    let m = blocks(&["```json\n{\"number\": \"4\", \"answer\": \"D\"}\n"]);
    assert_eq!(m.questions[0].answer.as_deref(), Some("D"));
}

#[test]
fn fence_can_be_disabled() {
    let block = "```\nnot json\n```\n{\"number\": \"1\"}";
    let c = extract::locate_candidate(block, false).unwrap();
    assert_eq!(c.json, "{\"number\": \"1\"}");
    // a fence with no JSON inside does not hide a later object
    let c = extract::locate_candidate(block, true).unwrap();
    assert_eq!(c.json, "{\"number\": \"1\"}");
    assert_eq!(c.before, "```\nnot json\n```\n");
}

#[test]
fn unparseable_block_is_kept_verbatim() {
    let bad = r#"Here: {"number": "9", "steps": "oops" "answer": {{"#;
    let m = blocks(&[bad, "[SEP]", r#"{"number":"10","answer":"A"}"#]);
    assert_eq!(m.text, bad);
    assert_eq!(m.questions.len(), 1);
    assert_eq!(m.questions[0].number, "10");
}

#[test]
fn valid_json_of_unknown_shape_is_preamble() {
    let m = blocks(&[r#"{"hello": "world"}"#]);
    assert!(m.questions.is_empty());
    assert_eq!(m.text, r#"{"hello": "world"}"#);
}

#[test]
fn duplicate_identity_replaces_in_place() {
    let m = blocks(&[
        r#"{"number":"5","answer":"A"}[SEP]{"number":"6","answer":"C"}[SEP]"#,
        r#"{"number":"5","answer":"B"}"#,
    ]);
    assert_eq!(m.questions.len(), 2);
    assert_eq!(m.questions[0].number, "5");
    assert_eq!(m.questions[0].answer.as_deref(), Some("B"));
    assert_eq!(m.questions[1].number, "6");
}

#[test]
fn test_code_is_part_of_identity() {
    let m = blocks(&[
        r#"{"test_code": "101", "number": "1", "answer": "A"}[SEP]"#,
        r#"{"test_code": "102", "number": "1", "answer": "B"}[SEP]"#,
        r#"{"test_code": " 101 ", "number": "1", "answer": "C"}"#,
    ]);
    assert_eq!(m.questions.len(), 2);
    assert_eq!(m.questions[0].answer.as_deref(), Some("C"));
    assert_eq!(m.questions[1].answer.as_deref(), Some("B"));
}

#[test]
fn multipart_question_drops_top_level_steps() {
    let m = blocks(&[
        r#"{"number": "1", "steps": "Common setup", "parts": [{"number": "a", "steps": "Part a", "answer": "2"}, {"number": "b", "answer": "3"}]}"#,
    ]);
    let q = &m.questions[0];
    assert_eq!(q.steps, None);
    assert_eq!(q.parts[0].steps.as_deref(), Some("Common setup\n\nPart a"));
    assert_eq!(q.parts[1].steps, None);
}

#[test]
fn numeric_fields_are_read_as_strings() {
    let m = blocks(&[r#"{"number": 12, "answer": 7, "isComplete": "false"}"#]);
    assert_eq!(m.questions[0].number, "12");
    assert_eq!(m.questions[0].answer.as_deref(), Some("7"));
    assert!(m.questions[0].is_complete);
}

#[test]
fn question_list_payload() {
    let m = blocks(&[r#"{"questions": [{"number": "1", "answer": "A"}, {"number": "2", "answer": "B"}]}"#]);
    assert_eq!(m.questions.len(), 2);
    let m = blocks(&[r#"[{"number": "3"}, {"number": "4"}]"#]);
    assert_eq!(
        m.questions.iter().map(|q| q.number.as_str()).collect::<Vec<_>>(),
        vec!["3", "4"]
    );
}

#[test]
fn sanitizer_can_be_disabled() {
    let opts = Options {
        sanitize: false,
        ..sep_opts(ExtractionMode::JsonBlocks)
    };
    let m = parse_to_model(r#"{"number": "2", "answer": A}"#, &opts).unwrap();
    assert!(m.questions.is_empty());
    assert_eq!(m.text, r#"{"number": "2", "answer": A}"#);
}

#[test]
fn final_answer_document() {
    let opts = Options::for_mode(LearningMode::SolveFinalAnswer);
    assert_eq!(opts.mode, ExtractionMode::JsonDocument);
    let doc = r#"```json
{"finalAnswers": {"title": "Bảng Đáp Án Đề 101", "answers": [{"number": "1", "answer": "A"}, {"number": "2", "answer": "C"}, {"number": "1", "answer": "B"}]}}
```"#;
    let m = parse_to_model(doc, &opts).unwrap();
    let set = m.final_answers.as_ref().unwrap();
    assert_eq!(set.title, "Bảng Đáp Án Đề 101");
    assert_eq!(set.answers, vec![FinalAnswer::new("1", "B"), FinalAnswer::new("2", "C")]);
    assert!(matches!(m.shape(), ResponseShape::FinalAnswers(_)));
    assert_eq!(m.text, "");
}

#[test]
fn final_answer_document_without_title() {
    let opts = Options::with_extraction(ExtractionMode::JsonDocument);
    let m = parse_to_model(r#"{"answers": [{"number": 1, "answer": "D"}]}"#, &opts).unwrap();
    let set = m.final_answers.unwrap();
    assert_eq!(set.title, "Bảng Đáp Án");
    assert_eq!(set.get("1").map(|a| a.answer.as_str()), Some("D"));
}

#[test]
fn final_answer_document_renders_once_parseable() {
    let opts = Options::with_extraction(ExtractionMode::JsonDocument);
    let mut p = TurnParser::new(opts).unwrap();
    p.push(r#"{"finalAnswers": {"answers": [{"number": "1", "ans"#).unwrap();
    assert!(p.model().final_answers.is_none());
    assert_eq!(p.model().text, "Đang phân tích...");
    p.push(r#"wer": "A"}]}}"#).unwrap();
    assert_eq!(p.model().final_answers.as_ref().map(|s| s.answers.len()), Some(1));
    p.finish();
    assert!(p.model().is_complete());
}

#[test]
fn document_live_view_honors_sanitize_off() {
    let doc = r#"{"finalAnswers": {"answers": [{"number": "1", "answer": A}]}}"#;
    let opts = Options {
        sanitize: false,
        ..Options::with_extraction(ExtractionMode::JsonDocument)
    };
    let mut p = TurnParser::new(opts).unwrap();
    p.push(doc).unwrap();
    let live = p.snapshot();
    assert!(live.final_answers.is_none());
    p.finish();
    assert!(p.model().final_answers.is_none());
    assert_eq!(p.model().text, doc);

    // with sanitizing on, live and final agree the other way
    let mut p = TurnParser::new(Options::with_extraction(ExtractionMode::JsonDocument)).unwrap();
    p.push(doc).unwrap();
    let live = p.snapshot().final_answers;
    p.finish();
    assert_eq!(live, p.model().final_answers);
    assert_eq!(
        extract::extract_block(doc, true, &Sanitizer::builtin()).payload.is_some(),
        live.is_some()
    );
}

#[test]
fn document_waits_for_a_closing_bracket() {
    let mut p = TurnParser::new(Options::with_extraction(ExtractionMode::JsonDocument)).unwrap();
    p.push(r#"{"answers": [{"number": "1", "answer": "B"}]}"#).unwrap();
    assert_eq!(p.model().final_answers.as_ref().map(|s| s.answers.len()), Some(1));
    // trailing prose without a bracket leaves the rendered table as is
    p.push(" Chúc em học tốt").unwrap();
    assert_eq!(p.model().text, "");
    p.finish();
    assert_eq!(p.model().text, "Chúc em học tốt");
    assert_eq!(p.model().final_answers.as_ref().map(|s| s.answers.len()), Some(1));
}
