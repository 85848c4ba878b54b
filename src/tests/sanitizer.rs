use super::*;
use serde_json::json;

fn decoded(input: &str) -> SolvedQuestion {
    let v = Sanitizer::builtin().parse_json(input).unwrap();
    match extract::decode_payload(v).unwrap() {
        Payload::Question(q) => q,
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn trailing_comma_round_trip() {
    let fixed = decoded(r#"{"number": "1", "answer": "A", "parts": [],}"#);
    assert_eq!(fixed, decoded(r#"{"number": "1", "answer": "A", "parts": []}"#));
    let v = Sanitizer::builtin().parse_json(r#"{"a": [1, 2, ], }"#).unwrap();
    assert_eq!(v, json!({"a": [1, 2]}));
}

#[test]
fn bare_enum_answer_round_trip() {
    for bare in ["A", "B", "C", "D", "Đúng", "Sai"] {
        let fixed = decoded(&format!(r#"{{"number": "2", "answer": {bare}}}"#));
        let correct = decoded(&format!(r#"{{"number": "2", "answer": "{bare}"}}"#));
        assert_eq!(fixed, correct, "answer {bare}");
    }
}

#[test]
fn bare_numeric_round_trip() {
    let s = Sanitizer::builtin();
    assert_eq!(
        s.sanitize(r#"{"number": 3, "answer": 12.5}"#),
        r#"{"number": "3", "answer": "12.5"}"#
    );
    let fixed = decoded(r#"{"number": 3, "answer": -4, "steps": "x",}"#);
    assert_eq!(fixed, decoded(r#"{"number": "3", "answer": "-4", "steps": "x"}"#));
}

#[test]
fn capitalized_boolean_round_trip() {
    let fixed = decoded(r#"{"number": "4", "answer": "B", "isComplete": True,}"#);
    assert_eq!(fixed, decoded(r#"{"number": "4", "answer": "B", "isComplete": true}"#));
    assert_eq!(
        Sanitizer::builtin().sanitize(r#"{"isComplete": False}"#),
        r#"{"isComplete": false}"#
    );
}

#[test]
fn all_four_together() {
    let v = Sanitizer::builtin()
        .parse_json(r#"{"number": 7, "answer": C, "isComplete": True, "parts": [{"number": "a", "answer": 2,},],}"#)
        .unwrap();
    assert_eq!(
        v,
        json!({"number": "7", "answer": "C", "isComplete": true, "parts": [{"number": "a", "answer": "2"}]})
    );
}

#[test]
fn rules_are_idempotent() {
    let s = Sanitizer::builtin();
    let inputs = [
        r#"{"number": 1, "answer": A, "isComplete": True,}"#,
        r#"{"answer": Sai }"#,
        r#"[{"number": 2,},]"#,
    ];
    for input in inputs {
        let once = s.sanitize(input);
        assert_eq!(s.sanitize(&once), once, "{input}");
    }
}

#[test]
fn rules_stay_on_their_keys() {
    let s = Sanitizer::builtin();
    // values of other keys are left alone
    let input = r#"{"steps": "Đáp án: A", "choice": B, "count": 3, "flag": True}"#;
    assert_eq!(s.sanitize(input), input);
    // a token not followed by `,` or `}` is not an enum answer
    assert_eq!(s.sanitize(r#"{"answer": AB}"#), r#"{"answer": AB}"#);
}

#[test]
fn unrecoverable_input_reports_parse_error() {
    let err = Sanitizer::builtin()
        .parse_json(r#"{"number": "1", "steps": "unterminated"#)
        .unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::Json(_)));
}

#[test]
fn extra_rules_run_after_builtins() {
    let extra = vec![RuleSpec {
        name: "single_quotes".to_string(),
        pattern: r"'([^']*)'".to_string(),
        replacement: r#""$1""#.to_string(),
    }];
    let s = Sanitizer::with_extra(&extra).unwrap();
    let names: Vec<&str> = s.rule_names().collect();
    assert_eq!(
        names,
        vec![
            "trailing_comma",
            "bare_enum_answer",
            "bare_numeric_value",
            "capitalized_boolean",
            "single_quotes"
        ]
    );
    let v = s.parse_json(r#"{'number': '8', 'answer': 'x'}"#).unwrap();
    assert_eq!(v, json!({"number": "8", "answer": "x"}));
}

#[test]
fn invalid_extra_rule_is_rejected() {
    let extra = vec![RuleSpec {
        name: "broken".to_string(),
        pattern: "(unclosed".to_string(),
        replacement: String::new(),
    }];
    match Sanitizer::with_extra(&extra) {
        Err(NovaError::InvalidRule { name, .. }) => assert_eq!(name, "broken"),
        other => panic!("expected InvalidRule, got {other:?}"),
    }
    let opts = Options {
        extra_rules: extra,
        ..Default::default()
    };
    assert!(matches!(TurnParser::new(opts), Err(NovaError::InvalidRule { .. })));
}

#[test]
fn trailing_comma_skips_string_values() {
    let s = Sanitizer::builtin();
    let input = r#"{"steps": "Tập {1, 2, } rỗng, [a, ]", "answer": "x",}"#;
    assert_eq!(s.sanitize(input), r#"{"steps": "Tập {1, 2, } rỗng, [a, ]", "answer": "x"}"#);
    // escaped quotes do not end the string early
    let escaped = r#"{"steps": "nói \"a, }\" rồi",}"#;
    assert_eq!(s.sanitize(escaped), r#"{"steps": "nói \"a, }\" rồi"}"#);
    let untouched = r#"{"steps": "a, }"}"#;
    assert_eq!(s.sanitize(untouched), untouched);
}

#[test]
fn another_repair_keeps_commas_in_steps() {
    let m = parse_chunks_to_model(
        [r#"{"number":"1","answer":A,"steps":"Tập {1, 2, } rỗng"}[SEP]"#],
        &sep_opts(ExtractionMode::JsonBlocks),
    )
    .unwrap();
    assert_eq!(m.questions[0].answer.as_deref(), Some("A"));
    assert_eq!(m.questions[0].steps.as_deref(), Some("Tập {1, 2, } rỗng"));
}
