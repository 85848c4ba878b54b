//! Regex safety net for JSON the model almost got right.
//!
//! The rule set covers the failure modes seen in practice and nothing more.
//! Value rules are anchored on a specific key and require a following `,`, `}`
//! or `]`. The structural `trailing_comma` rule matches whole string literals
//! and hands them back unchanged, so text inside string values is left alone.
//! Rules only run after strict parsing has already failed.

use crate::error::{NovaError, ParseError};
use crate::options::RuleSpec;
use crate::recovery::RecoveryLog;
use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

#[derive(Clone)]
pub enum Replacement {
    /// `$n` / `${name}` expansion, as in `Regex::replace_all`.
    Template(String),
    Func(fn(&Captures<'_>) -> String),
}

impl std::fmt::Debug for Replacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Replacement::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replacement::Func(_) => f.write_str("Func(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SanitizeRule {
    name: String,
    pattern: Regex,
    replacement: Replacement,
}

impl SanitizeRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        replacement: Replacement,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            replacement,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the rule; returns the rewritten text and the offset of the first
    /// match that actually changed something.
    pub fn apply<'a>(&self, input: &'a str) -> (Cow<'a, str>, Option<usize>) {
        let mut first = None;
        let out = self.pattern.replace_all(input, |caps: &Captures<'_>| {
            let rewritten = match &self.replacement {
                Replacement::Template(t) => {
                    let mut dst = String::new();
                    caps.expand(t, &mut dst);
                    dst
                }
                Replacement::Func(f) => f(caps),
            };
            if first.is_none() && rewritten != caps[0] {
                first = caps.get(0).map(|m| m.start());
            }
            rewritten
        });
        match first {
            Some(pos) => (out, Some(pos)),
            None => (Cow::Borrowed(input), None),
        }
    }
}

// String literals match the first alternative and come back verbatim.
fn drop_trailing_comma(caps: &Captures<'_>) -> String {
    match caps.get(1) {
        Some(close) => close.as_str().to_string(),
        None => caps[0].to_string(),
    }
}

fn lowercase_boolean(caps: &Captures<'_>) -> String {
    format!("{}{}{}", &caps[1], caps[2].to_ascii_lowercase(), &caps[3])
}

static BUILTIN_RULES: LazyLock<Vec<SanitizeRule>> = LazyLock::new(|| {
    let specs: [(&str, &str, Replacement); 4] = [
        (
            "trailing_comma",
            r#""(?:[^"\\]|\\.)*"|,(\s*[}\]])"#,
            Replacement::Func(drop_trailing_comma),
        ),
        (
            "bare_enum_answer",
            r#"("answer"\s*:\s*)([A-D]|Đúng|Sai)(\s*[,}])"#,
            Replacement::Template(r#"$1"$2"$3"#.to_string()),
        ),
        (
            "bare_numeric_value",
            r#"("(?:answer|number)"\s*:\s*)(-?\d+(?:\.\d+)?)(\s*[,}])"#,
            Replacement::Template(r#"$1"$2"$3"#.to_string()),
        ),
        (
            "capitalized_boolean",
            r#"("isComplete"\s*:\s*)(True|False)(\s*[,}])"#,
            Replacement::Func(lowercase_boolean),
        ),
    ];
    specs
        .into_iter()
        .filter_map(|(name, pattern, replacement)| SanitizeRule::new(name, pattern, replacement).ok())
        .collect()
});

/// Ordered list of rewrite rules applied to a JSON candidate.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Vec<SanitizeRule>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Sanitizer {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES.clone(),
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-in rules followed by `extra`, in order.
    pub fn with_extra(extra: &[RuleSpec]) -> Result<Self, NovaError> {
        let mut s = Self::builtin();
        for spec in extra {
            let rule = SanitizeRule::new(
                spec.name.clone(),
                &spec.pattern,
                Replacement::Template(spec.replacement.clone()),
            )
            .map_err(|e| NovaError::InvalidRule {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;
            s.push_rule(rule);
        }
        Ok(s)
    }

    pub fn push_rule(&mut self, rule: SanitizeRule) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(SanitizeRule::name)
    }

    pub fn sanitize(&self, input: &str) -> String {
        self.sanitize_logged(input, &mut RecoveryLog::disabled())
    }

    pub(crate) fn sanitize_logged(&self, input: &str, log: &mut RecoveryLog) -> String {
        let mut current = input.to_string();
        for rule in &self.rules {
            let (out, first) = rule.apply(&current);
            if let Some(pos) = first {
                tracing::debug!(rule = rule.name(), position = pos, "sanitizer rule applied");
                log.log_rule(pos, rule.name(), &current);
                current = out.into_owned();
            }
        }
        current
    }

    /// Strict parse, then sanitize and retry.
    pub fn parse_json(&self, candidate: &str) -> Result<Value, ParseError> {
        self.parse_candidate(candidate, true, &mut RecoveryLog::disabled())
    }

    pub(crate) fn parse_candidate(
        &self,
        candidate: &str,
        sanitize: bool,
        log: &mut RecoveryLog,
    ) -> Result<Value, ParseError> {
        let strict = match serde_json::from_str::<Value>(candidate) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if !sanitize {
            return Err(ParseError::from_serde_in("parse", strict, candidate));
        }
        let fixed = self.sanitize_logged(candidate, log);
        if fixed == candidate {
            tracing::warn!(error = %strict, "no sanitizer rule matched malformed candidate");
            let err = ParseError::from_serde_in("parse", strict, candidate);
            log.log_with_context(err.position, "sanitizer fallback: no rule matched", candidate);
            return Err(err);
        }
        match serde_json::from_str::<Value>(&fixed) {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(error = %e, "candidate still malformed after sanitizing");
                let err = ParseError::from_serde_in("parse", e, &fixed);
                log.log_with_context(err.position, "sanitizer fallback: still malformed", &fixed);
                Err(err)
            }
        }
    }
}
