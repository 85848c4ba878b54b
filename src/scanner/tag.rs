use crate::classify::{
    closing_quote_matches, is_attr_quote, is_tag_name_char, is_tag_name_start, is_whitespace,
};
use std::collections::BTreeMap;

/// One `<...>` tag of the pseudo-XML protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tag {
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    pub attributes: BTreeMap<String, String>,
}

impl Tag {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Attribute value, trimmed, `None` when blank.
    pub fn attr_nonblank(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Tokenize the text between `<` and `>`. Returns `None` when it does not
/// start with a tag name (so the caller can keep it as literal text).
///
/// Attribute values may be double, single or typographic quoted, or bare.
/// A valueless attribute maps to the empty string. Names are case-sensitive.
pub fn parse_tag(inner: &str) -> Option<Tag> {
    let mut s = inner;
    let closing = s.starts_with('/');
    if closing {
        s = &s[1..];
    }
    let name = take_name(&mut s)?;
    let mut tag = Tag {
        name: name.to_string(),
        closing,
        ..Default::default()
    };
    loop {
        skip_ws(&mut s);
        let Some(c) = s.chars().next() else { break };
        if c == '/' {
            s = &s[1..];
            skip_ws(&mut s);
            if s.is_empty() {
                tag.self_closing = true;
                break;
            }
            continue;
        }
        let Some(key) = take_name(&mut s) else {
            // stray character; skip it
            s = &s[c.len_utf8()..];
            continue;
        };
        skip_ws(&mut s);
        let value = if let Some(rest) = s.strip_prefix('=') {
            s = rest;
            skip_ws(&mut s);
            take_value(&mut s)
        } else {
            String::new()
        };
        tag.attributes.insert(key.to_string(), value);
    }
    Some(tag)
}

fn take_name<'i>(input: &mut &'i str) -> Option<&'i str> {
    let s = *input;
    let first = s.chars().next()?;
    if !is_tag_name_start(first) {
        return None;
    }
    let end = s
        .char_indices()
        .find(|&(_, c)| !is_tag_name_char(c))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    *input = &s[end..];
    Some(&s[..end])
}

fn skip_ws(input: &mut &str) {
    *input = input.trim_start_matches(is_whitespace);
}

fn take_value(input: &mut &str) -> String {
    let s = *input;
    let Some(open) = s.chars().next() else {
        return String::new();
    };
    if is_attr_quote(open) {
        let body = &s[open.len_utf8()..];
        match body.char_indices().find(|&(_, c)| closing_quote_matches(open, c)) {
            Some((i, c)) => {
                *input = &body[i + c.len_utf8()..];
                body[..i].to_string()
            }
            None => {
                // unterminated quote runs to the end of the tag
                *input = "";
                body.trim_end_matches('/').to_string()
            }
        }
    } else {
        let end = s
            .char_indices()
            .find(|&(_, c)| is_whitespace(c) || c == '/')
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        *input = &s[end..];
        s[..end].to_string()
    }
}
