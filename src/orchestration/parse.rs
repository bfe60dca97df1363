//! Parsing structured data out of free-form collaborator responses.
//!
//! Models wrap JSON in prose or markdown fences more often than not. Parsing
//! tries, in order: the whole text, the first fenced code block, and each
//! balanced `{...}` or `[...]` span from left to right.

use serde::de::DeserializeOwned;

use crate::{clog_debug, Error, Result};

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();

    let direct_err = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(fenced) = fenced_block(trimmed) {
        match serde_json::from_str::<T>(fenced) {
            Ok(value) => return Ok(value),
            Err(e) => clog_debug!("parse_structured: fenced block rejected: {}", e),
        }
    }

    for span in balanced_spans(trimmed) {
        match serde_json::from_str::<T>(span) {
            Ok(value) => return Ok(value),
            Err(e) => clog_debug!("parse_structured: bracket span rejected: {}", e),
        }
    }

    Err(Error::Parse(format!(
        "no valid JSON found in response ({}); response began: {:?}",
        direct_err,
        trimmed.chars().take(80).collect::<String>()
    )))
}

/// Body of the first ``` fence, with any language tag dropped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Every balanced object or array candidate, in order of its opening bracket.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices(['{', '['])
        .filter_map(move |(start, _)| balanced_span(text, start))
}

/// Balanced span opening at `start`, skipping brackets inside string literals.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(*byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
