//! Structural validators for model output.
//!
//! Pure checks over raw trimmed model text. These decide structural
//! validity only — whether the text has the required shape — never semantic
//! correctness.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::models::Validation;

static NUMBERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.?\s+(.+)$").expect("valid numbered-line regex"));

static BULLETED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-*+]\s+(.+)$").expect("valid bulleted-line regex"));

/// Validate a sequentially numbered list.
///
/// Blank lines are skipped, not counted. Each remaining line must carry a
/// leading integer equal to its 1-based position — a skipped or repeated
/// number invalidates the whole list. The period after the number is
/// optional.
pub fn numbered_list(text: &str) -> Validation {
    let mut items = Vec::new();

    for line in non_blank_lines(text) {
        let Some(caps) = NUMBERED_LINE.captures(line) else {
            return Validation::Invalid;
        };
        let index: usize = match caps[1].parse() {
            Ok(index) => index,
            Err(_) => return Validation::Invalid,
        };
        if index != items.len() + 1 {
            return Validation::Invalid;
        }
        items.push(caps[2].trim().to_string());
    }

    if items.is_empty() {
        return Validation::Invalid;
    }
    Validation::List(items)
}

/// Validate a bulleted list with `-`, `*`, or `+` markers.
///
/// A trailing period on each item is stripped. A single line without any
/// marker is accepted as an implicit one-item list — models often emit a
/// bare answer when a list of one was expected.
pub fn bulleted_list(text: &str) -> Validation {
    let lines: Vec<&str> = non_blank_lines(text).collect();
    if lines.is_empty() {
        return Validation::Invalid;
    }

    if lines.len() == 1 && !BULLETED_LINE.is_match(lines[0]) {
        return Validation::List(vec![strip_trailing_period(lines[0]).to_string()]);
    }

    let mut items = Vec::new();
    for line in lines {
        let Some(caps) = BULLETED_LINE.captures(line) else {
            return Validation::Invalid;
        };
        items.push(strip_trailing_period(caps[1].trim()).to_string());
    }
    Validation::List(items)
}

/// Validate a yes/no answer.
///
/// Case-insensitive; one trailing period is tolerated.
pub fn yes_no(text: &str) -> Validation {
    let answer = strip_trailing_period(text.trim());
    match answer.to_ascii_lowercase().as_str() {
        "yes" => Validation::Bool(true),
        "no" => Validation::Bool(false),
        _ => Validation::Invalid,
    }
}

/// Check a produced list against an allowed vocabulary.
///
/// Items match case-insensitively after whitespace trimming, first match
/// wins; the items keep their original casing. Returns false for an empty
/// list, or when `single_choice` is set and more than one item was produced.
pub fn constrained_array(items: &[String], allowed: &[String], single_choice: bool) -> bool {
    if items.is_empty() {
        return false;
    }
    if single_choice && items.len() > 1 {
        return false;
    }
    items.iter().all(|item| {
        allowed
            .iter()
            .any(|choice| choice.trim().eq_ignore_ascii_case(item.trim()))
    })
}

/// Lines of `text` with surrounding whitespace trimmed and blanks dropped.
fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.trim().lines().map(str::trim).filter(|line| !line.is_empty())
}

fn strip_trailing_period(text: &str) -> &str {
    text.strip_suffix('.').unwrap_or(text)
}
