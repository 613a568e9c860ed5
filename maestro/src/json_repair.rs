//! Tolerant JSON front end for model output.
//!
//! Models asked for "pure JSON" still wrap it in code fences, annotate it
//! with line comments, and leave trailing commas. [`parse_relaxed`] strips
//! those decorations — never touching string contents — and falls back to
//! the first balanced bracketed substring when the cleaned document still
//! fails to parse.

use serde_json::Value;

use crate::error::{Error, Result};

/// Strip a leading/trailing Markdown code fence, with or without a language tag.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line (e.g. ```json).
    let rest = rest.find('\n').map_or("", |i| &rest[i + 1..]);
    rest.rfind("```").map_or(rest, |i| &rest[..i]).trim()
}

/// Remove `#` and `//` line comments outside of string literals.
#[must_use]
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '#' => {
                skip_to_newline(&mut chars);
            }
            '/' if chars.peek() == Some(&'/') => {
                skip_to_newline(&mut chars);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn skip_to_newline(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for ch in chars.by_ref() {
        if ch == '\n' {
            break;
        }
    }
}

/// Remove trailing commas before `]` or `}`, outside of string literals.
#[must_use]
pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ']' | '}' => {
                // Drop a comma separated from the closer only by whitespace.
                let kept = out.trim_end().len();
                if out[..kept].ends_with(',') {
                    out.truncate(kept - 1);
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Extract the first balanced `{…}` or `[…]` substring, string-aware.
#[must_use]
pub fn extract_bracketed(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..=start + i]);
            }
        }
    }
    None
}

/// Parse model output as JSON, tolerating fences, comments, and trailing commas.
///
/// # Errors
///
/// Returns [`Error::Parse`] when neither the cleaned document nor its first
/// bracketed substring parses.
pub fn parse_relaxed(text: &str) -> Result<Value> {
    let cleaned = strip_trailing_commas(&strip_line_comments(strip_code_fences(text)));
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Ok(value);
    }
    // One fallback attempt: the first balanced bracketed substring.
    if let Some(candidate) = extract_bracketed(&cleaned)
        && let Ok(value) = serde_json::from_str(candidate)
    {
        return Ok(value);
    }
    Err(Error::parse(format!(
        "model output is not valid JSON: {}",
        truncate(text, 160)
    )))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_comments_outside_strings_removed() {
        let src = "{\n  // note\n  \"a\": 1, # tail\n  \"b\": \"x // not a comment # either\"\n}";
        let cleaned = strip_trailing_commas(&strip_line_comments(src));
        let value: Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], "x // not a comment # either");
    }

    #[test]
    fn test_trailing_commas_removed() {
        let src = "{\"a\": [1, 2, ], \"b\": {\"c\": 3,},}";
        let cleaned = strip_trailing_commas(src);
        let value: Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["a"], json!([1, 2]));
        assert_eq!(value["b"]["c"], 3);
    }

    #[test]
    fn test_bracketed_fallback() {
        let src = "Sure! Here is the plan:\n{\"tasks\": []}\nLet me know.";
        let value = parse_relaxed(src).unwrap();
        assert_eq!(value["tasks"], json!([]));
    }

    #[test]
    fn test_unparseable_is_parse_error() {
        assert!(parse_relaxed("no json here").is_err());
        assert!(parse_relaxed("{broken").is_err());
    }

    // Any JSON document with injected line comments parses to the same value
    // as the document without them.
    proptest! {
        #[test]
        fn prop_comment_stripping_preserves_value(
            keys in proptest::collection::vec("[a-z]{1,8}", 1..5),
            nums in proptest::collection::vec(any::<i64>(), 1..5),
            strings in proptest::collection::vec("[ -~]{0,16}", 1..5),
        ) {
            let mut obj = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate() {
                let val = if i % 2 == 0 {
                    json!(nums[i % nums.len()])
                } else {
                    json!(strings[i % strings.len()])
                };
                obj.insert(key.clone(), val);
            }
            let doc = Value::Object(obj);
            let pretty = serde_json::to_string_pretty(&doc).unwrap();

            // Interleave comments between lines.
            let commented: String = pretty
                .lines()
                .flat_map(|l| [l.to_owned(), "// interleaved comment".to_owned()])
                .collect::<Vec<_>>()
                .join("\n");

            let reparsed = parse_relaxed(&commented).unwrap();
            prop_assert_eq!(reparsed, doc);
        }
    }
}
