//! The assistant text protocol.
//!
//! Tool calls ride inside assistant text as
//! `<tool_call>{"tool":"…","args":{…}}</tool_call>` blocks (greedy,
//! non-nested); think-mode reasoning rides inside `<think>…</think>`.
//! Parsing removes the delimited blocks and preserves everything outside
//! them byte-for-byte. Tool results go back to the model as
//! `<tool_result tool="…" success="…">…</tool_result>` blocks.

use serde_json::Value;
use tracing::warn;

use crate::tool::{ToolCallRecord, ToolCallRequest};

const TOOL_CALL_OPEN: &str = "<tool_call>";
const TOOL_CALL_CLOSE: &str = "</tool_call>";
const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Per-result character limit inside a synthetic tool_result message.
pub const TOOL_RESULT_LIMIT: usize = 8_000;

/// Result of parsing one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTurn {
    /// The turn text with all `<tool_call>` blocks removed; text outside
    /// the delimiters is preserved byte-for-byte.
    pub text: String,
    /// Well-formed tool calls, in document order.
    pub calls: Vec<ToolCallRequest>,
}

/// Extract tool calls from an assistant turn.
///
/// Each delimited block must parse as a JSON object with at least a
/// string-valued `tool`; `args` defaults to the empty map. Malformed
/// blocks are logged and skipped (they produce no call and are removed
/// from the text like well-formed ones).
#[must_use]
pub fn parse_tool_calls(raw: &str) -> ParsedTurn {
    let mut text = String::with_capacity(raw.len());
    let mut calls = Vec::new();
    let mut rest = raw;

    loop {
        let Some(open) = rest.find(TOOL_CALL_OPEN) else {
            text.push_str(rest);
            break;
        };
        text.push_str(&rest[..open]);
        let body_start = open + TOOL_CALL_OPEN.len();
        let Some(close) = rest[body_start..].find(TOOL_CALL_CLOSE) else {
            // Unterminated block: treat the remainder as plain text.
            text.push_str(&rest[open..]);
            break;
        };
        let body = &rest[body_start..body_start + close];
        match parse_call_body(body) {
            Some(call) => calls.push(call),
            None => warn!(block = body, "Skipping malformed tool_call block"),
        }
        rest = &rest[body_start + close + TOOL_CALL_CLOSE.len()..];
    }

    ParsedTurn { text, calls }
}

fn parse_call_body(body: &str) -> Option<ToolCallRequest> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let obj = value.as_object()?;
    let tool = obj.get("tool")?.as_str()?;
    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ToolCallRequest::new(tool, args))
}

/// Serialize tool calls back into assistant-text form.
///
/// Inverse of [`parse_tool_calls`] for well-formed calls.
#[must_use]
pub fn serialize_tool_calls(calls: &[ToolCallRequest]) -> String {
    let mut out = String::new();
    for call in calls {
        let body = serde_json::json!({ "tool": call.tool, "args": Value::Object(call.args.clone()) });
        out.push_str(TOOL_CALL_OPEN);
        out.push_str(&body.to_string());
        out.push_str(TOOL_CALL_CLOSE);
    }
    out
}

/// Strip `<think>` blocks, returning the remaining text and the
/// concatenated reasoning.
#[must_use]
pub fn strip_think(raw: &str) -> (String, String) {
    let mut text = String::with_capacity(raw.len());
    let mut thinking = String::new();
    let mut rest = raw;

    loop {
        let Some(open) = rest.find(THINK_OPEN) else {
            text.push_str(rest);
            break;
        };
        text.push_str(&rest[..open]);
        let body_start = open + THINK_OPEN.len();
        let Some(close) = rest[body_start..].find(THINK_CLOSE) else {
            // Unterminated think block: everything after the opener is
            // reasoning that never made it to an answer.
            thinking.push_str(&rest[body_start..]);
            break;
        };
        if !thinking.is_empty() {
            thinking.push('\n');
        }
        thinking.push_str(rest[body_start..body_start + close].trim());
        rest = &rest[body_start + close + THINK_CLOSE.len()..];
    }

    (text, thinking)
}

/// Render executed tool calls as one synthetic tool_result message body.
///
/// Each result is individually truncated to [`TOOL_RESULT_LIMIT`] chars.
#[must_use]
pub fn render_tool_results(records: &[ToolCallRecord]) -> String {
    let mut out = String::new();
    for record in records {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "<tool_result tool=\"{}\" success=\"{}\">{}</tool_result>",
            record.tool,
            record.success,
            truncate_chars(&record.result, TOOL_RESULT_LIMIT),
        ));
    }
    out
}

/// Truncate to at most `max_chars` characters, marking elision.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("… [truncated]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    fn call(tool: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest::new(
            tool,
            args.as_object().cloned().unwrap_or_default(),
        )
    }

    #[test]
    fn test_single_call_with_surrounding_text() {
        let raw = "I'll read the file.\n<tool_call>{\"tool\":\"read_file\",\"args\":{\"path\":\"a.rs\"}}</tool_call>\nDone.";
        let parsed = parse_tool_calls(raw);
        assert_eq!(parsed.text, "I'll read the file.\n\nDone.");
        assert_eq!(parsed.calls, vec![call("read_file", json!({"path": "a.rs"}))]);
    }

    #[test]
    fn test_multiple_calls_in_document_order() {
        let raw = "<tool_call>{\"tool\":\"a\"}</tool_call><tool_call>{\"tool\":\"b\",\"args\":{\"n\":1}}</tool_call>";
        let parsed = parse_tool_calls(raw);
        assert_eq!(parsed.calls.len(), 2);
        assert_eq!(parsed.calls[0].tool, "a");
        assert!(parsed.calls[0].args.is_empty());
        assert_eq!(parsed.calls[1].tool, "b");
    }

    #[test]
    fn test_malformed_blocks_skipped() {
        let raw = "x<tool_call>{not json}</tool_call>y<tool_call>{\"args\":{}}</tool_call>z\
                   <tool_call>{\"tool\":\"ok\"}</tool_call>";
        let parsed = parse_tool_calls(raw);
        assert_eq!(parsed.text, "xyz");
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].tool, "ok");
    }

    #[test]
    fn test_unterminated_block_is_plain_text() {
        let raw = "before <tool_call>{\"tool\":\"x\"}";
        let parsed = parse_tool_calls(raw);
        assert_eq!(parsed.text, raw);
        assert!(parsed.calls.is_empty());
    }

    #[test]
    fn test_strip_think_concatenates_blocks() {
        let raw = "<think>first</think>answer<think>second</think>!";
        let (text, thinking) = strip_think(raw);
        assert_eq!(text, "answer!");
        assert_eq!(thinking, "first\nsecond");
    }

    #[test]
    fn test_strip_think_unterminated() {
        let (text, thinking) = strip_think("partial <think>never closed");
        assert_eq!(text, "partial ");
        assert_eq!(thinking, "never closed");
    }

    #[test]
    fn test_render_tool_results_truncates() {
        let record = ToolCallRecord {
            tool: "read_file".into(),
            args: Map::new(),
            result: "x".repeat(TOOL_RESULT_LIMIT + 10),
            success: true,
            duration: std::time::Duration::from_millis(1),
        };
        let rendered = render_tool_results(&[record]);
        assert!(rendered.starts_with("<tool_result tool=\"read_file\" success=\"true\">"));
        assert!(rendered.contains("[truncated]"));
        assert!(rendered.ends_with("</tool_result>"));
    }

    #[test]
    fn test_render_failed_result() {
        let record = ToolCallRecord {
            tool: "shell".into(),
            args: Map::new(),
            result: "exit 1".into(),
            success: false,
            duration: std::time::Duration::ZERO,
        };
        assert_eq!(
            render_tool_results(&[record]),
            "<tool_result tool=\"shell\" success=\"false\">exit 1</tool_result>",
        );
    }

    proptest! {
        // Roundtrip: serialize then parse yields the same calls.
        #[test]
        fn prop_tool_call_roundtrip(
            tools in proptest::collection::vec("[a-z_]{1,12}", 0..4),
            keys in proptest::collection::vec("[a-z]{1,6}", 0..4),
            vals in proptest::collection::vec(any::<i64>(), 0..4),
        ) {
            let calls: Vec<ToolCallRequest> = tools
                .iter()
                .map(|tool| {
                    let args: Map<String, Value> = keys
                        .iter()
                        .zip(vals.iter())
                        .map(|(k, v)| (k.clone(), json!(v)))
                        .collect();
                    ToolCallRequest::new(tool.clone(), args)
                })
                .collect();
            let parsed = parse_tool_calls(&serialize_tool_calls(&calls));
            prop_assert_eq!(parsed.calls, calls);
            prop_assert_eq!(parsed.text, "");
        }

        // Text outside the delimiters survives byte-for-byte.
        #[test]
        fn prop_outside_text_preserved(
            prefix in "[^<]{0,40}",
            middle in "[^<]{0,40}",
            suffix in "[^<]{0,40}",
        ) {
            let raw = format!(
                "{prefix}<tool_call>{{\"tool\":\"t\"}}</tool_call>{middle}\
                 <tool_call>{{\"tool\":\"u\"}}</tool_call>{suffix}",
            );
            let parsed = parse_tool_calls(&raw);
            prop_assert_eq!(parsed.text, format!("{prefix}{middle}{suffix}"));
            prop_assert_eq!(parsed.calls.len(), 2);
        }
    }
}
