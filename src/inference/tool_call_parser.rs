//! Tool call parsing — detects a tool invocation in the model's text reply.
//!
//! The system prompt asks the model to answer with exactly one JSON object
//! when it wants a tool:
//!
//! ```text
//! {"tool": "add", "arguments": {"a": 2, "b": 3}}
//! ```
//!
//! Models routinely wrap that object in markdown fences or explanatory prose,
//! so detection is permissive about the surroundings and strict about the
//! object itself. Three outcomes:
//!
//! - `Ok(None)`: no call; treat the reply as plain assistant text.
//! - `Ok(Some(invocation))`: a well-formed call.
//! - `Err(ToolCallParseError)`: the object names a tool but its fields are
//!   malformed. This is never folded into `Ok(None)`.

use std::sync::OnceLock;

use regex::Regex;

use super::errors::InferenceError;
use super::types::Invocation;

/// Key holding the tool name.
const TOOL_KEY: &str = "tool";

/// Key holding the argument mapping.
const ARGUMENTS_KEY: &str = "arguments";

// ─── Cleaning ────────────────────────────────────────────────────────────────

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").expect("static regex"))
}

/// Remove code-fence markers and surrounding whitespace/backticks.
pub fn strip_code_fences(text: &str) -> String {
    fence_regex()
        .replace_all(text, "")
        .trim_matches(|c: char| c == '`' || c.is_whitespace())
        .to_string()
}

/// Locate the span from the first `{` to the last `}`.
///
/// Greedy on purpose: argument values may contain braces of their own.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a model reply into an optional tool invocation.
pub fn parse_tool_call(raw: &str) -> Result<Option<Invocation>, InferenceError> {
    let cleaned = strip_code_fences(raw);

    let Some(span) = extract_json_span(&cleaned) else {
        return Ok(None);
    };

    let value: serde_json::Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "no tool call detected: span is not valid JSON");
            return Ok(None);
        }
    };

    let Some(object) = value.as_object() else {
        return Ok(None);
    };

    let (Some(tool), Some(arguments)) = (object.get(TOOL_KEY), object.get(ARGUMENTS_KEY)) else {
        return Ok(None);
    };

    let tool = match tool.as_str().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(InferenceError::ToolCallParseError {
                raw_response: span.to_string(),
                reason: format!("'{TOOL_KEY}' must be a non-empty string, got {tool}"),
            });
        }
    };

    let arguments = match arguments {
        serde_json::Value::Object(map) => map.clone(),
        other => {
            return Err(InferenceError::ToolCallParseError {
                raw_response: span.to_string(),
                reason: format!(
                    "'{ARGUMENTS_KEY}' for tool '{tool}' must be an object, got {}",
                    json_type_name(other)
                ),
            });
        }
    };

    Ok(Some(Invocation { tool, arguments }))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        let call = parse_tool_call(r#"{"tool":"add","arguments":{"a":2,"b":3}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(call.tool, "add");
        assert_eq!(call.arguments["a"], 2);
        assert_eq!(call.arguments["b"], 3);
    }

    #[test]
    fn test_fenced_object() {
        let reply = "```json\n{\"tool\": \"add\", \"arguments\": {\"a\": 1, \"b\": 1}}\n```";
        let call = parse_tool_call(reply).unwrap().unwrap();
        assert_eq!(call.tool, "add");
    }

    #[test]
    fn test_uppercase_fence() {
        let reply = "```JSON\n{\"tool\": \"ping\", \"arguments\": {}}\n```";
        let call = parse_tool_call(reply).unwrap().unwrap();
        assert_eq!(call.tool, "ping");
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_object_surrounded_by_prose() {
        let reply = "Sure, I'll call the tool now:\n{\"tool\": \"weather\", \"arguments\": {\"city\": \"Lisbon\"}}\nLet me know!";
        let call = parse_tool_call(reply).unwrap().unwrap();
        assert_eq!(call.tool, "weather");
        assert_eq!(call.arguments["city"], "Lisbon");
    }

    #[test]
    fn test_nested_braces_in_arguments() {
        let reply = r#"{"tool": "render", "arguments": {"template": "{name}", "opts": {"deep": {"x": 1}}}}"#;
        let call = parse_tool_call(reply).unwrap().unwrap();
        assert_eq!(call.arguments["template"], "{name}");
        assert_eq!(call.arguments["opts"]["deep"]["x"], 1);
    }

    #[test]
    fn test_plain_text_is_no_call() {
        assert!(parse_tool_call("Hi there!").unwrap().is_none());
        assert!(parse_tool_call("").unwrap().is_none());
    }

    #[test]
    fn test_unrelated_json_is_no_call() {
        let reply = r#"Here is your data: {"name": "Ada", "age": 36}"#;
        assert!(parse_tool_call(reply).unwrap().is_none());
    }

    #[test]
    fn test_missing_arguments_is_no_call() {
        assert!(parse_tool_call(r#"{"tool": "add"}"#).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json_span_is_no_call() {
        assert!(parse_tool_call("use {braces} loosely }").unwrap().is_none());
    }

    #[test]
    fn test_reversed_braces_is_no_call() {
        assert!(parse_tool_call("} nothing here {").unwrap().is_none());
    }

    #[test]
    fn test_top_level_array_is_no_call() {
        assert!(parse_tool_call("[1, 2, 3]").unwrap().is_none());
    }

    #[test]
    fn test_non_object_arguments_is_parse_error() {
        for args in [r#""a=2""#, "[2, 3]", "null", "5"] {
            let reply = format!(r#"{{"tool": "add", "arguments": {args}}}"#);
            let err = parse_tool_call(&reply).unwrap_err();
            assert!(
                matches!(err, InferenceError::ToolCallParseError { .. }),
                "expected parse error for arguments {args}"
            );
        }
    }

    #[test]
    fn test_non_string_tool_is_parse_error() {
        let err = parse_tool_call(r#"{"tool": 7, "arguments": {}}"#).unwrap_err();
        assert!(matches!(err, InferenceError::ToolCallParseError { .. }));
    }

    #[test]
    fn test_strip_code_fences_trims_backticks() {
        assert_eq!(strip_code_fences("`` {\"a\":1} ``\n"), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_span_is_greedy() {
        assert_eq!(extract_json_span("x {a} y {b} z"), Some("{a} y {b}"));
        assert_eq!(extract_json_span("no braces"), None);
    }
}
