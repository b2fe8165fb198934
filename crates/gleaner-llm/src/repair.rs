//! JSON repair for model output
//!
//! Models asked for JSON still wrap it in markdown fences, prepend prose, or
//! get truncated at the token limit. Repair is attempted in escalating
//! stages; the original text is never modified beyond what parsing needs.

use crate::LlmError;
use serde_json::Value;
use tracing::debug;

/// Parse model output as JSON, repairing common damage
///
/// Stages: direct parse → fence stripping → outermost-bracket slice →
/// truncation repair (close open strings, drop a trailing partial element,
/// balance brackets). `context` names the request kind for error reporting.
pub fn try_repair_json(raw: &str, context: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        debug!(context, "json repaired by fence stripping");
        return Ok(value);
    }

    if let Some(slice) = outermost_slice(unfenced) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            debug!(context, "json repaired by bracket slicing");
            return Ok(value);
        }

        if let Some(balanced) = balance(slice) {
            if let Ok(value) = serde_json::from_str::<Value>(&balanced) {
                debug!(context, "json repaired by bracket balancing");
                return Ok(value);
            }
        }
    }

    let detail = serde_json::from_str::<Value>(trimmed)
        .err()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Err(LlmError::JsonRepair {
        context: context.to_string(),
        detail,
    })
}

/// Drop a leading ``` fence (with optional language tag) and a trailing one
fn strip_fences(text: &str) -> &str {
    let mut out = text;
    if let Some(rest) = out.strip_prefix("```") {
        // Skip the language tag line, if any
        out = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    out.trim()
}

/// Slice from the first opening bracket to the last closing one (or to the
/// end, for truncated output)
fn outermost_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']']).map(|i| i + 1).unwrap_or(text.len());
    if end <= start {
        return Some(&text[start..]);
    }
    Some(&text[start..end])
}

/// Close an unterminated string, drop a trailing partial element, and append
/// the closers the bracket stack still owes
fn balance(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None; // mismatched closers: not repairable
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_string {
        return None; // already balanced, parsing failed for another reason
    }

    let mut repaired = text.to_string();
    if in_string {
        repaired.push('"');
    }

    // A truncated element ("key": or a dangling comma) would still be invalid
    let trim_to = repaired.trim_end_matches([',', ':', ' ', '\n', '\t']).len();
    repaired.truncate(trim_to);

    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_passes_through() {
        let value = try_repair_json(r#"{"a": 1}"#, "test").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(try_repair_json(raw, "test").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_prose_wrapped_json() {
        let raw = "Here is the result:\n{\"a\": 1}\nLet me know if you need more.";
        assert_eq!(try_repair_json(raw, "test").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_truncated_object() {
        let raw = r#"{"products": [{"product_name": "Alpha"}, {"product_name": "Be"#;
        let value = try_repair_json(raw, "test").unwrap();
        let products = value["products"].as_array().unwrap();
        assert_eq!(products[0]["product_name"], "Alpha");
    }

    #[test]
    fn test_truncated_after_comma() {
        let raw = r#"{"items": ["a", "b","#;
        let value = try_repair_json(raw, "test").unwrap();
        assert_eq!(value["items"], json!(["a", "b"]));
    }

    #[test]
    fn test_unrepairable_returns_error() {
        let err = try_repair_json("no json here at all", "extract_facts").unwrap_err();
        assert!(matches!(err, LlmError::JsonRepair { .. }));
    }
}
