//! Pulling JSON out of model replies.
//!
//! Model output is rarely clean JSON. It usually arrives wrapped in a
//! markdown fence, prefixed with prose, or carrying a trailing comma. The
//! helpers here locate the JSON text and repair the common syntax slips
//! with [`sanitize_json`] before handing it to `serde_json`.
//!
//! ```rust
//! use a2ui_toolkit::extract::extract_json;
//!
//! let reply = "好的，结果如下：\n```json\n{\"title\": \"杂交\"}\n```\n";
//! assert_eq!(extract_json(reply).unwrap(), "{\"title\": \"杂交\"}");
//! ```

pub mod error;
pub mod extractors;

pub use self::error::ParseError;
pub use self::extractors::{FlexibleExtractor, MarkdownCodeBlockExtractor};

pub use fuzzy_parser::sanitize_json;

use serde::de::DeserializeOwned;

/// Extracts JSON from a reply: a ```json fence first, then any fence that
/// holds JSON, then the first balanced object or array in the raw text.
pub fn extract_json(text: &str) -> Result<String, ParseError> {
    if let Ok(content) = MarkdownCodeBlockExtractor::with_language("json").extract(text) {
        return Ok(content);
    }

    if let Ok(content) = MarkdownCodeBlockExtractor::new().extract(text)
        && let Ok(json) = FlexibleExtractor::new().extract(&content)
    {
        return Ok(json);
    }

    FlexibleExtractor::new().extract(text)
}

/// Body of the first ```json block, else of the first fenced block of any
/// language, else the whole trimmed reply.
pub fn fenced_or_whole(text: &str) -> String {
    MarkdownCodeBlockExtractor::with_language("json")
        .extract(text)
        .or_else(|_| MarkdownCodeBlockExtractor::new().extract(text))
        .unwrap_or_else(|_| text.trim().to_string())
}

/// Repairs and deserializes already-located JSON text.
pub fn parse_sanitized<T: DeserializeOwned>(json: &str) -> Result<T, ParseError> {
    match serde_json::from_str(json) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_str(&sanitize_json(json))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_extract_json_prefers_json_fence() {
        let text = "```\n[1, 2]\n```\n\n```json\n{\"picked\": true}\n```\n";
        assert_eq!(extract_json(text).unwrap(), "{\"picked\": true}");
    }

    #[test]
    fn test_extract_json_from_untagged_fence() {
        let text = "```\nresult: {\"a\": 1}\n```\n";
        assert_eq!(extract_json(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "The payload is {\"version\": \"1.0\"}. Done.";
        assert_eq!(extract_json(text).unwrap(), "{\"version\": \"1.0\"}");
    }

    #[test]
    fn test_fenced_or_whole_without_fence() {
        assert_eq!(fenced_or_whole("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_fenced_or_whole_takes_fence_body() {
        let text = "说明\n```json\n{\"a\": 1}\n```\n其余内容";
        assert_eq!(fenced_or_whole(text), "{\"a\": 1}");
    }

    #[test]
    fn test_fenced_or_whole_prefers_later_json_fence() {
        let text = "示例：\n```\n{\"example\": true}\n```\n结果：\n```json\n{\"a\": 1}\n```\n";
        assert_eq!(fenced_or_whole(text), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_sanitized_repairs_trailing_comma() {
        let value: Value = parse_sanitized(r#"{"name": "Aa", "count": 2,}"#).unwrap();
        assert_eq!(value, json!({"name": "Aa", "count": 2}));
    }

    #[test]
    fn test_parse_sanitized_rejects_garbage() {
        let result: Result<Value, _> = parse_sanitized("not json at all");
        assert!(result.is_err());
    }
}
