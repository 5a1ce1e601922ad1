use super::error::ParseError;
use regex::Regex;
use tracing::debug;

/// Finds JSON embedded in free-form model output.
pub struct FlexibleExtractor {
    debug_mode: bool,
}

impl FlexibleExtractor {
    pub fn new() -> Self {
        Self { debug_mode: false }
    }

    pub fn with_debug(mut self) -> Self {
        self.debug_mode = true;
        self
    }

    /// Returns the first balanced JSON object or array in `text`.
    pub fn extract(&self, text: &str) -> Result<String, ParseError> {
        if self.debug_mode {
            debug!(len = text.len(), "Extracting JSON entity from text");
        }

        if let Some(tagged) = self.extract_tagged(text, "answer")
            && let Some(entity) = self.extract_first_json_entity(&tagged)
        {
            return Ok(entity);
        }

        self.extract_first_json_entity(text).ok_or_else(|| {
            ParseError::AllStrategiesFailed(vec![
                "Strategy TaggedContent(\"answer\") failed".to_string(),
                "Strategy FirstJsonEntity failed".to_string(),
            ])
        })
    }

    /// Content between `<tag>` and `</tag>`, trimmed.
    pub fn extract_tagged(&self, text: &str, tag: &str) -> Option<String> {
        let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>", tag = regex::escape(tag));

        if let Ok(regex) = Regex::new(&pattern)
            && let Some(captures) = regex.captures(text)
            && let Some(content) = captures.get(1)
        {
            return Some(content.as_str().trim().to_string());
        }

        if self.debug_mode {
            debug!(tag, "Failed to extract tagged content");
        }

        None
    }

    /// Extract first complete JSON entity (object or array) from text
    fn extract_first_json_entity(&self, text: &str) -> Option<String> {
        let mut bracket_count = 0i32;
        let mut start_pos = None;
        let mut in_string = false;
        let mut escape_next = false;
        let mut opening_char = None;

        for (i, ch) in text.char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match ch {
                '\\' if in_string => escape_next = true,
                '"' if start_pos.is_some() => in_string = !in_string,
                '{' | '[' if !in_string => {
                    if bracket_count == 0 {
                        start_pos = Some(i);
                        opening_char = Some(ch);
                    }
                    bracket_count += 1;
                }
                '}' | ']' if !in_string && bracket_count > 0 => {
                    bracket_count -= 1;
                    if bracket_count == 0
                        && let Some(p) = start_pos
                        && let Some(opening) = opening_char
                    {
                        // Verify matching brackets
                        let is_valid =
                            (opening == '{' && ch == '}') || (opening == '[' && ch == ']');
                        if is_valid {
                            return Some(text[p..=i].to_string());
                        }
                        start_pos = None;
                        opening_char = None;
                    }
                }
                _ => {}
            }
        }

        None
    }
}

impl Default for FlexibleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor for Markdown code blocks
pub struct MarkdownCodeBlockExtractor {
    /// Optional language to filter by (e.g., "json")
    pub language: Option<String>,
}

impl Default for MarkdownCodeBlockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownCodeBlockExtractor {
    /// Create a new extractor for any code block
    pub fn new() -> Self {
        Self { language: None }
    }

    /// Create a new extractor for a specific language
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
        }
    }

    /// Extract content from the first matching markdown code block
    pub fn extract(&self, text: &str) -> Result<String, ParseError> {
        let pattern = if let Some(ref lang) = self.language {
            format!(
                r"(?m)^\s*```\s*{}\s*\n((?:.*\n)*?)^\s*```\s*$",
                regex::escape(lang)
            )
        } else {
            r"(?m)^\s*```[^\n]*\n((?:.*\n)*?)^\s*```\s*$".to_string()
        };

        let regex = Regex::new(&pattern)
            .map_err(|e| ParseError::InvalidFormat(format!("Failed to compile regex: {}", e)))?;

        if let Some(captures) = regex.captures(text)
            && let Some(content) = captures.get(1)
        {
            return Ok(content.as_str().trim_end().to_string());
        }

        Err(ParseError::TagExtractionFailed(format!(
            "No markdown code block found{}",
            if let Some(ref lang) = self.language {
                format!(" with language '{}'", lang)
            } else {
                String::new()
            }
        )))
    }
}
