//! Prompt text shared by the coordinator and the orchestrator's consumers,
//! plus defensive parsing of the summary JSON the models send back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SUMMARY: &str = "Summary not available.";
pub const DEFAULT_EXPLANATION: &str = "Simple explanation not available.";
pub const FAILED_SUMMARY: &str = "Unable to generate summary. Please try again.";
pub const FAILED_EXPLANATION: &str = "Sorry, we couldn't explain this document right now.";

pub const VISION_EXTRACTION_PROMPT: &str = "Extract all text from this document/image.
Preserve structure, line breaks, and formatting.
If multiple languages (English, Hindi, Marathi, etc.), extract all.
Return only extracted text, no explanations.";

const SUMMARY_SHAPE: &str = r#"{
  "summary": "A clear 2-3 sentence summary of what this document is about",
  "eli10": "Explain the document as if talking to a 10-year-old villager, using simple words and examples",
  "keyPoints": ["Key point 1", "Key point 2", "Key point 3", "Key point 4", "Key point 5"],
  "steps": ["Step 1: What to do first", "Step 2: Next action", "Step 3: etc."]
}"#;

const LANGUAGE_NAMES: [(&str, &str); 11] = [
    ("en", "English"),
    ("hi", "Hindi (हिंदी)"),
    ("mr", "Marathi (मराठी)"),
    ("bn", "Bengali (বাংলা)"),
    ("ta", "Tamil (தமிழ்)"),
    ("te", "Telugu (తెలుగు)"),
    ("kn", "Kannada (ಕನ್ನಡ)"),
    ("ml", "Malayalam (മലയാളം)"),
    ("gu", "Gujarati (ગુજરાતી)"),
    ("pa", "Punjabi (ਪੰਜਾਬੀ)"),
    ("or", "Odia (ଓଡ଼ିଆ)"),
];

pub fn language_name(language: &str) -> &'static str {
    LANGUAGE_NAMES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(language))
        .map(|(_, name)| *name)
        .unwrap_or("English")
}

/// `verb` is "Respond" for summaries and "Answer" for questions.
pub fn language_instruction(verb: &str, language: &str) -> String {
    match language_name(language) {
        "English" => format!("{verb} in simple English."),
        name => format!("{verb} in simple {name}."),
    }
}

/// First `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

fn summary_preamble(document_name: &str, language: &str) -> String {
    format!(
        "You are a helpful assistant that simplifies government documents for rural citizens.\n\
         {}\nDocument: {}",
        language_instruction("Respond", language),
        if document_name.trim().is_empty() {
            "Government Document"
        } else {
            document_name
        }
    )
}

/// Prompt for documents short enough to retrieve against.
pub fn grounded_summary_prompt(
    document_name: &str,
    excerpt: &str,
    sections: &[String],
    language: &str,
) -> String {
    format!(
        "{}\n\nFull text excerpt:\n{}\n\nKey sections:\n{}\n\n\
         Generate a JSON response with these fields:\n{}\n\n\
         Make the explanation practical and actionable. \
         Focus on what matters to a common citizen.",
        summary_preamble(document_name, language),
        excerpt,
        sections.join("\n\n---\n\n"),
        SUMMARY_SHAPE
    )
}

/// Prompt for long documents, sent without retrieval.
pub fn one_shot_summary_prompt(document_name: &str, excerpt: &str, language: &str) -> String {
    format!(
        "{}\n\nFull text excerpt:\n{}\n\n\
         Generate a JSON response with these fields only:\n{}\n\
         Make it practical and actionable.",
        summary_preamble(document_name, language),
        excerpt,
        SUMMARY_SHAPE
    )
}

pub fn question_prompt(context: &str, question: &str, language: &str) -> String {
    format!(
        "Based on the following context, answer the question.\n{}\n\n\
         Context:\n{}\n\nQuestion: {}\n\n\
         Provide a clear, helpful answer based only on the context provided.",
        language_instruction("Answer", language),
        context,
        question
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFields {
    pub summary: String,
    pub eli10: String,
    pub key_points: Vec<String>,
    pub steps: Vec<String>,
}

impl SummaryFields {
    pub fn failed() -> Self {
        Self {
            summary: FAILED_SUMMARY.to_string(),
            eli10: FAILED_EXPLANATION.to_string(),
            key_points: vec!["Document processing failed".to_string()],
            steps: vec!["Please try uploading again".to_string()],
        }
    }
}

/// Finds the outermost JSON value of the wanted shape in `text`, tolerating
/// prose around it.
pub fn extract_json(text: &str, open: char, close: char) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find(open)?;
    let end = trimmed.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn text_field(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Array of strings; non-string entries are rendered as JSON text.
pub fn list_field(object: &Value, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Missing fields get defaults. Text that holds no JSON object at all yields
/// [`SummaryFields::failed`].
pub fn parse_summary(text: &str) -> SummaryFields {
    let Some(object) = extract_json(text, '{', '}').filter(Value::is_object) else {
        return SummaryFields::failed();
    };

    SummaryFields {
        summary: text_field(&object, "summary").unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        eli10: text_field(&object, "eli10").unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
        key_points: list_field(&object, "keyPoints"),
        steps: list_field(&object, "steps"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_instructions_cover_indic_languages() {
        assert_eq!(language_instruction("Respond", "en"), "Respond in simple English.");
        assert_eq!(language_instruction("Answer", "mr"), "Answer in simple Marathi (मराठी).");
        assert_eq!(language_instruction("Respond", "xx"), "Respond in simple English.");
        assert_eq!(language_name("TA"), "Tamil (தமிழ்)");
    }

    #[test]
    fn truncation_respects_code_points() {
        assert_eq!(truncate_chars("योजना", 2), "यो");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn grounded_prompt_carries_excerpt_and_sections() {
        let prompt = grounded_summary_prompt(
            "notice.pdf",
            "full text",
            &["section one".to_string(), "section two".to_string()],
            "hi",
        );
        assert!(prompt.contains("Respond in simple Hindi"));
        assert!(prompt.contains("Full text excerpt:\nfull text"));
        assert!(prompt.contains("Key sections:\nsection one\n\n---\n\nsection two"));
        assert!(prompt.contains("\"keyPoints\""));
    }

    #[test]
    fn one_shot_prompt_has_no_retrieved_sections() {
        let prompt = one_shot_summary_prompt("", "body", "en");
        assert!(prompt.contains("Document: Government Document"));
        assert!(!prompt.contains("Key sections:"));
    }

    #[test]
    fn summary_parsing_fills_missing_fields() {
        let parsed =
            parse_summary(r#"{"summary": "Pension for widows.", "keyPoints": ["Age 40+", 3]}"#);
        assert_eq!(parsed.summary, "Pension for widows.");
        assert_eq!(parsed.eli10, DEFAULT_EXPLANATION);
        assert_eq!(parsed.key_points, vec!["Age 40+".to_string(), "3".to_string()]);
        assert!(parsed.steps.is_empty());
    }

    #[test]
    fn summary_parsing_tolerates_surrounding_prose() {
        let parsed =
            parse_summary("Here you go:\n{\"summary\": \"ok\", \"steps\": [\"Apply\"]}\nThanks");
        assert_eq!(parsed.summary, "ok");
        assert_eq!(parsed.steps, vec!["Apply".to_string()]);
    }

    #[test]
    fn unparseable_summary_uses_failure_object() {
        assert_eq!(parse_summary("the model rambled"), SummaryFields::failed());
        assert_eq!(parse_summary("[1, 2]"), SummaryFields::failed());
    }
}
