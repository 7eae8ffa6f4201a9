use crate::error::ExtractionError;
use crate::models::{mime_type_for, Attachment, InferenceRequest};
use crate::orchestrator::InferenceOrchestrator;
use crate::prompts::{extract_json, language_instruction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const FIELD_SHAPE: &str = r#"[
  {
    "field": "Applicant Name",
    "meaning": "Your full name as per Aadhaar",
    "example": "Sita Devi",
    "required": true
  }
]"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub field: String,
    pub meaning: String,
    pub example: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormExplanation {
    pub fields: Vec<FormField>,
}

pub struct FormExplainer {
    orchestrator: Arc<InferenceOrchestrator>,
}

impl FormExplainer {
    pub fn new(orchestrator: Arc<InferenceOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Sends the scanned form itself as the attachment.
    pub async fn explain(
        &self,
        path: &Path,
        language: &str,
    ) -> Result<FormExplanation, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let prompt = format!(
            "You are reading a scanned government form from India.\n{}\n\
             Extract likely field labels from the attached form and explain them \
             in very simple language.\n\nReturn a JSON array like:\n{}",
            language_instruction("Respond", language),
            FIELD_SHAPE
        );
        let request = InferenceRequest::new(prompt)
            .json()
            .with_attachment(Attachment::new(bytes, mime_type_for(path)))
            .in_language(language);

        Ok(self.run(&request).await)
    }

    /// Same, for a form whose text was already extracted.
    pub async fn explain_text(&self, form_text: &str, language: &str) -> FormExplanation {
        let prompt = format!(
            "You are reading a scanned government form from India.\n{}\n\
             Extract likely field labels and explain them in very simple language.\n\n\
             Form text:\n{}\n\nReturn a JSON array like:\n{}",
            language_instruction("Respond", language),
            form_text,
            FIELD_SHAPE
        );
        self.run(&InferenceRequest::new(prompt).json().in_language(language)).await
    }

    async fn run(&self, request: &InferenceRequest) -> FormExplanation {
        let outcome = self.orchestrator.infer_detailed(request).await;
        let fields = if outcome.is_degraded() {
            Vec::new()
        } else {
            parse_fields(&outcome.text)
        };

        if fields.is_empty() {
            warn!(tier = %outcome.tier, "no form fields parsed, using default field");
            return FormExplanation {
                fields: vec![default_field()],
            };
        }
        FormExplanation { fields }
    }
}

fn default_field() -> FormField {
    FormField {
        field: "Applicant Name".to_string(),
        meaning: "Write your full name as per official ID.".to_string(),
        example: "Sita Devi".to_string(),
        required: true,
    }
}

/// Entries without a field label are dropped.
fn parse_fields(text: &str) -> Vec<FormField> {
    let Some(Value::Array(items)) = extract_json(text, '[', ']') else {
        return Vec::new();
    };

    let text_of = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    items
        .iter()
        .filter_map(|item| {
            let field = text_of(item, "field");
            if field.is_empty() {
                return None;
            }
            Some(FormField {
                meaning: text_of(item, "meaning"),
                example: text_of(item, "example"),
                required: item.get("required").and_then(Value::as_bool).unwrap_or(false),
                field,
            })
        })
        .collect()
}
