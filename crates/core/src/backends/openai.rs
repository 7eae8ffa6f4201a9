use super::status_error;
use crate::error::InferenceError;
use crate::models::Attachment;
use crate::traits::{GenerationBackend, GenerationCall};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Any endpoint speaking the chat-completions protocol: OpenAI itself, or a
/// managed deployment in front of it.
pub struct OpenAiCompatibleBackend {
    name: String,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(
        &self,
        model: &str,
        call: GenerationCall<'_>,
    ) -> Result<String, InferenceError> {
        let content = message_content(&self.name, call)?;
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": MAX_COMPLETION_TOKENS,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(&self.name, response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Attachments the protocol cannot carry fail the call instead of being
/// dropped, so the tier falls through rather than answering blind.
fn message_content(backend: &str, call: GenerationCall<'_>) -> Result<Value, InferenceError> {
    let Some(attachment) = call.attachment else {
        return Ok(Value::String(call.prompt.to_string()));
    };

    let text = json!({ "type": "text", "text": call.prompt });
    let part = if attachment.is_visual() {
        json!({
            "type": "image_url",
            "image_url": { "url": data_uri(attachment) },
        })
    } else if let Some(format) = audio_format(&attachment.mime_type) {
        json!({
            "type": "input_audio",
            "input_audio": { "data": attachment.base64(), "format": format },
        })
    } else {
        return Err(InferenceError::UnsupportedAttachment {
            backend: backend.to_string(),
            mime_type: attachment.mime_type.clone(),
        });
    };
    Ok(Value::Array(vec![text, part]))
}

fn data_uri(attachment: &Attachment) -> String {
    format!("data:{};base64,{}", attachment.mime_type, attachment.base64())
}

fn audio_format(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/wav" => Some("wav"),
        "audio/mpeg" => Some("mp3"),
        _ => None,
    }
}
