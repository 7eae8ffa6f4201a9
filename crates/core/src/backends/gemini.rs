use super::status_error;
use crate::error::InferenceError;
use crate::traits::{GenerationBackend, GenerationCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_FALLBACK_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
            default_model: GEMINI_FALLBACK_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> Result<Url, InferenceError> {
        Ok(Url::parse_with_params(
            &format!("{}/{}", self.base_url, path),
            &[("key", self.api_key.as_str())],
        )?)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn discover_model(&self) -> Result<String, InferenceError> {
        let response = self.client.get(self.url("models")?).send().await?;
        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let listed: ListModelsResponse = response.json().await?;
        choose_model(&listed.models).ok_or_else(|| InferenceError::BackendResponse {
            backend: self.name().to_string(),
            details: "no listed model supports generateContent".to_string(),
        })
    }

    async fn generate(
        &self,
        model: &str,
        call: GenerationCall<'_>,
    ) -> Result<String, InferenceError> {
        let mut parts = vec![json!({ "text": call.prompt })];
        if let Some(attachment) = call.attachment {
            parts.push(json!({
                "inline_data": {
                    "mime_type": attachment.mime_type,
                    "data": attachment.base64(),
                }
            }));
        }

        let url = self.url(&format!("models/{model}:generateContent"))?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "contents": [{ "parts": parts }] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(response_text(&parsed))
    }
}

/// Prefers "flash" models among those that support `generateContent`.
fn choose_model(models: &[ListedModel]) -> Option<String> {
    let usable = models
        .iter()
        .filter(|model| !model.name.is_empty())
        .filter(|model| {
            model
                .supported_generation_methods
                .iter()
                .any(|method| method == "generateContent")
        })
        .collect::<Vec<_>>();

    usable
        .iter()
        .find(|model| model.name.to_lowercase().contains("flash"))
        .or_else(|| usable.first())
        .map(|model| model.name.trim_start_matches("models/").to_string())
}

fn response_text(payload: &Value) -> String {
    payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(name: &str, methods: &[&str]) -> ListedModel {
        ListedModel {
            name: name.to_string(),
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn discovery_prefers_flash_models_that_generate() {
        let models = vec![
            listed("models/embedding-001", &["embedContent"]),
            listed("models/gemini-1.5-pro", &["generateContent"]),
            listed("models/gemini-2.0-flash", &["generateContent", "countTokens"]),
        ];
        assert_eq!(choose_model(&models).as_deref(), Some("gemini-2.0-flash"));
    }

    #[test]
    fn discovery_falls_back_to_first_generating_model() {
        let models = vec![
            listed("models/embedding-001", &["embedContent"]),
            listed("models/gemini-1.5-pro", &["generateContent"]),
        ];
        assert_eq!(choose_model(&models).as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(choose_model(&[listed("models/embedding-001", &["embedContent"])]), None);
    }

    #[test]
    fn response_text_joins_candidate_parts() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": " Hello " }, { "text": "world" }] } }]
        });
        assert_eq!(response_text(&payload), "Hello world");
        assert_eq!(response_text(&json!({ "candidates": [] })), "");
    }

    #[test]
    fn urls_carry_the_key_as_a_query_parameter() -> Result<(), InferenceError> {
        let backend = GeminiBackend::new("k e y").with_base_url("http://localhost:9999/v1beta/");
        let url = backend.url("models/gemini-1.5-flash:generateContent")?;
        assert_eq!(
            url.as_str(),
            "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent?key=k+e+y"
        );
        Ok(())
    }
}
