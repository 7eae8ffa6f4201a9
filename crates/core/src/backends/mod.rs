pub mod gemini;
pub mod openai;

pub use gemini::GeminiBackend;
pub use openai::{OpenAiCompatibleBackend, OPENAI_API_BASE};

use crate::error::InferenceError;
use reqwest::{Response, StatusCode};

const ERROR_BODY_PREVIEW_CHARS: usize = 300;

/// Maps a non-success HTTP response onto the orchestrator's error taxonomy.
async fn status_error(backend: &str, response: Response) -> InferenceError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return InferenceError::RateLimited {
            backend: backend.to_string(),
        };
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    InferenceError::BackendResponse {
        backend: backend.to_string(),
        details: format!(
            "{status}: {}",
            body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect::<String>()
        ),
    }
}
