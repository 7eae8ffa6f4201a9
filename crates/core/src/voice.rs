use crate::error::ExtractionError;
use crate::models::{mime_type_for, Attachment, InferenceRequest, TierKind};
use crate::orchestrator::InferenceOrchestrator;
use crate::prompts::language_name;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const UNCLEAR_AUDIO: &str = "[Audio unclear]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: String,
    pub tier: TierKind,
    pub backend: String,
}

/// `audio/webm` for unrecognised extensions, matching what browsers record.
pub fn audio_mime_type(path: &Path) -> &'static str {
    match mime_type_for(path) {
        mime if mime.starts_with("audio/") => mime,
        _ => "audio/webm",
    }
}

/// Speech to text through a networked backend. There is no offline
/// recogniser, so a degraded answer means no transcript.
pub struct Transcriber {
    orchestrator: Arc<InferenceOrchestrator>,
}

impl Transcriber {
    pub fn new(orchestrator: Arc<InferenceOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn transcribe(
        &self,
        path: &Path,
        language: &str,
    ) -> Result<Option<Transcript>, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let prompt = format!(
            "Transcribe this audio recording. The audio is in {}. \
             Return ONLY the transcribed text, nothing else. \
             If you cannot understand the audio, return \"{UNCLEAR_AUDIO}\".",
            language_name(language)
        );
        let request = InferenceRequest::new(prompt)
            .with_attachment(Attachment::new(bytes, audio_mime_type(path)))
            .in_language(language);

        let outcome = self.orchestrator.infer_detailed(&request).await;
        if outcome.is_degraded() {
            info!(path = %path.display(), "no transcription backend reachable");
            return Ok(None);
        }

        Ok(Some(Transcript {
            text: outcome.text.trim().to_string(),
            language: language.to_string(),
            tier: outcome.tier,
            backend: outcome.backend,
        }))
    }
}
