use crate::error::{ExtractionError, InferenceError};
use crate::models::{Attachment, Document, ExtractionEngine, PageText};
use async_trait::async_trait;

/// One way of turning a document into page text.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn engine(&self) -> ExtractionEngine;

    /// Cheap, side-effect free check run before `extract`.
    fn available(&self, document: &Document) -> bool;

    async fn extract(&self, document: &Document) -> Result<Vec<PageText>, ExtractionError>;
}

/// What a backend is asked to generate: the final prompt plus at most one attachment.
#[derive(Debug, Clone, Copy)]
pub struct GenerationCall<'a> {
    pub prompt: &'a str,
    pub attachment: Option<&'a Attachment>,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Model used when none is configured and discovery is not possible.
    fn default_model(&self) -> &str;

    async fn discover_model(&self) -> Result<String, InferenceError> {
        Ok(self.default_model().to_string())
    }

    async fn generate(
        &self,
        model: &str,
        call: GenerationCall<'_>,
    ) -> Result<String, InferenceError>;
}
