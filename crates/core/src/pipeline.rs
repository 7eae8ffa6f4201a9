use crate::cache::{hash_file, ResultCache};
use crate::chunking::{chunk_text, ChunkingConfig};
use crate::error::Result;
use crate::extractor::ExtractionCascade;
use crate::index::SimilarityIndex;
use crate::models::{Document, ExtractionResult, InferenceRequest, SimplifiedDocument};
use crate::orchestrator::InferenceOrchestrator;
use crate::prompts::{
    grounded_summary_prompt, one_shot_summary_prompt, parse_summary, question_prompt,
    truncate_chars,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CIVIC_RETRIEVAL_QUERY: &str =
    "eligibility criteria, documents required, fees, deadlines, how to apply, benefits";
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    /// Documents with more pages than this skip retrieval.
    pub long_document_pages: usize,
    pub grounded_excerpt_chars: usize,
    pub long_excerpt_chars: usize,
    pub retrieved_sections: usize,
    pub answer_chunks: usize,
    pub raw_text_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig {
                min_tokens: 300,
                max_tokens: 400,
                overlap_tokens: 40,
            },
            long_document_pages: 5,
            grounded_excerpt_chars: 8_000,
            long_excerpt_chars: 12_000,
            retrieved_sections: 5,
            answer_chunks: 3,
            raw_text_chars: 5_000,
        }
    }
}

/// Wires extraction, retrieval and inference into "simplify a document".
pub struct PipelineCoordinator {
    cascade: ExtractionCascade,
    orchestrator: Arc<InferenceOrchestrator>,
    index: SimilarityIndex,
    cache: Option<ResultCache>,
    options: PipelineOptions,
}

impl PipelineCoordinator {
    pub fn new(cascade: ExtractionCascade, orchestrator: Arc<InferenceOrchestrator>) -> Self {
        Self {
            cascade,
            orchestrator,
            index: SimilarityIndex::default(),
            cache: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn orchestrator(&self) -> &Arc<InferenceOrchestrator> {
        &self.orchestrator
    }

    /// Degraded results are cached like any other; `inference_tier` tells the
    /// caller how the answer was produced.
    pub async fn simplify(
        &self,
        path: &Path,
        display_name: &str,
        language: &str,
    ) -> Result<SimplifiedDocument> {
        self.options.chunking.validate()?;

        let cache_key = match self.cache.as_ref().map(|_| hash_file(path)).transpose() {
            Ok(key) => key,
            Err(error) => {
                warn!(%error, path = %path.display(), "could not hash file, skipping cache");
                None
            }
        };

        if let Some(hit) = self.cached(cache_key.as_deref()) {
            info!(file = display_name, "cache hit");
            return Ok(hit);
        }

        let document = Document::open(path, display_name, language)?;
        let extraction = self.cascade.extract(&document).await?;
        info!(
            file = display_name,
            engine = %extraction.engine,
            pages = extraction.pages.len(),
            chars = extraction.raw_text.chars().count(),
            "extraction complete"
        );

        let prompt = if extraction.pages.len() > self.options.long_document_pages {
            info!(
                pages = extraction.pages.len(),
                "long document, sending one-shot prompt"
            );
            one_shot_summary_prompt(
                display_name,
                truncate_chars(&extraction.cleaned_text, self.options.long_excerpt_chars),
                language,
            )
        } else {
            let sections = self.retrieve(
                &extraction,
                CIVIC_RETRIEVAL_QUERY,
                self.options.retrieved_sections,
            );
            grounded_summary_prompt(
                display_name,
                truncate_chars(&extraction.cleaned_text, self.options.grounded_excerpt_chars),
                &sections,
                language,
            )
        };

        let request = InferenceRequest::new(prompt)
            .json()
            .fast()
            .in_language(language);
        let outcome = self.orchestrator.infer_detailed(&request).await;
        let fields = parse_summary(&outcome.text);

        let result = SimplifiedDocument {
            summary: fields.summary,
            plain_explanation: fields.eli10,
            key_points: fields.key_points,
            steps: fields.steps,
            language: language.to_string(),
            source_file: display_name.to_string(),
            raw_text: truncate_chars(&extraction.raw_text, self.options.raw_text_chars)
                .to_string(),
            ocr_engine_used: extraction.engine,
            inference_tier: outcome.tier,
        };

        if let Some(key) = cache_key {
            self.store(&key, &result)?;
        }

        Ok(result)
    }

    /// Answers `question` from the three chunks closest to it.
    pub async fn ask_document(
        &self,
        path: &Path,
        question: &str,
        language: &str,
    ) -> Result<String> {
        self.options.chunking.validate()?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let document = Document::open(path, name, language)?;
        let extraction = self.cascade.extract(&document).await?;

        let context = self.retrieve(&extraction, question, self.options.answer_chunks);
        if context.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        let prompt = question_prompt(&context.join("\n\n"), question, language);
        let request = InferenceRequest::new(prompt).in_language(language);
        Ok(self.orchestrator.infer(&request).await)
    }

    /// Chunks the cleaned text into a throwaway collection, queries it once
    /// and clears it again.
    fn retrieve(&self, extraction: &ExtractionResult, query: &str, top_k: usize) -> Vec<String> {
        let chunks = chunk_text(&extraction.cleaned_text, self.options.chunking);
        debug!(chunks = chunks.len(), "chunked document");

        let collection = format!("doc_{}", Uuid::new_v4().simple());
        self.index.add_chunks(&collection, &chunks);
        let hits = self.index.search(&collection, query, top_k);
        self.index.clear_collection(&collection);

        hits.into_iter().map(|hit| hit.chunk.text).collect()
    }

    fn cached(&self, key: Option<&str>) -> Option<SimplifiedDocument> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        let payload = cache.get(key)?;
        match serde_json::from_str(&payload) {
            Ok(document) => Some(document),
            Err(error) => {
                warn!(key, %error, "cached payload no longer parses, treating as miss");
                None
            }
        }
    }

    fn store(&self, key: &str, result: &SimplifiedDocument) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let payload = serde_json::to_string(result)?;
        if let Err(error) = cache.put(key, &payload) {
            warn!(key, %error, "failed to write cache entry");
        }
        Ok(())
    }

    #[cfg(test)]
    fn open_collections(&self) -> usize {
        self.index.collection_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, InferenceError};
    use crate::models::{ExtractionEngine, PageText, TierKind};
    use crate::prompts::FAILED_SUMMARY;
    use crate::traits::{ExtractionStrategy, GenerationBackend, GenerationCall};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const SUMMARY_JSON: &str = r#"{
        "summary": "Widow pension notice.",
        "eli10": "The government gives money every month.",
        "keyPoints": ["Age 40+"],
        "steps": ["Visit the panchayat office"]
    }"#;

    struct FakePages {
        pages: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExtractionStrategy for FakePages {
        fn engine(&self) -> ExtractionEngine {
            ExtractionEngine::Paddleocr
        }

        fn available(&self, _document: &Document) -> bool {
            true
        }

        async fn extract(
            &self,
            _document: &Document,
        ) -> std::result::Result<Vec<PageText>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.clone(),
                })
                .collect())
        }
    }

    struct RecordingBackend {
        reply: &'static str,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn generate(
            &self,
            _model: &str,
            call: GenerationCall<'_>,
        ) -> std::result::Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().expect("lock").push(call.prompt.to_string());
            Ok(self.reply.to_string())
        }
    }

    struct Harness {
        coordinator: PipelineCoordinator,
        extraction_calls: Arc<AtomicUsize>,
        backend: Arc<RecordingBackend>,
    }

    fn harness(pages: Vec<String>, reply: &'static str) -> Harness {
        let extraction_calls = Arc::new(AtomicUsize::new(0));
        let cascade = ExtractionCascade::new(Box::new(FakePages {
            pages,
            calls: extraction_calls.clone(),
        }));
        let backend = Arc::new(RecordingBackend::new(reply));
        let orchestrator = InferenceOrchestrator::new()
            .with_primary(backend.clone(), Some("test-model".to_string()));

        Harness {
            coordinator: PipelineCoordinator::new(cascade, Arc::new(orchestrator)),
            extraction_calls,
            backend,
        }
    }

    fn page(topic: &str) -> String {
        format!(
            "This page explains the {topic} rules of the widow pension scheme. \
             Applicants must be above 40 years of age."
        )
    }

    fn upload(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("notice.pdf");
        fs::write(&path, b"%PDF-1.4 notice bytes").expect("write upload");
        path
    }

    #[tokio::test]
    async fn six_page_document_takes_one_shot_branch() {
        let dir = tempdir().expect("tempdir");
        let pages = (1..=6).map(|n| page(&format!("section {n}"))).collect();
        let harness = harness(pages, SUMMARY_JSON);

        let result = harness
            .coordinator
            .simplify(&upload(dir.path()), "notice.pdf", "en")
            .await
            .expect("simplify should succeed");

        assert_eq!(harness.backend.calls.load(Ordering::SeqCst), 1);
        let prompts = harness.backend.prompts.lock().expect("lock").clone();
        assert!(prompts[0].contains("Full text excerpt:"));
        assert!(!prompts[0].contains("Key sections:"));
        assert_eq!(result.summary, "Widow pension notice.");
        assert_eq!(result.inference_tier, TierKind::Primary);
        assert_eq!(result.ocr_engine_used, ExtractionEngine::Paddleocr);
    }

    #[tokio::test]
    async fn blank_pages_count_towards_the_long_document_threshold() {
        let dir = tempdir().expect("tempdir");
        let mut pages = (1..=5)
            .map(|n| page(&format!("section {n}")))
            .collect::<Vec<_>>();
        pages.insert(2, String::new());
        pages.push(String::new());
        let harness = harness(pages, SUMMARY_JSON);

        harness
            .coordinator
            .simplify(&upload(dir.path()), "notice.pdf", "en")
            .await
            .expect("simplify should succeed");

        let prompts = harness.backend.prompts.lock().expect("lock").clone();
        assert!(!prompts[0].contains("Key sections:"));
    }

    #[tokio::test]
    async fn short_document_is_grounded_on_retrieved_sections() {
        let dir = tempdir().expect("tempdir");
        let harness = harness(vec![page("eligibility"), page("fees")], SUMMARY_JSON);

        let result = harness
            .coordinator
            .simplify(&upload(dir.path()), "notice.pdf", "hi")
            .await
            .expect("simplify should succeed");

        let prompts = harness.backend.prompts.lock().expect("lock").clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Key sections:"));
        assert!(prompts[0].contains("Respond in simple Hindi"));
        assert_eq!(harness.coordinator.open_collections(), 0);
        assert_eq!(result.language, "hi");
        assert_eq!(result.key_points, vec!["Age 40+".to_string()]);
    }

    #[tokio::test]
    async fn second_upload_is_served_from_cache() {
        let dir = tempdir().expect("tempdir");
        let mut harness = harness(vec![page("eligibility")], SUMMARY_JSON);
        let cache = ResultCache::new(dir.path().join("cache"));
        harness.coordinator = harness.coordinator.with_cache(cache.clone());
        let path = upload(dir.path());

        let first = harness
            .coordinator
            .simplify(&path, "notice.pdf", "en")
            .await
            .expect("first call should succeed");
        let second = harness
            .coordinator
            .simplify(&path, "renamed.pdf", "en")
            .await
            .expect("second call should succeed");

        assert_eq!(first, second);
        assert_eq!(harness.extraction_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.backend.calls.load(Ordering::SeqCst), 1);

        let key = hash_file(&path).expect("hash upload");
        let payload = cache.get(&key).expect("payload cached");
        assert_eq!(payload, serde_json::to_string(&first).expect("serialize"));
    }

    #[tokio::test]
    async fn undeserializable_cache_payload_is_a_miss() {
        let dir = tempdir().expect("tempdir");
        let mut harness = harness(vec![page("eligibility")], SUMMARY_JSON);
        let cache = ResultCache::new(dir.path().join("cache"));
        let path = upload(dir.path());
        cache
            .put(&hash_file(&path).expect("hash"), "{\"stale\": true}")
            .expect("seed cache");
        harness.coordinator = harness.coordinator.with_cache(cache);

        let result = harness
            .coordinator
            .simplify(&path, "notice.pdf", "en")
            .await
            .expect("simplify should succeed");

        assert_eq!(result.summary, "Widow pension notice.");
        assert_eq!(harness.extraction_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn garbled_model_output_yields_fallback_summary() {
        let dir = tempdir().expect("tempdir");
        let harness = harness(vec![page("eligibility")], "I cannot produce JSON today");

        let result = harness
            .coordinator
            .simplify(&upload(dir.path()), "notice.pdf", "en")
            .await
            .expect("simplify should succeed");

        assert_eq!(result.summary, FAILED_SUMMARY);
        assert!(!result.steps.is_empty());
    }

    #[tokio::test]
    async fn fully_offline_run_is_complete_and_cached() {
        let dir = tempdir().expect("tempdir");
        let extraction_calls = Arc::new(AtomicUsize::new(0));
        let cascade = ExtractionCascade::new(Box::new(FakePages {
            pages: vec![page("eligibility")],
            calls: extraction_calls.clone(),
        }));
        let cache = ResultCache::new(dir.path().join("cache"));
        let coordinator = PipelineCoordinator::new(cascade, Arc::new(InferenceOrchestrator::new()))
            .with_cache(cache);
        let path = upload(dir.path());

        let first = coordinator
            .simplify(&path, "notice.pdf", "en")
            .await
            .expect("simplify should succeed");
        let second = coordinator
            .simplify(&path, "notice.pdf", "en")
            .await
            .expect("second simplify should succeed");

        assert_eq!(first.inference_tier, TierKind::Offline);
        assert!(first.summary.contains("widow pension scheme"));
        assert!(!first.steps.is_empty());
        assert_eq!(first, second);
        assert_eq!(extraction_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn raw_text_is_truncated_for_the_result() {
        let dir = tempdir().expect("tempdir");
        let long = "योजना ".repeat(2_000);
        let harness = harness(vec![long], SUMMARY_JSON);

        let result = harness
            .coordinator
            .simplify(&upload(dir.path()), "notice.pdf", "hi")
            .await
            .expect("simplify should succeed");

        assert_eq!(result.raw_text.chars().count(), 5_000);
    }

    #[tokio::test]
    async fn questions_are_answered_from_retrieved_chunks() {
        let dir = tempdir().expect("tempdir");
        let harness = harness(vec![page("eligibility")], "You must be above 40.");

        let answer = harness
            .coordinator
            .ask_document(&upload(dir.path()), "Who can apply?", "en")
            .await
            .expect("ask should succeed");

        assert_eq!(answer, "You must be above 40.");
        let prompts = harness.backend.prompts.lock().expect("lock").clone();
        assert!(prompts[0].contains("Question: Who can apply?"));
        assert!(prompts[0].contains("widow pension scheme"));
        assert_eq!(harness.coordinator.open_collections(), 0);
    }

    #[tokio::test]
    async fn empty_document_has_no_relevant_information() {
        let dir = tempdir().expect("tempdir");
        let harness = harness(vec![String::new()], "unused");

        let answer = harness
            .coordinator
            .ask_document(&upload(dir.path()), "Who can apply?", "en")
            .await
            .expect("ask should succeed");

        assert_eq!(answer, NO_RELEVANT_INFORMATION);
        assert_eq!(harness.backend.calls.load(Ordering::SeqCst), 0);
    }
}
