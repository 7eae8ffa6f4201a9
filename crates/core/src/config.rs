use crate::backends::{GeminiBackend, OpenAiCompatibleBackend, OPENAI_API_BASE};
use crate::cache::{ResultCache, DEFAULT_RETENTION_DAYS};
use crate::extractor::{
    ExtractionCascade, SubprocessOcrStrategy, TextLayerStrategy, VisionStrategy,
    DEFAULT_MIN_TEXT_CHARS,
};
use crate::ocr::TesseractStrategy;
use crate::orchestrator::{InferenceOrchestrator, DEFAULT_RATE_LIMIT_BACKOFF};
use crate::pipeline::{PipelineCoordinator, PipelineOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OPENAI_MODEL: &str = "o3-mini";
const DEFAULT_OPENAI_RETRY_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ENTERPRISE_MODEL: &str = "gpt-4o-mini";
const MIN_OPENAI_KEY_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub retry_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterpriseConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub storage_dir: PathBuf,
    pub subprocess_ocr: bool,
    pub ocr_fast: bool,
    pub python: PathBuf,
    pub ocr_script: PathBuf,
    pub tesseract_bin: PathBuf,
    pub tessdata_dir: PathBuf,
    pub min_text_chars: usize,
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAiConfig>,
    pub enterprise: Option<EnterpriseConfig>,
    pub rate_limit_backoff: Duration,
    pub cache_retention_days: i64,
    pub long_document_pages: usize,
}

/// Rejects keys copied verbatim from an example `.env`.
pub fn looks_like_real_openai_key(key: &str) -> bool {
    let lowered = key.trim().to_lowercase();
    lowered.len() > MIN_OPENAI_KEY_CHARS
        && !lowered.contains("your_openai")
        && !lowered.contains("youropenai")
        && !lowered.contains("placeholder")
        && !lowered.ends_with("here")
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            get(key)
                .and_then(|value| value.parse().ok())
                .unwrap_or(default)
        };

        let storage_dir = PathBuf::from(text("STORAGE_DIR", "storage"));
        let tessdata_dir = get("TESSDATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_dir.join("models").join("tessdata"));

        let gemini = get("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: get("GEMINI_MODEL").map(|model| model.trim_start_matches("models/").to_string()),
            base_url: get("GEMINI_BASE_URL"),
        });

        let openai = get("OPENAI_API_KEY")
            .filter(|key| looks_like_real_openai_key(key))
            .map(|api_key| OpenAiConfig {
                api_key,
                base_url: text("OPENAI_BASE_URL", OPENAI_API_BASE),
                model: text("OPENAI_FALLBACK_MODEL", DEFAULT_OPENAI_MODEL),
                retry_model: text("OPENAI_RETRY_MODEL", DEFAULT_OPENAI_RETRY_MODEL),
            });

        let enterprise = get("ENTERPRISE_LLM_ENDPOINT").map(|endpoint| EnterpriseConfig {
            endpoint,
            api_key: get("ENTERPRISE_LLM_API_KEY"),
            model: text("ENTERPRISE_LLM_MODEL", DEFAULT_ENTERPRISE_MODEL),
        });

        let cache_retention_days =
            number("CACHE_RETENTION_DAYS", DEFAULT_RETENTION_DAYS as u64) as i64;

        Self {
            subprocess_ocr: get("OCR_ENGINE")
                .map_or(true, |engine| engine.eq_ignore_ascii_case("paddleocr")),
            ocr_fast: get("OCR_FAST").map_or(true, |fast| fast.eq_ignore_ascii_case("true")),
            python: PathBuf::from(text("PYTHON", "python")),
            ocr_script: PathBuf::from(text("OCR_SCRIPT", "python/paddle_ocr.py")),
            tesseract_bin: PathBuf::from(text("TESSERACT_BIN", "tesseract")),
            tessdata_dir,
            min_text_chars: number("MIN_TEXT_CHARS", DEFAULT_MIN_TEXT_CHARS as u64) as usize,
            gemini,
            openai,
            enterprise,
            rate_limit_backoff: Duration::from_millis(number(
                "RATE_LIMIT_BACKOFF_MS",
                DEFAULT_RATE_LIMIT_BACKOFF.as_millis() as u64,
            )),
            cache_retention_days,
            long_document_pages: number("LONG_DOCUMENT_PAGES", 5) as usize,
            storage_dir,
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.storage_dir.join("temp")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.storage_dir.join("cache")
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.storage_dir.join("knowledge")
    }

    /// OpenAI serves both the fast tier and the secondary tier when configured.
    pub fn build_orchestrator(&self) -> InferenceOrchestrator {
        let mut orchestrator =
            InferenceOrchestrator::new().with_rate_limit_backoff(self.rate_limit_backoff);

        if let Some(enterprise) = &self.enterprise {
            let backend = OpenAiCompatibleBackend::new(
                "enterprise",
                &enterprise.endpoint,
                enterprise.api_key.clone(),
                enterprise.model.clone(),
            );
            orchestrator =
                orchestrator.with_enterprise(Arc::new(backend), enterprise.model.clone());
        }

        if let Some(openai) = &self.openai {
            let backend = Arc::new(OpenAiCompatibleBackend::new(
                "openai",
                &openai.base_url,
                Some(openai.api_key.clone()),
                openai.model.clone(),
            ));
            orchestrator = orchestrator
                .with_fast(backend.clone(), openai.model.clone(), Some(openai.retry_model.clone()))
                .with_secondary(backend, openai.model.clone(), Some(openai.retry_model.clone()));
        }

        if let Some(gemini) = &self.gemini {
            let mut backend = GeminiBackend::new(gemini.api_key.clone());
            if let Some(base_url) = &gemini.base_url {
                backend = backend.with_base_url(base_url.clone());
            }
            orchestrator = orchestrator.with_primary(Arc::new(backend), gemini.model.clone());
        }

        orchestrator
    }

    pub fn build_cascade(&self, orchestrator: Arc<InferenceOrchestrator>) -> ExtractionCascade {
        let mut cascade = ExtractionCascade::new(Box::new(VisionStrategy::new(orchestrator)))
            .with_min_chars(self.min_text_chars)
            .with_strategy(Box::new(TextLayerStrategy))
            .with_strategy(Box::new(TesseractStrategy::new(
                &self.tesseract_bin,
                &self.tessdata_dir,
            )));

        if self.subprocess_ocr {
            let subprocess =
                SubprocessOcrStrategy::new(&self.python, &self.ocr_script, self.temp_dir())
                    .fast(self.ocr_fast);
            cascade = cascade.with_strategy(Box::new(subprocess));
        }
        cascade
    }

    pub fn build_coordinator(
        &self,
        orchestrator: Arc<InferenceOrchestrator>,
    ) -> PipelineCoordinator {
        let options = PipelineOptions {
            long_document_pages: self.long_document_pages,
            ..PipelineOptions::default()
        };
        let cache = ResultCache::with_retention(
            self.cache_dir(),
            chrono::Duration::days(self.cache_retention_days),
        );

        PipelineCoordinator::new(self.build_cascade(orchestrator.clone()), orchestrator)
            .with_cache(cache)
            .with_options(options)
    }
}
