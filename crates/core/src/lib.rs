pub mod backends;
pub mod cache;
pub mod chunking;
pub mod cleaner;
pub mod config;
pub mod eligibility;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod forms;
pub mod index;
pub mod models;
pub mod ocr;
pub mod offline;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod traits;
pub mod voice;

pub use backends::{GeminiBackend, OpenAiCompatibleBackend};
pub use cache::{hash_bytes, hash_file, ResultCache};
pub use chunking::{chunk_text, estimate_tokens, ChunkingConfig};
pub use cleaner::{clean, clean_with, CleanOptions};
pub use config::CoreConfig;
pub use eligibility::{load_schemes, EligibilityResult, EligibilityScorer, Scheme, UserProfile};
pub use embeddings::{
    cosine_similarity, Embedder, HashedBagOfWordsEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{CacheError, ExtractionError, InferenceError, PipelineError};
pub use extractor::{ExtractionCascade, SubprocessOcrStrategy, TextLayerStrategy, VisionStrategy};
pub use forms::{FormExplainer, FormExplanation, FormField};
pub use index::{ScoredChunk, SimilarityIndex};
pub use models::{
    Attachment, Chunk, Document, DocumentKind, ExtractionEngine, ExtractionResult, InferenceOutcome,
    InferenceRequest, PageText, SimplifiedDocument, TierKind,
};
pub use ocr::TesseractStrategy;
pub use offline::{OfflineDigest, OfflineResponder};
pub use orchestrator::InferenceOrchestrator;
pub use pipeline::{PipelineCoordinator, PipelineOptions};
pub use traits::{ExtractionStrategy, GenerationBackend, GenerationCall};
pub use voice::{Transcript, Transcriber};
