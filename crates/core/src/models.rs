use crate::error::ExtractionError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    PlainText,
    Raster,
    Unknown,
}

/// An uploaded file awaiting extraction. Read-only once opened.
#[derive(Debug, Clone)]
pub struct Document {
    pub source_path: PathBuf,
    pub display_name: String,
    pub language: String,
    pub byte_length: u64,
    pub kind: DocumentKind,
}

impl Document {
    pub fn open(
        path: &Path,
        display_name: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let metadata = std::fs::metadata(path)?;

        Ok(Self {
            source_path: path.to_path_buf(),
            display_name: display_name.into(),
            language: language.into(),
            byte_length: metadata.len(),
            kind: kind_from_path(path),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        mime_type_for(&self.source_path)
    }

    pub fn file_name(&self) -> Result<String, ExtractionError> {
        self.source_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::MissingFileName(self.source_path.display().to_string()))
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn kind_from_path(path: &Path) -> DocumentKind {
    match extension(path).as_str() {
        "pdf" => DocumentKind::Pdf,
        "txt" | "md" => DocumentKind::PlainText,
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" | "tif" | "tiff" => DocumentKind::Raster,
        _ => DocumentKind::Unknown,
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => "image/png",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    #[serde(rename = "pageNumber")]
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionEngine {
    TextLayer,
    Tesseract,
    Paddleocr,
    Vision,
}

impl ExtractionEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionEngine::TextLayer => "text_layer",
            ExtractionEngine::Tesseract => "tesseract",
            ExtractionEngine::Paddleocr => "paddleocr",
            ExtractionEngine::Vision => "vision",
        }
    }
}

impl fmt::Display for ExtractionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub cleaned_text: String,
    pub pages: Vec<PageText>,
    pub engine: ExtractionEngine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub token_count: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Leading words repeated from the previous chunk.
    pub overlap_words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Attachment {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn is_visual(&self) -> bool {
        self.mime_type.starts_with("image/") || self.mime_type == "application/pdf"
    }
}

#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub prompt: String,
    pub attachment: Option<Attachment>,
    pub wants_json: bool,
    pub prefer_fast: bool,
    /// Only consulted by offline degradation.
    pub language: Option<String>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn json(mut self) -> Self {
        self.wants_json = true;
        self
    }

    pub fn fast(mut self) -> Self {
        self.prefer_fast = true;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn in_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Enterprise,
    Fast,
    Primary,
    Secondary,
    Offline,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Enterprise => "enterprise",
            TierKind::Fast => "fast",
            TierKind::Primary => "primary",
            TierKind::Secondary => "secondary",
            TierKind::Offline => "offline",
        }
    }

    pub fn accepts_attachments(&self) -> bool {
        matches!(self, TierKind::Primary | TierKind::Secondary)
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOutcome {
    pub text: String,
    pub tier: TierKind,
    pub backend: String,
    pub model: Option<String>,
}

impl InferenceOutcome {
    pub fn is_degraded(&self) -> bool {
        self.tier == TierKind::Offline
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifiedDocument {
    pub summary: String,
    #[serde(rename = "eli10")]
    pub plain_explanation: String,
    pub key_points: Vec<String>,
    pub steps: Vec<String>,
    pub language: String,
    pub source_file: String,
    pub raw_text: String,
    #[serde(rename = "ocrEngine")]
    pub ocr_engine_used: ExtractionEngine,
    pub inference_tier: TierKind,
}
