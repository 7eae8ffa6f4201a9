use crate::cleaner::clean;
use crate::error::ExtractionError;
use crate::models::{
    Attachment, Document, DocumentKind, ExtractionEngine, ExtractionResult, InferenceRequest,
    PageText,
};
use crate::ocr::subprocess_language;
use crate::orchestrator::InferenceOrchestrator;
use crate::prompts::VISION_EXTRACTION_PROMPT;
use crate::traits::ExtractionStrategy;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;
pub const MAX_VISION_PDF_BYTES: u64 = 2 * 1024 * 1024;
pub const MAX_VISION_FILE_BYTES: u64 = 20 * 1024 * 1024;
pub const NO_TEXT_EXTRACTED: &str = "No text could be extracted from this document. \
The image may be too blurry, contain no text, or the document format may not be supported.";

const PAGE_SEPARATOR: &str = "\n\n";

/// Reads the embedded text layer of PDFs, and plain-text files as-is.
#[derive(Default)]
pub struct TextLayerStrategy;

#[async_trait]
impl ExtractionStrategy for TextLayerStrategy {
    fn engine(&self) -> ExtractionEngine {
        ExtractionEngine::TextLayer
    }

    fn available(&self, document: &Document) -> bool {
        matches!(document.kind, DocumentKind::Pdf | DocumentKind::PlainText)
    }

    async fn extract(&self, document: &Document) -> Result<Vec<PageText>, ExtractionError> {
        if document.kind == DocumentKind::PlainText {
            let text = tokio::fs::read_to_string(&document.source_path).await?;
            return Ok(vec![PageText { number: 1, text }]);
        }

        let path = document.source_path.clone();
        tokio::task::spawn_blocking(move || pdf_page_texts(&path))
            .await
            .map_err(|error| ExtractionError::Join(error.to_string()))?
    }
}

/// One entry per page, so the page count stays real. Pages without a text
/// layer carry empty text.
fn pdf_page_texts(path: &Path) -> Result<Vec<PageText>, ExtractionError> {
    let document = lopdf::Document::load(path)
        .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
        pages.push(PageText {
            number: page_no,
            text,
        });
    }

    Ok(pages)
}

#[derive(Debug, Deserialize)]
struct OcrHandshake {
    #[serde(default)]
    pages: Vec<HandshakePage>,
}

#[derive(Debug, Deserialize)]
struct HandshakePage {
    #[serde(default, rename = "pageNumber")]
    page_number: Option<u32>,
    #[serde(default)]
    text: String,
}

fn handshake_to_pages(handshake: OcrHandshake) -> Vec<PageText> {
    handshake
        .pages
        .into_iter()
        .enumerate()
        .filter_map(|(index, page)| {
            let text = page.text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(PageText {
                    number: page.page_number.unwrap_or(index as u32 + 1),
                    text,
                })
            }
        })
        .collect()
}

/// Runs an external recognition script (`<python> <script> --input <file>
/// --lang <code> --out <json> [--fast]`) and reads its per-page JSON result.
pub struct SubprocessOcrStrategy {
    program: PathBuf,
    script: PathBuf,
    temp_dir: PathBuf,
    fast: bool,
}

impl SubprocessOcrStrategy {
    pub fn new(
        program: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            temp_dir: temp_dir.into(),
            fast: true,
        }
    }

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    fn unavailable(&self, reason: String) -> ExtractionError {
        ExtractionError::EngineUnavailable {
            engine: self.engine().to_string(),
            reason,
        }
    }

    /// Unique per call, so documents sharing a file name never share a result file.
    fn handshake_path(&self, document: &Document) -> Result<PathBuf, ExtractionError> {
        Ok(self.temp_dir.join(format!(
            "{}.{}.ocr.json",
            document.file_name()?,
            Uuid::new_v4().simple()
        )))
    }
}

async fn remove_handshake(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            debug!(%error, path = %path.display(), "could not remove handshake file");
        }
        _ => {}
    }
}

#[async_trait]
impl ExtractionStrategy for SubprocessOcrStrategy {
    fn engine(&self) -> ExtractionEngine {
        ExtractionEngine::Paddleocr
    }

    fn available(&self, document: &Document) -> bool {
        document.kind != DocumentKind::PlainText && self.script.is_file()
    }

    async fn extract(&self, document: &Document) -> Result<Vec<PageText>, ExtractionError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let handshake_path = self.handshake_path(document)?;
        remove_handshake(&handshake_path).await;

        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .arg("--input")
            .arg(&document.source_path)
            .arg("--lang")
            .arg(subprocess_language(&document.language))
            .arg("--out")
            .arg(&handshake_path);
        if self.fast {
            command.arg("--fast");
        }

        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|error| {
                self.unavailable(format!(
                    "failed to spawn {}: {error}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            remove_handshake(&handshake_path).await;
            return Err(self.unavailable(format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let raw = tokio::fs::read_to_string(&handshake_path).await;
        remove_handshake(&handshake_path).await;
        let raw = raw.map_err(|error| self.unavailable(format!("no result file: {error}")))?;

        let handshake: OcrHandshake = serde_json::from_str(&raw)?;
        Ok(handshake_to_pages(handshake))
    }
}

/// Universal fallback: the whole file goes to a vision-capable backend
/// through the orchestrator. Never fails except when the file cannot be read.
pub struct VisionStrategy {
    orchestrator: Arc<InferenceOrchestrator>,
}

impl VisionStrategy {
    pub fn new(orchestrator: Arc<InferenceOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

fn size_limit_message(document: &Document) -> Option<String> {
    let megabytes = document.byte_length as f64 / (1024.0 * 1024.0);
    if document.kind == DocumentKind::Pdf {
        (document.byte_length > MAX_VISION_PDF_BYTES).then(|| {
            format!("Error: PDF file is too large ({megabytes:.2}MB). Maximum size is 2MB.")
        })
    } else {
        (document.byte_length > MAX_VISION_FILE_BYTES).then(|| {
            format!("Error: File is too large ({megabytes:.2}MB). Maximum size is 20MB.")
        })
    }
}

#[async_trait]
impl ExtractionStrategy for VisionStrategy {
    fn engine(&self) -> ExtractionEngine {
        ExtractionEngine::Vision
    }

    fn available(&self, _document: &Document) -> bool {
        true
    }

    async fn extract(&self, document: &Document) -> Result<Vec<PageText>, ExtractionError> {
        if let Some(message) = size_limit_message(document) {
            warn!(bytes = document.byte_length, "file exceeds vision size limit");
            return Ok(vec![PageText { number: 1, text: message }]);
        }

        let bytes = tokio::fs::read(&document.source_path).await?;
        let request = InferenceRequest::new(VISION_EXTRACTION_PROMPT)
            .with_attachment(Attachment::new(bytes, document.mime_type()))
            .in_language(document.language.clone());

        let outcome = self.orchestrator.infer_detailed(&request).await;
        let text = if outcome.is_degraded() || outcome.text.trim().is_empty() {
            NO_TEXT_EXTRACTED.to_string()
        } else {
            outcome.text
        };

        Ok(vec![PageText { number: 1, text }])
    }
}

/// Ordered strategies tried cheapest first, plus a fallback whose result is
/// taken regardless of length.
pub struct ExtractionCascade {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    fallback: Box<dyn ExtractionStrategy>,
    min_chars: usize,
}

impl ExtractionCascade {
    pub fn new(fallback: Box<dyn ExtractionStrategy>) -> Self {
        Self {
            strategies: Vec::new(),
            fallback,
            min_chars: DEFAULT_MIN_TEXT_CHARS,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub async fn extract_path(
        &self,
        path: &Path,
        language: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let document = Document::open(path, name, language)?;
        self.extract(&document).await
    }

    pub async fn extract(
        &self,
        document: &Document,
    ) -> Result<ExtractionResult, ExtractionError> {
        for strategy in &self.strategies {
            let engine = strategy.engine();
            if !strategy.available(document) {
                debug!(engine = %engine, "strategy not available, skipping");
                continue;
            }

            match strategy.extract(document).await {
                Ok(pages) => {
                    let raw_text = join_pages(&pages);
                    let chars = raw_text.trim().chars().count();
                    if chars >= self.min_chars {
                        info!(engine = %engine, pages = pages.len(), chars, "extraction complete");
                        return Ok(build_result(raw_text, pages, engine));
                    }
                    let error = ExtractionError::InsufficientText {
                        engine: engine.to_string(),
                        chars,
                    };
                    debug!(
                        engine = %engine,
                        %error,
                        min_chars = self.min_chars,
                        "strategy output rejected"
                    );
                }
                Err(error) => warn!(engine = %engine, %error, "extraction strategy failed"),
            }
        }

        let engine = self.fallback.engine();
        let pages = self.fallback.extract(document).await?;
        info!(engine = %engine, pages = pages.len(), "extraction complete via fallback");
        Ok(build_result(join_pages(&pages), pages, engine))
    }
}

fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

fn build_result(
    raw_text: String,
    pages: Vec<PageText>,
    engine: ExtractionEngine,
) -> ExtractionResult {
    ExtractionResult {
        cleaned_text: clean(&raw_text),
        raw_text,
        pages,
        engine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const BLANK_PNG: [u8; 67] = [
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
        0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
    ];

    struct CountingStrategy {
        engine: ExtractionEngine,
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExtractionStrategy for CountingStrategy {
        fn engine(&self) -> ExtractionEngine {
            self.engine
        }

        fn available(&self, _document: &Document) -> bool {
            true
        }

        async fn extract(&self, _document: &Document) -> Result<Vec<PageText>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PageText {
                number: 1,
                text: self.text.to_string(),
            }])
        }
    }

    fn counting_fallback(calls: &Arc<AtomicUsize>) -> Box<dyn ExtractionStrategy> {
        Box::new(CountingStrategy {
            engine: ExtractionEngine::Vision,
            text: "from fallback",
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn long_text_file_short_circuits_at_text_layer() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("notice.txt");
        let body = "Applicants must bring an income certificate. ".repeat(12);
        assert!(body.trim().chars().count() >= 500);
        fs::write(&path, &body).expect("write notice");

        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let cascade = ExtractionCascade::new(counting_fallback(&fallback_calls))
            .with_strategy(Box::new(TextLayerStrategy));

        let result = cascade
            .extract_path(&path, "en")
            .await
            .expect("extraction should succeed");

        assert_eq!(result.engine, ExtractionEngine::TextLayer);
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.raw_text, body);
        assert_eq!(result.cleaned_text, body.trim());
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_text_falls_through_to_fallback() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("short.txt");
        fs::write(&path, "Page 1").expect("write file");

        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let cascade = ExtractionCascade::new(counting_fallback(&fallback_calls))
            .with_strategy(Box::new(TextLayerStrategy));

        let result = cascade
            .extract_path(&path, "en")
            .await
            .expect("extraction should succeed");
        assert_eq!(result.engine, ExtractionEngine::Vision);
        assert_eq!(result.raw_text, "from fallback");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_image_offline_yields_descriptive_text() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("blank.png");
        fs::write(&path, BLANK_PNG).expect("write png");

        let orchestrator = Arc::new(InferenceOrchestrator::new());
        let cascade = ExtractionCascade::new(Box::new(VisionStrategy::new(orchestrator)))
            .with_strategy(Box::new(TextLayerStrategy))
            .with_strategy(Box::new(SubprocessOcrStrategy::new(
                "python",
                dir.path().join("missing_script.py"),
                dir.path().join("temp"),
            )));

        let result = cascade
            .extract_path(&path, "hi")
            .await
            .expect("extraction should not fail");

        assert_eq!(result.engine, ExtractionEngine::Vision);
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.raw_text, NO_TEXT_EXTRACTED);
    }

    #[tokio::test]
    async fn oversized_pdf_reports_size_instead_of_failing() {
        let document = Document {
            source_path: PathBuf::from("/nonexistent/large.pdf"),
            display_name: "large.pdf".to_string(),
            language: "en".to_string(),
            byte_length: 3 * 1024 * 1024,
            kind: DocumentKind::Pdf,
        };
        let strategy = VisionStrategy::new(Arc::new(InferenceOrchestrator::new()));

        let pages = strategy
            .extract(&document)
            .await
            .expect("size check is not an error");
        assert_eq!(
            pages[0].text,
            "Error: PDF file is too large (3.00MB). Maximum size is 2MB."
        );
    }

    #[tokio::test]
    async fn unreadable_file_is_the_only_hard_failure() {
        let document = Document {
            source_path: PathBuf::from("/nonexistent/scan.png"),
            display_name: "scan.png".to_string(),
            language: "en".to_string(),
            byte_length: 10,
            kind: DocumentKind::Raster,
        };
        let vision = VisionStrategy::new(Arc::new(InferenceOrchestrator::new()));
        let cascade = ExtractionCascade::new(Box::new(vision));

        let error = cascade
            .extract(&document)
            .await
            .expect_err("missing file should fail");
        assert!(matches!(error, ExtractionError::Io(_)));
    }

    #[test]
    fn handshake_pages_keep_numbers_and_drop_blank_text() {
        let handshake: OcrHandshake = serde_json::from_str(
            r#"{"pages":[
                {"pageNumber":1,"text":" first "},
                {"pageNumber":2,"text":"  "},
                {"text":"third"}
            ]}"#,
        )
        .expect("valid handshake");

        let pages = handshake_to_pages(handshake);
        assert_eq!(pages.len(), 2);
        assert_eq!(
            pages[0],
            PageText {
                number: 1,
                text: "first".to_string()
            }
        );
        assert_eq!(
            pages[1],
            PageText {
                number: 3,
                text: "third".to_string()
            }
        );
    }

    /// Builds a PDF whose pages hold the given text; `None` is a page with
    /// no text layer.
    fn write_pdf(path: &Path, page_texts: &[Option<&str>]) {
        use lopdf::{dictionary, Object, Stream};

        let mut doc = lopdf::Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type1".to_vec()),
            "BaseFont" => Object::Name(b"Helvetica".to_vec()),
        });

        let mut kids = Vec::new();
        for text in page_texts {
            let content = match text {
                Some(text) => format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET").into_bytes(),
                None => Vec::new(),
            };
            let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content)));
            let page_id = doc.add_object(dictionary! {
                "Type" => Object::Name(b"Page".to_vec()),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => Object::Reference(font_id),
                    },
                },
            });
            kids.push(page_id);
        }

        let pages_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(kids.len() as i64),
        });
        for page_id in &kids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).expect("save pdf");
    }

    #[tokio::test]
    async fn blank_pdf_pages_still_count() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("circular.pdf");
        write_pdf(
            &path,
            &[Some("Ration card renewal"), None, Some("Submit before March"), None],
        );
        let document = Document::open(&path, "circular.pdf", "en").expect("open pdf");

        let pages = TextLayerStrategy
            .extract(&document)
            .await
            .expect("text layer should parse");

        assert_eq!(pages.len(), 4);
        assert_eq!(
            pages.iter().map(|page| page.number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(pages[0].text.contains("Ration card renewal"));
        assert!(pages[1].text.trim().is_empty());
        assert!(pages[3].text.trim().is_empty());
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;

        fn scan(dir: &Path) -> Document {
            let path = dir.join("scan.png");
            fs::write(&path, BLANK_PNG).expect("write scan");
            Document::open(&path, "scan.png", "mr").expect("open scan")
        }

        #[tokio::test]
        async fn multi_page_handshake_is_preserved_and_removed() {
            let dir = tempdir().expect("tempdir");
            let script = dir.path().join("fake_ocr.sh");
            fs::write(
                &script,
                concat!(
                    "while [ $# -gt 0 ]; do\n",
                    "  if [ \"$1\" = \"--out\" ]; then out=\"$2\"; fi\n",
                    "  shift\n",
                    "done\n",
                    "printf '{\"pages\":[{\"pageNumber\":1,\"text\":\"first page\"},",
                    "{\"pageNumber\":2,\"text\":\"second page\"}]}' > \"$out\"\n",
                ),
            )
            .expect("write script");
            let temp = dir.path().join("temp");

            let strategy = SubprocessOcrStrategy::new("sh", &script, &temp);
            let document = scan(dir.path());
            assert!(strategy.available(&document));

            let pages = strategy
                .extract(&document)
                .await
                .expect("subprocess should succeed");
            assert_eq!(pages.len(), 2);
            assert_eq!(pages[1].text, "second page");
            let leftovers = fs::read_dir(&temp).expect("temp dir exists").count();
            assert_eq!(leftovers, 0);
        }

        #[tokio::test]
        async fn same_named_documents_recognised_concurrently_keep_their_own_text() {
            let dir = tempdir().expect("tempdir");
            let script = dir.path().join("echo_input_ocr.sh");
            fs::write(
                &script,
                concat!(
                    "while [ $# -gt 0 ]; do\n",
                    "  case \"$1\" in\n",
                    "    --input) input=\"$2\" ;;\n",
                    "    --out) out=\"$2\" ;;\n",
                    "  esac\n",
                    "  shift\n",
                    "done\n",
                    "sleep 0.2\n",
                    "printf '{\"pages\":[{\"pageNumber\":1,\"text\":\"%s\"}]}' \\\n",
                    "  \"$input\" > \"$out\"\n",
                ),
            )
            .expect("write script");

            let first_dir = dir.path().join("a");
            let second_dir = dir.path().join("b");
            fs::create_dir_all(&first_dir).expect("create a");
            fs::create_dir_all(&second_dir).expect("create b");
            let first = scan(&first_dir);
            let second = scan(&second_dir);

            let strategy = SubprocessOcrStrategy::new("sh", &script, dir.path().join("temp"));
            let (first_pages, second_pages) =
                tokio::join!(strategy.extract(&first), strategy.extract(&second));

            let first_pages = first_pages.expect("first document recognised");
            let second_pages = second_pages.expect("second document recognised");
            assert_eq!(first_pages[0].text, first.source_path.display().to_string());
            assert_eq!(second_pages[0].text, second.source_path.display().to_string());
        }

        #[tokio::test]
        async fn non_zero_exit_is_unavailable_with_stderr() {
            let dir = tempdir().expect("tempdir");
            let script = dir.path().join("broken_ocr.sh");
            fs::write(&script, "echo 'paddle models missing' >&2\nexit 3\n").expect("write script");

            let strategy =
                SubprocessOcrStrategy::new("sh", &script, dir.path().join("temp")).fast(false);
            let error = strategy
                .extract(&scan(dir.path()))
                .await
                .expect_err("non-zero exit should fail");

            match error {
                ExtractionError::EngineUnavailable { engine, reason } => {
                    assert_eq!(engine, "paddleocr");
                    assert!(reason.contains("paddle models missing"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn cascade_prefers_subprocess_pages_over_fallback() {
            let dir = tempdir().expect("tempdir");
            let script = dir.path().join("fake_ocr.sh");
            let long_page = "The scholarship application requires a caste certificate. ".repeat(3);
            fs::write(
                &script,
                format!(
                    concat!(
                        "while [ $# -gt 0 ]; do\n",
                        "  if [ \"$1\" = \"--out\" ]; then out=\"$2\"; fi\n",
                        "  shift\n",
                        "done\n",
                        "printf '{{\"pages\":[{{\"pageNumber\":1,\"text\":\"{}\"}}]}}' \\\n",
                        "  > \"$out\"\n",
                    ),
                    long_page
                ),
            )
            .expect("write script");

            let fallback_calls = Arc::new(AtomicUsize::new(0));
            let cascade = ExtractionCascade::new(counting_fallback(&fallback_calls))
                .with_strategy(Box::new(TextLayerStrategy))
                .with_strategy(Box::new(SubprocessOcrStrategy::new(
                    "sh",
                    &script,
                    dir.path().join("temp"),
                )));

            let result = cascade
                .extract(&scan(dir.path()))
                .await
                .expect("extraction should succeed");
            assert_eq!(result.engine, ExtractionEngine::Paddleocr);
            assert_eq!(result.raw_text, long_page.trim());
            assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
        }
    }
}
