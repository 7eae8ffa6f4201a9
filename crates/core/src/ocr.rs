use crate::error::ExtractionError;
use crate::models::{Document, DocumentKind, ExtractionEngine, PageText};
use crate::traits::ExtractionStrategy;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const RECOGNITION_MODELS: [(&str, &str); 11] = [
    ("en", "eng"),
    ("hi", "hin"),
    ("mr", "mar"),
    ("bn", "ben"),
    ("ta", "tam"),
    ("te", "tel"),
    ("kn", "kan"),
    ("ml", "mal"),
    ("gu", "guj"),
    ("pa", "pan"),
    ("or", "ori"),
];

/// Tesseract model code for a document language, English when unknown.
pub fn recognition_model(language: &str) -> &'static str {
    let language = language.trim().to_ascii_lowercase();
    RECOGNITION_MODELS
        .iter()
        .find(|(code, _)| language.starts_with(code))
        .map(|(_, model)| *model)
        .unwrap_or("eng")
}

/// The external recognition process only ships `en`, `hi` and `mr` models.
pub fn subprocess_language(language: &str) -> &'static str {
    let language = language.trim().to_ascii_lowercase();
    ["hi", "mr"]
        .into_iter()
        .find(|code| language.starts_with(code))
        .unwrap_or("en")
}

/// Local recognition through a `tesseract` binary and a directory of cached
/// `<model>.traineddata` files.
pub struct TesseractStrategy {
    binary: PathBuf,
    tessdata_dir: PathBuf,
}

impl TesseractStrategy {
    pub fn new(binary: impl Into<PathBuf>, tessdata_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir: tessdata_dir.into(),
        }
    }

    pub fn tessdata_dir(&self) -> &Path {
        &self.tessdata_dir
    }

    fn has_model(&self, model: &str) -> bool {
        self.tessdata_dir.join(format!("{model}.traineddata")).is_file()
    }

    /// `-l` argument for `language`, or `None` when its model is not cached.
    fn language_arg(&self, language: &str) -> Option<String> {
        let model = recognition_model(language);
        if !self.has_model(model) {
            return None;
        }
        if model != "eng" && self.has_model("eng") {
            Some(format!("{model}+eng"))
        } else {
            Some(model.to_string())
        }
    }
}

#[async_trait]
impl ExtractionStrategy for TesseractStrategy {
    fn engine(&self) -> ExtractionEngine {
        ExtractionEngine::Tesseract
    }

    fn available(&self, document: &Document) -> bool {
        document.kind == DocumentKind::Raster && self.language_arg(&document.language).is_some()
    }

    async fn extract(&self, document: &Document) -> Result<Vec<PageText>, ExtractionError> {
        let languages = self
            .language_arg(&document.language)
            .ok_or_else(|| ExtractionError::EngineUnavailable {
                engine: self.engine().to_string(),
                reason: format!("no model for language {}", document.language),
            })?;

        debug!(languages = %languages, path = %document.source_path.display(), "running tesseract");
        let output = Command::new(&self.binary)
            .arg(&document.source_path)
            .arg("stdout")
            .arg("-l")
            .arg(&languages)
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|error| ExtractionError::EngineUnavailable {
                engine: self.engine().to_string(),
                reason: format!("failed to spawn {}: {error}", self.binary.display()),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::EngineUnavailable {
                engine: self.engine().to_string(),
                reason: format!(
                    "exit status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(vec![PageText {
            number: 1,
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn raster(dir: &Path, language: &str) -> Document {
        let path = dir.join("scan.png");
        fs::write(&path, [0u8; 8]).expect("write scan");
        Document::open(&path, "scan.png", language).expect("open scan")
    }

    #[test]
    fn languages_map_to_recognition_models() {
        assert_eq!(recognition_model("hi"), "hin");
        assert_eq!(recognition_model("or"), "ori");
        assert_eq!(recognition_model("en-IN"), "eng");
        assert_eq!(recognition_model("fr"), "eng");
        assert_eq!(subprocess_language("mr"), "mr");
        assert_eq!(subprocess_language("ta"), "en");
    }

    #[test]
    fn availability_requires_cached_model() {
        let dir = tempdir().expect("tempdir");
        let tessdata = dir.path().join("tessdata");
        fs::create_dir_all(&tessdata).expect("tessdata dir");
        let strategy = TesseractStrategy::new("tesseract", &tessdata);
        let document = raster(dir.path(), "hi");

        assert!(!strategy.available(&document));

        fs::write(tessdata.join("hin.traineddata"), b"model").expect("write model");
        assert!(strategy.available(&document));
        assert_eq!(strategy.language_arg("hi").as_deref(), Some("hin"));

        fs::write(tessdata.join("eng.traineddata"), b"model").expect("write model");
        assert_eq!(strategy.language_arg("hi").as_deref(), Some("hin+eng"));
        assert_eq!(strategy.language_arg("en").as_deref(), Some("eng"));
    }

    #[test]
    fn non_raster_documents_are_skipped() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("eng.traineddata"), b"model").expect("write model");
        let path = dir.path().join("notice.pdf");
        fs::write(&path, b"%PDF-1.4").expect("write pdf");
        let document = Document::open(&path, "notice.pdf", "en").expect("open pdf");

        assert!(!TesseractStrategy::new("tesseract", dir.path()).available(&document));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognized_text_comes_from_stdout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("eng.traineddata"), b"model").expect("write model");
        let binary = dir.path().join("fake-tesseract");
        fs::write(&binary, "#!/bin/sh\necho \"  Ration card renewal notice  \"\n")
            .expect("write script");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).expect("chmod");

        let strategy = TesseractStrategy::new(&binary, dir.path());
        let pages = strategy
            .extract(&raster(dir.path(), "en"))
            .await
            .expect("extraction should succeed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "Ration card renewal notice");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable_not_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("eng.traineddata"), b"model").expect("write model");
        let strategy = TesseractStrategy::new(dir.path().join("no-such-binary"), dir.path());

        let error = strategy
            .extract(&raster(dir.path(), "en"))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(error, ExtractionError::EngineUnavailable { .. }));
    }
}
