//! Text extraction boundary
//!
//! Extraction is a collaborating service: given an uploaded artifact it
//! returns plain text, and it returns an empty string on failure or an
//! unsupported format rather than erroring; the flow tolerates empty
//! extracted text at every step. Binary formats (PDF, image OCR, audio
//! transcription) belong to an external implementation of this trait.

use tracing::{info, warn};

/// Trait for extracting text from an uploaded artifact
#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> String;
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "log", "json", "toml", "yaml", "yml",
    // code files feed the code_explain path
    "rs", "py", "js", "ts", "go", "java", "c", "h", "cpp", "sh", "sql",
];

/// Extracts UTF-8 text from plain-text and code uploads
pub struct PlainTextExtractor;

#[async_trait::async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> String {
        let extension = file_name
            .rsplit('.')
            .next()
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            warn!(file_name, "No extractor for this format, continuing without text");
            return String::new();
        }

        let text = String::from_utf8_lossy(bytes).into_owned();

        info!(
            file_name,
            chars = text.len(),
            "Extracted text from upload"
        );

        text
    }
}
