//! Document text extraction
//!
//! PDFs are converted with poppler's `pdftotext`, which separates pages with
//! form feeds. The form feeds are recorded as page breaks and replaced by
//! newlines, one character for one character, so chunk positions computed on
//! the cleaned text still map onto pages.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};
use ulid::Ulid;

use crate::{Error, Result};

const PAGE_BREAK: char = '\u{000C}';

/// Plain text pulled out of a document, with page boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    /// Character offsets at which pages 2..n begin
    pub page_breaks: Vec<usize>,
}

impl ExtractedText {
    /// Split form-feed separated text into text plus page offsets.
    pub fn from_paged(raw: &str) -> Self {
        let mut page_breaks = Vec::new();
        let mut text = String::with_capacity(raw.len());
        for (pos, c) in raw.chars().enumerate() {
            if c == PAGE_BREAK {
                page_breaks.push(pos + 1);
                text.push('\n');
            } else {
                text.push(c);
            }
        }
        // pdftotext ends the last page with a form feed too
        let len = text.chars().count();
        page_breaks.retain(|&offset| offset < len);
        Self { text, page_breaks }
    }

    /// 1-based page containing character `position`.
    pub fn page_at(&self, position: usize) -> usize {
        self.page_breaks.partition_point(|&start| start <= position) + 1
    }

    pub fn page_count(&self) -> usize {
        self.page_breaks.len() + 1
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns raw document bytes into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText>;

    fn name(&self) -> &str;
}

/// Extracts PDF text by running `pdftotext` (poppler-utils).
pub struct PdfToText {
    binary: String,
    timeout: Duration,
}

impl PdfToText {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "pdftotext".to_string(),
            timeout,
        }
    }

    /// Use a specific `pdftotext` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, input: &Path) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-enc")
            .arg("UTF-8")
            .arg(input)
            .arg("-")
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| Error::Extraction(format!("pdftotext timed out after {:?}", self.timeout)))?
            .map_err(|e| {
                Error::Extraction(format!("failed to run {} (is poppler installed?): {e}", self.binary))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!(
                "pdftotext exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::Extraction(format!("pdftotext produced invalid UTF-8: {e}")))
    }
}

#[async_trait]
impl TextExtractor for PdfToText {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText> {
        let path = std::env::temp_dir().join(format!("pdfchat-{}.pdf", Ulid::new()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Extraction(format!("failed to stage PDF: {e}")))?;

        let result = self.run(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove staged PDF");
        }

        let extracted = ExtractedText::from_paged(&result?);
        info!(
            chars = extracted.text.chars().count(),
            pages = extracted.page_count(),
            "Extracted PDF text"
        );
        Ok(extracted)
    }

    fn name(&self) -> &str {
        "pdftotext"
    }
}
