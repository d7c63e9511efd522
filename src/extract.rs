//! Best-effort text extraction and cleaning.
//!
//! PDFs go through `pdf-extract`; `.txt` and `.md` files are read as UTF-8
//! (lossy). Extraction never panics outward: a panic inside the PDF parser is
//! caught and reported as [`ExtractError::Pdf`]. Cleaned text is what the
//! chunker sees, so [`clean_pages`] is versioned through
//! `pipeline.cleaner_version`.

use std::path::Path;

/// Extraction error. The pipeline records it as a skip and moves on.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFileType(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFileType(ext) => {
                write!(f, "unsupported file type: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract and clean the text of a document, choosing the reader by file
/// extension. An empty string means the document had no usable text.
pub fn extract_text(path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let pages = match ext.as_str() {
        "pdf" => extract_pdf_pages(bytes)?,
        "txt" | "md" | "markdown" => vec![String::from_utf8_lossy(bytes).into_owned()],
        other => return Err(ExtractError::UnsupportedFileType(other.to_string())),
    };

    Ok(clean_pages(&pages))
}

/// Split PDF text into pages on the form feeds `pdf-extract` emits.
fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
    match result {
        Ok(Ok(text)) => Ok(text.split('\u{c}').map(str::to_string).collect()),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

/// Collapse whitespace inside each page, drop empty pages and join the rest
/// with a blank line. NUL bytes count as whitespace.
pub fn clean_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|p| clean_page(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn clean_page(text: &str) -> String {
    text.replace('\0', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
