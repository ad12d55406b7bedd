//! Plain text from an uploaded résumé (PDF or UTF-8 text).

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("PDF could not be read: {0}")]
    Pdf(String),

    #[error("upload is neither a PDF nor UTF-8 text")]
    NotText,

    #[error("upload contains no text")]
    Empty,
}

pub fn is_pdf(filename: Option<&str>, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
        || filename.is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"))
}

/// CPU-bound and, for hostile PDFs, able to panic inside the parser: call it
/// from `spawn_blocking`.
pub fn extract_text(filename: Option<&str>, bytes: &[u8]) -> Result<String, ExtractError> {
    let text = if is_pdf(filename, bytes) {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?
    } else {
        std::str::from_utf8(bytes)
            .map_err(|_| ExtractError::NotText)?
            .to_string()
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}
