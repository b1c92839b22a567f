//! Text extraction per file type.
//!
//! `.txt` is decoded as text; `.pdf` goes through `pdf_extract`; `.doc` and
//! `.docx` are only accepted when they are already plain text (an export or
//! a renamed `.txt`), since no Word parser is bundled.
//!
//! All decoding is lossy: invalid UTF-8 becomes U+FFFD, so malformed input
//! never fails an applicant on its own.

use thiserror::Error;

/// PDF extraction shorter than this is treated as a failed extraction
/// (typically a scanned image with no text layer).
pub const MIN_EXTRACTED_TEXT_BYTES: usize = 50;

const BINARY_SAMPLE_BYTES: usize = 1_000;
const BINARY_CONTROL_RATIO: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: .{0}")]
    Unsupported(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("extracted text is too short ({0} bytes), likely a scanned or empty document")]
    TooShort(usize),

    #[error(".{0} file is binary; convert it to PDF or TXT")]
    Binary(String),
}

/// Extracts text from `bytes` according to `extension` (lowercase, no dot).
///
/// CPU-bound for PDFs; call through `spawn_blocking` from async code.
pub fn extract_text(extension: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    match extension {
        "txt" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "pdf" => extract_pdf(bytes),
        "doc" | "docx" => {
            if is_binary(bytes) {
                Err(ExtractError::Binary(extension.to_string()))
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    if text.len() < MIN_EXTRACTED_TEXT_BYTES {
        return Err(ExtractError::TooShort(text.len()));
    }
    Ok(text)
}

/// PDF/ZIP magic, or more than 30% control bytes in the first 1000 bytes.
pub fn is_binary(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.starts_with(b"%PDF-") || bytes.starts_with(b"PK") {
        return true;
    }

    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_BYTES)];
    let control = sample
        .iter()
        .filter(|&&b| b < 32 && !matches!(b, b'\n' | b'\r' | b'\t'))
        .count();

    control as f64 / sample.len() as f64 > BINARY_CONTROL_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt_is_decoded_lossily() {
        let text = extract_text("txt", b"caf\xc3\xa9 \xff end").unwrap();
        assert_eq!(text, "café \u{FFFD} end");
    }

    #[test]
    fn test_plain_text_docx_is_accepted() {
        let text = extract_text("docx", b"Experienced engineer\nSkills: Rust").unwrap();
        assert!(text.starts_with("Experienced engineer"));
    }

    #[test]
    fn test_zip_docx_is_rejected() {
        let err = extract_text("docx", b"PK\x03\x04word/document.xml").unwrap_err();
        assert!(matches!(err, ExtractError::Binary(ref ext) if ext == "docx"));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(extract_text("png", b"x"), Err(ExtractError::Unsupported(_))));
    }

    #[test]
    fn test_binary_detection() {
        assert!(is_binary(b"%PDF-1.7"));
        assert!(is_binary(b"PK\x03\x04"));
        assert!(is_binary(&[0u8, 1, 2, 3, 4, 5, b'a', b'b']));
        assert!(!is_binary(b"Line one\r\n\tLine two\n"));
        assert!(!is_binary(b""));
    }
}
