//! Text extraction for the supported document formats.
//!
//! | extension | decoding                                                   |
//! |-----------|------------------------------------------------------------|
//! | `.txt`    | UTF-8, falling back to Latin-1                             |
//! | `.pdf`    | text of every page, in page order                          |
//! | `.csv`    | strict UTF-8; fields joined by `", "`, rows by newlines    |
//!
//! Extension matching is case-insensitive. Anything else is rejected with
//! [`ExtractError::Unsupported`].

use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Pdf,
    Csv,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_path(Path::new(name))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Skipped unsupported file type: {name}. Only .txt, .pdf, and .csv are supported.")]
    Unsupported { name: String },

    #[error("Error reading PDF {name}: {message}")]
    Pdf { name: String, message: String },

    #[error("Error reading CSV {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },

    #[error("Error reading {name}: not valid UTF-8: {source}")]
    Utf8 {
        name: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Decode a document according to its file extension.
pub fn extract_text(file_name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    match DocumentKind::from_name(file_name) {
        Some(DocumentKind::Text) => Ok(decode_text(bytes)),
        Some(DocumentKind::Pdf) => extract_pdf(file_name, bytes),
        Some(DocumentKind::Csv) => extract_csv(file_name, bytes),
        None => Err(ExtractError::Unsupported {
            name: file_name.to_string(),
        }),
    }
}

/// Like [`extract_text`], but failures are logged and skipped.
pub fn process_file_content(file_name: &str, bytes: &[u8]) -> Option<String> {
    match extract_text(file_name, bytes) {
        Ok(text) => Some(text),
        Err(e @ ExtractError::Unsupported { .. }) => {
            tracing::warn!("{e}");
            None
        }
        Err(e) => {
            tracing::error!("{e}");
            None
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // Latin-1 maps every byte to the code point of the same value
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn extract_pdf(file_name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs
    let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf {
            name: file_name.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(ExtractError::Pdf {
            name: file_name.to_string(),
            message: "malformed document".to_string(),
        }),
    }
}

fn extract_csv(file_name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|source| ExtractError::Utf8 {
        name: file_name.to_string(),
        source,
    })?;

    let mut rows = Vec::new();
    for line in split_csv_records(text) {
        if line.is_empty() {
            rows.push(String::new());
            continue;
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        for record in reader.records() {
            let record = record.map_err(|source| ExtractError::Csv {
                name: file_name.to_string(),
                source,
            })?;
            rows.push(record.iter().collect::<Vec<_>>().join(", "));
        }
    }
    Ok(rows.join("\n"))
}

/// Cut CSV text at record terminators (`\r\n`, `\n` or `\r`) outside quoted
/// fields. Blank lines come back as empty slices; the csv reader itself would
/// drop them.
fn split_csv_records(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut records = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut field_start = true;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_quotes {
            if b == b'"' {
                if bytes.get(i + 1) == Some(&b'"') {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            }
        } else if b == b'\r' || b == b'\n' {
            records.push(&text[start..i]);
            if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
            start = i + 1;
            field_start = true;
            i += 1;
            continue;
        } else {
            // A quote opens a quoted field only at the start of the field
            if b == b'"' && field_start {
                in_quotes = true;
            }
            field_start = b == b',';
        }
        i += 1;
    }
    if start < bytes.len() {
        records.push(&text[start..]);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_document_kind() {
        assert_eq!(DocumentKind::from_name("a.txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_name("A.TXT"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_name("x.Pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_name("t.csv"), Some(DocumentKind::Csv));
        assert_eq!(DocumentKind::from_name("t.docx"), None);
        assert_eq!(DocumentKind::from_name("csv"), None);
        assert_eq!(DocumentKind::Pdf.extension(), "pdf");
        assert!(is_supported(Path::new("dir/file.csv")));
    }

    #[test]
    fn test_text_utf8_and_latin1_fallback() {
        assert_eq!(extract_text("a.txt", "héllo".as_bytes()).unwrap(), "héllo");
        // 0xE9 alone is invalid UTF-8 and Latin-1 for 'é'
        assert_eq!(extract_text("a.txt", b"caf\xe9").unwrap(), "café");
        assert_eq!(extract_text("a.txt", b"").unwrap(), "");
    }

    #[test]
    fn test_csv_rows_and_fields() {
        let csv = b"name,role\nAda,engineer\n\"Smith, J\",\"x\"\nsolo\n";
        let text = extract_text("people.csv", csv).unwrap();
        assert_eq!(text, "name, role\nAda, engineer\nSmith, J, x\nsolo");
    }

    #[test]
    fn test_csv_keeps_blank_lines() {
        assert_eq!(extract_text("t.csv", b"a,b\n\nc,d\n").unwrap(), "a, b\n\nc, d");
        assert_eq!(extract_text("t.csv", b"a,b\r\n\r\nc,d").unwrap(), "a, b\n\nc, d");
        assert_eq!(extract_text("t.csv", b"a\n\n").unwrap(), "a\n");
        // Line breaks inside quotes belong to the field
        assert_eq!(
            extract_text("t.csv", b"\"line\n\nbreak\",x\n\ny,5\" screen\n").unwrap(),
            "line\n\nbreak, x\n\ny, 5\" screen"
        );
    }

    #[test]
    fn test_csv_requires_utf8() {
        let err = extract_text("bad.csv", b"a,\xff\n").unwrap_err();
        assert!(matches!(err, ExtractError::Utf8 { .. }));
    }

    #[test]
    fn test_pdf_garbage_is_an_error() {
        let err = extract_text("broken.pdf", b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf { .. }));
    }

    #[test]
    fn test_unsupported_message() {
        let err = extract_text("slides.pptx", b"...").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Skipped unsupported file type: slides.pptx. Only .txt, .pdf, and .csv are supported."
        );
    }

    #[traced_test]
    #[test]
    fn test_process_file_content_logs_and_skips() {
        assert_eq!(process_file_content("image.png", b"\x89PNG"), None);
        assert!(logs_contain("Skipped unsupported file type: image.png"));
        assert_eq!(
            process_file_content("notes.txt", b"hello"),
            Some("hello".to_string())
        );
    }
}
