use lopdf::Document as LoDocument;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEmptyOrNoPages,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

/// What a produced PDF looks like from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub title: Option<String>,
    /// Decoded content stream of each page, in page order.
    pub page_contents: Vec<String>,
}

impl PdfInspectReport {
    /// True when the literal string `(text) Tj` is drawn on `page_number` (1-based).
    /// Only meaningful for plain ASCII text without PDF escapes.
    pub fn page_shows_text(&self, page_number: usize, text: &str) -> bool {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.page_contents.get(idx))
            .is_some_and(|content| content.contains(&format!("({}) Tj", text)))
    }
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEmptyOrNoPages,
            message: "pdf has no pages".to_string(),
        });
    }
    let mut page_contents = Vec::with_capacity(pages.len());
    for page_id in pages.values() {
        let content = pdf.get_page_content(*page_id).map_err(|err| PdfInspectError {
            code: PdfInspectErrorCode::PdfParseFailed,
            message: err.to_string(),
        })?;
        page_contents.push(String::from_utf8_lossy(&content).into_owned());
    }

    let title = pdf
        .trailer
        .get(b"Info")
        .and_then(|info| info.as_reference())
        .and_then(|id| pdf.get_dictionary(id))
        .and_then(|info| info.get(b"Title"))
        .and_then(|title| title.as_str())
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .ok();

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        title,
        page_contents,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}
