use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

/// Plain text of one page; `number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Produces ordered, 1-based page text for one PDF.
pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Reads the PDF text layer with `lopdf`.
///
/// Every page is returned, blank ones included, so page numbers in citations
/// match the document. A page whose content stream cannot be decoded is kept
/// as blank. The file is rejected only when it cannot be parsed or when no
/// page yields any text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        extract_page_texts(path)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let document = Document::load(path).map_err(|error| {
        IngestError::PdfParse(format!("{}: {error}", path.display()))
    })?;

    let pages: Vec<PageText> = document
        .get_pages()
        .into_keys()
        .map(|number| {
            let text = document.extract_text(&[number]).unwrap_or_else(|error| {
                warn!(path = %path.display(), page = number, error = %error, "page text unreadable");
                String::new()
            });
            PageText { number, text }
        })
        .collect();

    let readable = pages
        .iter()
        .filter(|page| !page.text.trim().is_empty())
        .count();
    if readable == 0 {
        return Err(IngestError::PdfParse(format!(
            "{}: no readable text in {} page(s)",
            path.display(),
            pages.len()
        )));
    }

    debug!(path = %path.display(), pages = pages.len(), readable, "extracted page text");
    Ok(pages)
}
