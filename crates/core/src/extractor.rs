use crate::error::IngestError;
use crate::models::DocumentSegment;
use lopdf::Document;
use std::path::{Path, PathBuf};

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<DocumentSegment>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<DocumentSegment>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let source_path = path.to_string_lossy().to_string();

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(DocumentSegment {
                    source_path: source_path.clone(),
                    page: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::NoText(path.display().to_string()));
        }

        Ok(pages)
    }
}

/// Loads every page of the PDF at `path`, in page order, off the async runtime.
pub async fn load_document(path: &Path) -> Result<Vec<DocumentSegment>, IngestError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || LopdfExtractor.extract_pages(&path)).await?
}
