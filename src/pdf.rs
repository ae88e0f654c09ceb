use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::types::PdfParse;

const METADATA_TAGS: [(PdfDocumentMetadataTagType, &str); 8] = [
    (PdfDocumentMetadataTagType::Title, "title"),
    (PdfDocumentMetadataTagType::Author, "author"),
    (PdfDocumentMetadataTagType::Subject, "subject"),
    (PdfDocumentMetadataTagType::Keywords, "keywords"),
    (PdfDocumentMetadataTagType::Creator, "creator"),
    (PdfDocumentMetadataTagType::Producer, "producer"),
    (PdfDocumentMetadataTagType::CreationDate, "creation_date"),
    (PdfDocumentMetadataTagType::ModificationDate, "modification_date"),
];

/// Page text and metadata from a PDF file.
pub trait PdfSource {
    fn read(&self, path: &Path, max_pages: Option<usize>) -> Result<PdfParse, ToolError>;
}

/// Text extraction through the pdfium library. pdfium is loaded once at
/// startup; when it cannot be found every read fails softly.
pub struct PdfiumSource {
    pdfium: Option<Pdfium>,
}

impl PdfiumSource {
    pub fn load(pdfium_path: Option<&str>) -> Self {
        match bind_pdfium(pdfium_path) {
            Ok(pdfium) => PdfiumSource {
                pdfium: Some(pdfium),
            },
            Err(e) => {
                warn!("PDF support disabled: {e:#}");
                PdfiumSource { pdfium: None }
            }
        }
    }
}

fn bind_pdfium(pdfium_path: Option<&str>) -> Result<Pdfium> {
    let bindings = if let Some(path) = pdfium_path {
        Pdfium::bind_to_library(path)
            .with_context(|| format!("Failed to load pdfium from: {path}"))?
    } else {
        Pdfium::bind_to_system_library()
            .context("Failed to find pdfium. Install pdfium-binaries or set PDFIUM_LIB_PATH")?
    };
    Ok(Pdfium::new(bindings))
}

impl PdfSource for PdfiumSource {
    fn read(&self, path: &Path, max_pages: Option<usize>) -> Result<PdfParse, ToolError> {
        let pdfium = self.pdfium.as_ref().ok_or(ToolError::PdfUnavailable)?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| ToolError::Pdf(format!("failed to load {}: {e}", path.display())))?;

        let page_count = document.pages().len() as usize;
        let limit = max_pages.map_or(page_count, |m| m.min(page_count));
        let mut pages = Vec::with_capacity(limit);
        for (idx, page) in document.pages().iter().take(limit).enumerate() {
            let text = page.text().map_err(|e| {
                ToolError::Pdf(format!("failed to read text of page {}: {e}", idx + 1))
            })?;
            pages.push(text.all());
        }
        debug!(path = %path.display(), page_count, parsed = pages.len(), "extracted PDF text");

        let metadata = read_metadata(&document);
        let title = metadata
            .get("title")
            .cloned()
            .unwrap_or_else(|| file_title(path));
        Ok(assemble(title, metadata, page_count, pages))
    }
}

fn read_metadata(document: &PdfDocument) -> BTreeMap<String, String> {
    let metadata = document.metadata();
    METADATA_TAGS
        .iter()
        .filter_map(|(tag, name)| {
            let value = metadata.get(*tag)?.value().trim().to_string();
            (!value.is_empty()).then(|| (name.to_string(), value))
        })
        .collect()
}

/// Fallback title: the file stem.
pub fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join page texts into a `PdfParse`.
pub fn assemble(
    title: String,
    metadata: BTreeMap<String, String>,
    page_count: usize,
    pages: Vec<String>,
) -> PdfParse {
    let parsed_pages = pages.len().min(page_count);
    PdfParse {
        title,
        text: pages.join("\n"),
        metadata,
        page_count,
        parsed_pages,
        error: None,
    }
}
