//! Per-page text extraction using PDFium

use crate::error::SearchError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// Produces the text of each page of a document, page 1 first.
///
/// Implementations are blocking; callers run them on a blocking thread.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, SearchError>;
}

/// PDFium-backed extractor.
///
/// PDFium is bound per call; a bound instance is not shared across threads.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    library_dirs: Vec<PathBuf>,
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self {
            library_dirs: vec![PathBuf::from("./"), PathBuf::from("/opt/pdfium/lib")],
        }
    }
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories searched for the PDFium shared library before the system path.
    pub fn with_library_dirs(library_dirs: Vec<PathBuf>) -> Self {
        Self { library_dirs }
    }

    fn bind(&self) -> Result<Pdfium, SearchError> {
        let mut last_error = None;
        for dir in &self.library_dirs {
            match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = Some(e),
            }
        }

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| SearchError::Pdfium {
                reason: format!(
                    "Failed to initialize PDFium: {} (last library dir error: {:?})",
                    e, last_error
                ),
            })
    }

    fn map_pdfium_error(err: PdfiumError) -> SearchError {
        match err {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                SearchError::InvalidPdf {
                    reason: "PDF is password protected".to_string(),
                }
            }
            _ => SearchError::Pdfium {
                reason: format!("{}", err),
            },
        }
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, SearchError> {
        let data = std::fs::read(path)?;

        if !data.starts_with(b"%PDF") {
            return Err(SearchError::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&data, None)
            .map_err(Self::map_pdfium_error)?;

        let mut pages = Vec::with_capacity(document.pages().len() as usize);
        for (index, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| SearchError::ExtractionFailed {
                file: path.display().to_string(),
                reason: format!("page {}: {}", index + 1, e),
            })?;
            pages.push(text.all());
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rejects_non_pdf_before_binding() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Hello World, definitely not a PDF").unwrap();

        let extractor = PdfiumExtractor::with_library_dirs(vec![]);
        let result = extractor.extract_pages(file.path());
        assert!(matches!(result, Err(SearchError::InvalidPdf { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let extractor = PdfiumExtractor::new();
        let result = extractor.extract_pages(Path::new("/nonexistent/path/file.pdf"));
        assert!(matches!(result, Err(SearchError::Io(_))));
    }
}
