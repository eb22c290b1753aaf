use std::path::Path;

use engine_logging::engine_debug;

use crate::dispatch::{Extraction, FormatHandler};
use crate::ConvertError;

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfHandler;

impl FormatHandler for PdfHandler {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ConvertError> {
        let document = lopdf::Document::load(path)
            .map_err(|err| ConvertError::Unclassified(format!("unreadable PDF: {err}")))?;
        if document.is_encrypted() {
            return Err(ConvertError::EncryptedSource("PDF is encrypted".into()));
        }
        engine_debug!("{}: {} page(s)", path.display(), document.get_pages().len());
        let text = pdf_extract::extract_text(path).map_err(|err| {
            ConvertError::Unclassified(format!("PDF text extraction failed: {err}"))
        })?;
        Ok(Extraction {
            text,
            warnings: Vec::new(),
        })
    }
}
