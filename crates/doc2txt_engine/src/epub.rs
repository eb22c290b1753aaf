use std::io::{Read, Seek};
use std::path::Path;

use doc2txt_core::{ExtractionWarning, WarningKind};
use engine_logging::{engine_debug, engine_warn};

use crate::dispatch::{Extraction, FormatHandler};
use crate::extract::{join_parts, Extractor, MarkupTextExtractor};
use crate::manifest::ContainerArchive;
use crate::ConvertError;

/// Converts zip-based e-book containers (EPUB) to text in reading order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveHandler {
    extractor: MarkupTextExtractor,
}

impl FormatHandler for ArchiveHandler {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ConvertError> {
        let container = ContainerArchive::open(path)?;
        convert_container(container, &self.extractor)
    }
}

/// Extracts every part in reading order. Missing and unreadable parts are
/// skipped; only container-level problems are errors.
pub fn convert_container<R: Read + Seek>(
    mut container: ContainerArchive<R>,
    extractor: &dyn Extractor,
) -> Result<Extraction, ConvertError> {
    let package = container.resolve()?;
    engine_debug!(
        "descriptor {} lists {} part(s) in reading order",
        package.descriptor_path,
        package.order.len()
    );

    let mut warnings = package.warnings.clone();
    let mut texts = Vec::with_capacity(package.order.len());
    for part in package.parts() {
        if !container.contains(&part.path) {
            engine_warn!("referenced part '{}' (id {}) not found", part.path, part.id);
            warnings.push(ExtractionWarning::new(
                WarningKind::MissingReference,
                part.path,
                "referenced part not found in container",
            ));
            continue;
        }
        let bytes = match container.read_entry(&part.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                engine_debug!("skipping unreadable part '{}': {err}", part.path);
                continue;
            }
        };
        match extractor.extract(&part.path, &bytes) {
            Ok(part_text) => {
                warnings.extend(part_text.warnings);
                texts.push(part_text.text);
            }
            Err(err) => engine_debug!("skipping part '{}': {err}", part.path),
        }
    }

    Ok(Extraction {
        text: join_parts(texts),
        warnings,
    })
}
