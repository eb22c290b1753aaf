use std::io;

use doc2txt_core::{ConversionError, ErrorKind};
use thiserror::Error;

use crate::persist::PersistError;

/// Failure of one file's conversion. Caught at the task runner boundary.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("source is encrypted: {0}")]
    EncryptedSource(String),
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("no extractable text, possibly a scanned or image-only source")]
    EmptyExtraction,
    #[error("external tool not found: {0}")]
    MissingExternalTool(String),
    #[error("external tool failed: {0}")]
    ExternalToolFailure(String),
    #[error("source appears to be DRM protected; the external tool cannot convert it")]
    DrmProtected,
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("{0}")]
    Unclassified(String),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::EncryptedSource(_) => ErrorKind::EncryptedSource,
            ConvertError::MalformedArchive(_) | ConvertError::Zip(_) => ErrorKind::MalformedArchive,
            ConvertError::EmptyExtraction => ErrorKind::EmptyExtraction,
            ConvertError::MissingExternalTool(_) => ErrorKind::MissingExternalTool,
            ConvertError::ExternalToolFailure(_) => ErrorKind::ExternalToolFailure,
            ConvertError::DrmProtected => ErrorKind::DrmProtected,
            ConvertError::Io(_) | ConvertError::Persist(_) | ConvertError::Unclassified(_) => {
                ErrorKind::Unclassified
            }
        }
    }

    pub fn to_conversion_error(&self) -> ConversionError {
        ConversionError::new(self.kind(), self.to_string())
    }
}
