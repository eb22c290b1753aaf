use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One regular file found under the input root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    /// Lower-cased, without the leading dot. Empty when the file has none.
    pub extension: String,
}

impl SourceFile {
    pub fn new(path: PathBuf, relative_path: PathBuf, size: u64) -> Self {
        let extension = extension_of(&path);
        Self {
            path,
            relative_path,
            size,
            extension,
        }
    }
}

/// `".EPUB"`, `"epub"` and `" Epub "` all normalize to `"epub"`.
pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_extension(&ext.to_string_lossy()))
        .unwrap_or_default()
}
