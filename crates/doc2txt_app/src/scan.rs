use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use doc2txt_core::{normalize_extension, SourceFile};
use engine_logging::{engine_debug, engine_warn};
use walkdir::WalkDir;

/// Extension filters from the command line, normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ScanFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        let normalize = |list: &[String]| {
            list.iter()
                .map(|raw| normalize_extension(raw))
                .filter(|ext| !ext.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            include: normalize(include),
            exclude: normalize(exclude),
        }
    }

    /// An empty include list lets everything through; exclude always wins.
    pub fn allows(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        if self.exclude.contains(&extension) {
            return false;
        }
        self.include.is_empty() || self.include.contains(&extension)
    }
}

/// Regular files under `root` in sorted relative-path order. Directories in
/// `skip` (typically the output root and the log directory) are not entered.
pub fn scan(root: &Path, filter: &ScanFilter, skip: &[&Path]) -> Result<Vec<SourceFile>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot read input directory {}", root.display()))?;
    let skip: Vec<PathBuf> = skip
        .iter()
        .filter_map(|dir| dir.canonicalize().ok())
        .filter(|dir| dir != &root)
        .collect();

    let mut sources = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !skip.iter().any(|dir| entry.path() == dir));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                engine_warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let Ok(relative) = path.strip_prefix(&root).map(Path::to_path_buf) else {
            continue;
        };
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                engine_warn!("skipping {}: {err}", relative.display());
                continue;
            }
        };
        let source = SourceFile::new(path, relative, size);
        if !filter.allows(&source.extension) {
            engine_debug!("filtered out {}", source.relative_path.display());
            continue;
        }
        sources.push(source);
    }
    sources.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(sources)
}
