use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use engine_logging::{engine_info, engine_warn};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extension given to converted files in place of the source extension.
pub const TEXT_EXTENSION: &str = "txt";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("output directory {0} already exists; pass --clean-output to replace it")]
    OutputExists(PathBuf),
    #[error("relative path {0} escapes the output root")]
    Escape(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Creates the output root. An existing root is refused unless `clean` is
/// set, in which case it is removed first.
pub fn prepare_output_root(root: &Path, clean: bool) -> Result<(), PersistError> {
    if root.exists() {
        if !clean {
            return Err(PersistError::OutputExists(root.to_path_buf()));
        }
        engine_info!("removing previous output directory {}", root.display());
        if root.is_dir() {
            fs::remove_dir_all(root).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        } else {
            fs::remove_file(root).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        }
    }
    ensure_output_dir(root)
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// `root/relative`, refusing absolute paths and `..` components.
pub fn mirrored_path(root: &Path, relative: &Path) -> Result<PathBuf, PersistError> {
    let mut target = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => return Err(PersistError::Escape(relative.to_path_buf())),
        }
    }
    if target.as_path() == root {
        return Err(PersistError::Escape(relative.to_path_buf()));
    }
    Ok(target)
}

/// `relative` with its extension replaced by [`TEXT_EXTENSION`].
pub fn text_relative_path(relative: &Path) -> PathBuf {
    relative.with_extension(TEXT_EXTENSION)
}

/// Writes below an output root through a temp file in the destination
/// directory, renamed into place once complete.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    root: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Writes `content` to `root/relative` with a `.txt` extension.
    pub fn write_text(&self, relative: &Path, content: &str) -> Result<PathBuf, PersistError> {
        let target = mirrored_path(&self.root, &text_relative_path(relative))?;
        let mut tmp = self.temp_beside(&target)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        persist(tmp, &target)?;
        Ok(target)
    }

    /// Copies `source` byte for byte to `root/relative`, keeping its
    /// permissions and modification time where the platform allows.
    pub fn copy_verbatim(
        &self,
        source: &Path,
        relative: &Path,
    ) -> Result<(PathBuf, u64), PersistError> {
        let target = mirrored_path(&self.root, relative)?;
        let mut tmp = self.temp_beside(&target)?;
        let mut input = File::open(source)?;
        let bytes = io::copy(&mut input, tmp.as_file_mut())?;
        tmp.as_file_mut().sync_all()?;

        let meta = input.metadata()?;
        if let Ok(modified) = meta.modified() {
            tmp.as_file().set_modified(modified)?;
        }
        fs::set_permissions(tmp.path(), meta.permissions())?;
        persist(tmp, &target)?;
        Ok((target, bytes))
    }

    fn temp_beside(&self, target: &Path) -> Result<NamedTempFile, PersistError> {
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        Ok(NamedTempFile::new_in(dir)?)
    }
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), PersistError> {
    // Sources that differ only in extension share one text file; last one wins.
    if target.exists() {
        engine_warn!("{} already exists and is replaced", target.display());
        fs::remove_file(target)?;
    }
    tmp.persist(target).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}
