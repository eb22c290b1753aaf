use std::fs;
use std::path::Path;

use doc2txt_engine::{
    ensure_output_dir, mirrored_path, prepare_output_root, text_relative_path, AtomicFileWriter,
    PersistError,
};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn existing_output_root_is_refused_without_clean() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("out");
    fs::create_dir_all(root.join("old")).unwrap();
    fs::write(root.join("old/stale.txt"), "stale").unwrap();

    let err = prepare_output_root(&root, false).unwrap_err();
    assert!(matches!(err, PersistError::OutputExists(ref p) if p == &root));
    assert!(root.join("old/stale.txt").exists());

    prepare_output_root(&root, true).unwrap();
    assert!(root.is_dir());
    assert!(!root.join("old").exists());
}

#[test]
fn text_replaces_the_source_extension() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer
        .write_text(Path::new("shelf/a/Book.epub"), "hello")
        .unwrap();
    assert_eq!(first, temp.path().join("shelf/a/Book.txt"));
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    // Replace existing
    let second = writer
        .write_text(Path::new("shelf/a/Book.epub"), "world")
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");

    // No temp files left behind.
    let leftovers: Vec<_> = fs::read_dir(temp.path().join("shelf/a"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn text_names_follow_the_source_stem() {
    assert_eq!(text_relative_path(Path::new("a/Novel.EPUB")), Path::new("a/Novel.txt"));
    assert_eq!(text_relative_path(Path::new("notes")), Path::new("notes.txt"));
    assert_eq!(
        text_relative_path(Path::new("v1.2/report.final.pdf")),
        Path::new("v1.2/report.final.txt")
    );
}

#[test]
fn same_stem_sources_share_one_text_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    let epub = writer.write_text(Path::new("book.epub"), "from epub").unwrap();
    let pdf = writer.write_text(Path::new("book.pdf"), "from pdf").unwrap();
    assert_eq!(epub, pdf);
    assert_eq!(fs::read_to_string(pdf).unwrap(), "from pdf");
}

#[test]
fn verbatim_copy_keeps_bytes_and_mtime() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("cover.jpg");
    let payload: Vec<u8> = (0u8..=255).collect();
    fs::write(&source, &payload).unwrap();
    let out = temp.path().join("out");
    let writer = AtomicFileWriter::new(out.clone());

    let (target, bytes) = writer
        .copy_verbatim(&source, Path::new("img/cover.jpg"))
        .unwrap();
    assert_eq!(target, out.join("img/cover.jpg"));
    assert_eq!(bytes, 256);
    assert_eq!(fs::read(&target).unwrap(), payload);
    assert_eq!(
        fs::metadata(&target).unwrap().modified().unwrap(),
        fs::metadata(&source).unwrap().modified().unwrap()
    );
}

#[test]
fn escaping_relative_paths_are_rejected() {
    let root = Path::new("/tmp/out");
    assert!(matches!(
        mirrored_path(root, Path::new("../etc/passwd")),
        Err(PersistError::Escape(_))
    ));
    assert!(matches!(
        mirrored_path(root, Path::new("/etc/passwd")),
        Err(PersistError::Escape(_))
    ));
    assert_eq!(
        mirrored_path(root, Path::new("./a/b.txt")).unwrap(),
        root.join("a/b.txt")
    );
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write_text(Path::new("doc"), "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("doc.txt").exists());
}
