#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Once;

use doc2txt_core::SourceFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Builds a stored zip from `(name, bytes)` pairs in the given order.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Sets the "encrypted" general purpose flag on every entry.
pub fn mark_encrypted(mut bytes: Vec<u8>) -> Vec<u8> {
    let mut i = 0;
    while i + 4 <= bytes.len() {
        match &bytes[i..i + 4] {
            [0x50, 0x4b, 0x03, 0x04] => bytes[i + 6] |= 1,
            [0x50, 0x4b, 0x01, 0x02] => bytes[i + 8] |= 1,
            _ => {}
        }
        i += 1;
    }
    bytes
}

pub fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{title}</title></head>
<body><h1>{title}</h1><p>{body}</p></body></html>"#
    )
}

/// Package descriptor declaring `manifest` as (id, href) and the given spine.
pub fn opf(manifest: &[(&str, &str)], spine: &[&str]) -> String {
    let items: String = manifest
        .iter()
        .map(|(id, href)| {
            format!(r#"<item id="{id}" href="{href}" media-type="application/xhtml+xml"/>"#)
        })
        .collect();
    let refs: String = spine
        .iter()
        .map(|id| format!(r#"<itemref idref="{id}"/>"#))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
<manifest>{items}</manifest><spine>{refs}</spine></package>"#
    )
}

/// Three chapters under `OEBPS/Text`, read in `spine` order.
pub fn three_chapter_epub(spine: &[&str]) -> Vec<u8> {
    let descriptor = opf(
        &[
            ("c1", "Text/one.xhtml"),
            ("c2", "Text/two.xhtml"),
            ("c3", "Text/three.xhtml"),
        ],
        spine,
    );
    let one = chapter("One", "first");
    let two = chapter("Two", "second");
    let three = chapter("Three", "third");
    zip_bytes(&[
        ("mimetype", b"application/epub+zip"),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", descriptor.as_bytes()),
        ("OEBPS/Text/one.xhtml", one.as_bytes()),
        ("OEBPS/Text/two.xhtml", two.as_bytes()),
        ("OEBPS/Text/three.xhtml", three.as_bytes()),
    ])
}

/// Minimal WordprocessingML package.
pub fn docx_bytes(document_body: &str, header: Option<&str>) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{document_body}</w:body></w:document>"#
    );
    let mut entries: Vec<(&str, Vec<u8>)> = vec![
        ("[Content_Types].xml", b"<Types/>".to_vec()),
        ("word/document.xml", document.into_bytes()),
    ];
    if let Some(text) = header {
        entries.push((
            "word/header1.xml",
            format!(
                r#"<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:hdr>"#
            )
            .into_bytes(),
        ));
    }
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, bytes)| (*name, bytes.as_slice()))
        .collect();
    zip_bytes(&borrowed)
}

pub fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

/// Writes `bytes` to `root/relative` and describes it as a source file.
pub fn source_file(root: &Path, relative: &str, bytes: &[u8]) -> SourceFile {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    SourceFile::new(path, PathBuf::from(relative), bytes.len() as u64)
}
