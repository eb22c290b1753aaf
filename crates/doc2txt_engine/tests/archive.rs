mod common;

use std::io::Cursor;

use common::{
    chapter, init_logging, mark_encrypted, opf, three_chapter_epub, zip_bytes, CONTAINER_XML,
};
use doc2txt_core::{ErrorKind, WarningKind};
use doc2txt_engine::{convert_container, ContainerArchive, ConvertError, MarkupTextExtractor};
use pretty_assertions::assert_eq;

fn convert(bytes: Vec<u8>) -> Result<doc2txt_engine::Extraction, ConvertError> {
    let archive = ContainerArchive::from_reader(Cursor::new(bytes))?;
    convert_container(archive, &MarkupTextExtractor)
}

#[test]
fn text_follows_the_declared_reading_order() {
    init_logging();
    let permutations: [[&str; 3]; 3] = [["c1", "c2", "c3"], ["c3", "c1", "c2"], ["c2", "c3", "c1"]];
    for spine in permutations {
        let extraction = convert(three_chapter_epub(&spine)).unwrap();
        let expected: Vec<String> = spine
            .iter()
            .map(|id| match *id {
                "c1" => "One\nfirst",
                "c2" => "Two\nsecond",
                _ => "Three\nthird",
            })
            .map(str::to_string)
            .collect();
        assert_eq!(extraction.text, expected.join("\n\n"));
        assert!(extraction.warnings.is_empty());
    }
}

#[test]
fn missing_part_is_skipped_with_one_warning() {
    init_logging();
    let descriptor = opf(
        &[("c1", "Text/one.xhtml"), ("c2", "Text/gone.xhtml")],
        &["c1", "c2"],
    );
    let one = chapter("One", "first");
    let bytes = zip_bytes(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", descriptor.as_bytes()),
        ("OEBPS/Text/one.xhtml", one.as_bytes()),
    ]);

    let extraction = convert(bytes).unwrap();
    assert_eq!(extraction.text, "One\nfirst");
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].kind, WarningKind::MissingReference);
    assert_eq!(extraction.warnings[0].part, "OEBPS/Text/gone.xhtml");
}

#[test]
fn encrypted_container_is_rejected() {
    init_logging();
    let bytes = mark_encrypted(three_chapter_epub(&["c1"]));
    let err = convert(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncryptedSource);
}

#[test]
fn descriptor_is_found_without_container_xml() {
    init_logging();
    let descriptor = opf(&[("a", "a.xhtml")], &["a"]);
    let body = chapter("Alone", "no bootstrap");
    let bytes = zip_bytes(&[
        ("book/Package.OPF", descriptor.as_bytes()),
        ("book/a.xhtml", body.as_bytes()),
    ]);
    let extraction = convert(bytes).unwrap();
    assert_eq!(extraction.text, "Alone\nno bootstrap");
}

#[test]
fn container_without_descriptor_is_malformed() {
    init_logging();
    let bytes = zip_bytes(&[("readme.txt", b"hello")]);
    let err = convert(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[test]
fn non_zip_bytes_are_malformed() {
    init_logging();
    let err = ContainerArchive::from_reader(Cursor::new(b"%PDF-1.4 not a zip".to_vec()))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[test]
fn broken_part_uses_lenient_fallback() {
    init_logging();
    let descriptor = opf(&[("c1", "one.xhtml"), ("c2", "two.html")], &["c1", "c2"]);
    let one = chapter("One", "clean");
    let two = "<html><body><p>Tag soup<br><p>still &nbsp;text</body>";
    let bytes = zip_bytes(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", descriptor.as_bytes()),
        ("OEBPS/one.xhtml", one.as_bytes()),
        ("OEBPS/two.html", two.as_bytes()),
    ]);

    let extraction = convert(bytes).unwrap();
    assert_eq!(extraction.text, "One\nclean\n\nTag soup\nstill text");
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].kind, WarningKind::LenientFallback);
    assert_eq!(extraction.warnings[0].part, "OEBPS/two.html");
}

#[test]
fn unknown_spine_identifier_is_reported_and_skipped() {
    init_logging();
    let bytes = three_chapter_epub(&["c1", "nope", "c3"]);
    let extraction = convert(bytes).unwrap();
    assert_eq!(extraction.text, "One\nfirst\n\nThree\nthird");
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].kind, WarningKind::UnknownIdentifier);
}

#[test]
fn percent_encoded_hrefs_match_entries() {
    init_logging();
    let descriptor = opf(&[("c1", "Text/chapter%201.xhtml")], &["c1"]);
    let body = chapter("Spaced", "name");
    let bytes = zip_bytes(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", descriptor.as_bytes()),
        ("OEBPS/Text/chapter 1.xhtml", body.as_bytes()),
    ]);
    let extraction = convert(bytes).unwrap();
    assert_eq!(extraction.text, "Spaced\nname");
    assert!(extraction.warnings.is_empty());
}
