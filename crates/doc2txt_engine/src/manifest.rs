//! Archive manifest resolution for zip-based e-book containers.
//!
//! A container is opened, checked for encryption, its package descriptor is
//! located through `META-INF/container.xml` (or by scanning for an `.opf`
//! entry) and the descriptor is reduced to a plain list of manifest entries
//! plus the declared spine. [`reading_order`] turns those into the order in
//! which content parts are concatenated.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use doc2txt_core::{ExtractionWarning, WarningKind};
use engine_logging::engine_debug;
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;
use zip::ZipArchive;

use crate::ConvertError;

/// Bootstrap file pointing at the package descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
const DESCRIPTOR_SUFFIX: &str = ".opf";
const PACKAGE_BASE: &str = "http://package.invalid/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub href: String,
}

/// Parsed package descriptor: manifest in declaration order plus the spine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageDescriptor {
    pub manifest: Vec<ManifestEntry>,
    pub spine: Vec<String>,
}

impl PackageDescriptor {
    /// Storage path declared for `id`. The last declaration wins.
    pub fn href_of(&self, id: &str) -> Option<&str> {
        self.manifest
            .iter()
            .rev()
            .find(|entry| entry.id == id)
            .map(|entry| entry.href.as_str())
    }
}

/// Identifiers in reading order; every one of them is declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadingOrder(Vec<String>);

impl ReadingOrder {
    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keeps the declared spine order, dropping identifiers the manifest does not
/// know (each one becomes a warning).
pub fn reading_order(descriptor: &PackageDescriptor) -> (ReadingOrder, Vec<ExtractionWarning>) {
    let mut ids = Vec::with_capacity(descriptor.spine.len());
    let mut warnings = Vec::new();
    for idref in &descriptor.spine {
        if descriptor.href_of(idref).is_some() {
            ids.push(idref.clone());
        } else {
            warnings.push(ExtractionWarning::new(
                WarningKind::UnknownIdentifier,
                idref.clone(),
                format!("reading order references undeclared identifier '{idref}'"),
            ));
        }
    }
    (ReadingOrder(ids), warnings)
}

/// One content part to extract, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    pub id: String,
    /// Container entry name after resolution and percent-decoding.
    pub path: String,
}

/// Everything the archive handler needs from a container's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub descriptor_path: String,
    pub descriptor: PackageDescriptor,
    pub order: ReadingOrder,
    pub warnings: Vec<ExtractionWarning>,
}

impl ResolvedPackage {
    pub fn parts(&self) -> Vec<ContentPart> {
        self.order
            .ids()
            .iter()
            .filter_map(|id| {
                let href = self.descriptor.href_of(id)?;
                Some(ContentPart {
                    id: id.clone(),
                    path: resolve_part_path(&self.descriptor_path, href),
                })
            })
            .collect()
    }
}

/// Resolves `href` against the descriptor's directory, normalizing dot
/// segments, dropping any fragment and percent-decoding the result.
pub fn resolve_part_path(descriptor_path: &str, href: &str) -> String {
    let joined = Url::parse(PACKAGE_BASE)
        .and_then(|base| base.join(descriptor_path))
        .and_then(|descriptor| descriptor.join(href));
    match joined {
        Ok(url) if url.host_str() == Some("package.invalid") => {
            decode(url.path().trim_start_matches('/'))
        }
        _ => {
            let dir = descriptor_path
                .rsplit_once('/')
                .map(|(dir, _)| dir)
                .unwrap_or("");
            let href = href.split('#').next().unwrap_or(href);
            if dir.is_empty() {
                decode(href)
            } else {
                decode(&format!("{dir}/{href}"))
            }
        }
    }
}

fn decode(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// An opened, unencrypted container.
pub struct ContainerArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    names: Vec<String>,
}

impl ContainerArchive<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ConvertError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerArchive<R> {
    /// Opens the zip and rejects it if any entry carries the encryption flag.
    pub fn from_reader(reader: R) -> Result<Self, ConvertError> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|err| ConvertError::MalformedArchive(format!("not a zip container: {err}")))?;
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.encrypted() {
                return Err(ConvertError::EncryptedSource(format!(
                    "entry '{}' is encrypted",
                    entry.name()
                )));
            }
        }
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self { archive, names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ConvertError> {
        let mut entry = self.archive.by_name(name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Path of the package descriptor: the bootstrap file's `rootfile`, else
    /// the first entry ending in `.opf`.
    pub fn locate_descriptor(&mut self) -> Result<String, ConvertError> {
        match self.read_entry(CONTAINER_PATH) {
            Ok(bytes) => match rootfile_path(&bytes) {
                Some(path) if self.contains(&path) => return Ok(path),
                Some(path) => engine_debug!("rootfile '{path}' is not in the container"),
                None => engine_debug!("{CONTAINER_PATH} declares no usable rootfile"),
            },
            Err(err) => engine_debug!("cannot read {CONTAINER_PATH}: {err}"),
        }
        self.names
            .iter()
            .find(|name| name.to_lowercase().ends_with(DESCRIPTOR_SUFFIX))
            .cloned()
            .ok_or_else(|| {
                ConvertError::MalformedArchive("no package descriptor (.opf) found".into())
            })
    }

    pub fn resolve(&mut self) -> Result<ResolvedPackage, ConvertError> {
        let descriptor_path = self.locate_descriptor()?;
        let bytes = self.read_entry(&descriptor_path)?;
        let descriptor = parse_descriptor(&bytes).map_err(|err| {
            ConvertError::MalformedArchive(format!("{descriptor_path}: {err}"))
        })?;
        let (order, warnings) = reading_order(&descriptor);
        Ok(ResolvedPackage {
            descriptor_path,
            descriptor,
            order,
            warnings,
        })
    }
}

fn rootfile_path(container_xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(container_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                return attribute(&e, b"full-path").filter(|path| !path.is_empty());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Manifest,
    Spine,
}

/// Parses an OPF package document. Elements are matched by local name, so
/// both prefixed and default namespaces work.
pub fn parse_descriptor(bytes: &[u8]) -> Result<PackageDescriptor, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut section = Section::Other;
    let mut descriptor = PackageDescriptor::default();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            format!(
                "descriptor is not well-formed XML at byte {}: {err}",
                reader.buffer_position()
            )
        })?;
        match event {
            Event::Start(e) | Event::Empty(e) => match (section, e.local_name().as_ref()) {
                (_, b"manifest") => section = Section::Manifest,
                (_, b"spine") => section = Section::Spine,
                (Section::Manifest, b"item") => {
                    if let (Some(id), Some(href)) = (attribute(&e, b"id"), attribute(&e, b"href"))
                    {
                        descriptor.manifest.push(ManifestEntry { id, href });
                    }
                }
                (Section::Spine, b"itemref") => {
                    if let Some(idref) = attribute(&e, b"idref") {
                        descriptor.spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::End(e) => {
                if matches!(e.local_name().as_ref(), b"manifest" | b"spine") {
                    section = Section::Other;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(descriptor)
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::{parse_descriptor, reading_order, resolve_part_path, rootfile_path};
    use doc2txt_core::WarningKind;
    use pretty_assertions::assert_eq;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>
    <item id="c1" href="text/one.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/two.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="c2"/>
    <itemref idref="ghost"/>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    #[test]
    fn descriptor_keeps_declaration_and_spine_order() {
        let descriptor = parse_descriptor(OPF.as_bytes()).unwrap();
        let ids: Vec<_> = descriptor.manifest.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "css"]);
        assert_eq!(descriptor.spine, vec!["c2", "ghost", "c1"]);
    }

    #[test]
    fn unknown_spine_identifier_becomes_warning() {
        let descriptor = parse_descriptor(OPF.as_bytes()).unwrap();
        let (order, warnings) = reading_order(&descriptor);
        assert_eq!(order.ids(), &["c2".to_string(), "c1".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnknownIdentifier);
        assert_eq!(warnings[0].part, "ghost");
    }

    #[test]
    fn prefixed_namespace_is_accepted() {
        let opf = r#"<opf:package xmlns:opf="http://www.idpf.org/2007/opf">
            <opf:manifest><opf:item id="a" href="a.html"/></opf:manifest>
            <opf:spine><opf:itemref idref="a"/></opf:spine></opf:package>"#;
        let descriptor = parse_descriptor(opf.as_bytes()).unwrap();
        assert_eq!(descriptor.href_of("a"), Some("a.html"));
        assert_eq!(descriptor.spine, vec!["a"]);
    }

    #[test]
    fn broken_descriptor_is_an_error() {
        assert!(parse_descriptor(b"<package><manifest></spine></package>").is_err());
    }

    #[test]
    fn paths_resolve_relative_to_descriptor_and_decode() {
        assert_eq!(
            resolve_part_path("OEBPS/content.opf", "Text/chapter%201.xhtml"),
            "OEBPS/Text/chapter 1.xhtml"
        );
        assert_eq!(
            resolve_part_path("OEBPS/content.opf", "../Text/ch.xhtml#start"),
            "Text/ch.xhtml"
        );
        assert_eq!(resolve_part_path("content.opf", "ch 1.xhtml"), "ch 1.xhtml");
        assert_eq!(
            resolve_part_path("OPS/package.opf", "kapitel-\u{e4}.xhtml"),
            "OPS/kapitel-\u{e4}.xhtml"
        );
    }

    #[test]
    fn rootfile_is_read_from_container_xml() {
        let xml = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(rootfile_path(xml).as_deref(), Some("OEBPS/content.opf"));
        assert_eq!(rootfile_path(b"<container><rootfiles/></container>"), None);
    }
}
