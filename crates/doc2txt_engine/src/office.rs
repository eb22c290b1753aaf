//! DOCX text extraction straight from the WordprocessingML parts.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use engine_logging::engine_debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::dispatch::{Extraction, FormatHandler};
use crate::ConvertError;

const DOCUMENT_PART: &str = "word/document.xml";
/// Magic of the compound-file wrapper Office uses for password-protected files.
const COMPOUND_FILE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Default, Clone, Copy)]
pub struct OfficeHandler;

impl FormatHandler for OfficeHandler {
    fn name(&self) -> &'static str {
        "office"
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ConvertError> {
        let mut file = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        if file.read_exact(&mut magic).is_ok() && magic == COMPOUND_FILE_MAGIC {
            return Err(ConvertError::EncryptedSource(
                "document is password protected".into(),
            ));
        }
        file.rewind()?;
        Ok(Extraction {
            text: docx_text(file)?,
            warnings: Vec::new(),
        })
    }
}

/// Header and footer paragraphs, then body paragraphs, then the cells of
/// top-level tables. Empty lines are dropped.
pub fn docx_text<R: Read + Seek>(reader: R) -> Result<String, ConvertError> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|err| ConvertError::MalformedArchive(format!("not a docx package: {err}")))?;

    let mut decorations: Vec<String> = archive
        .file_names()
        .filter(|name| is_decoration_part(name))
        .map(str::to_string)
        .collect();
    // header1, header2, ... then footer1, ...
    decorations.sort_by_key(|name| (!name.starts_with("word/header"), name.clone()));

    let mut lines = Vec::new();
    for name in &decorations {
        match read_part(&mut archive, name).and_then(|xml| parse_document(&xml, name)) {
            Ok(parsed) => lines.extend(parsed.paragraphs),
            Err(err) => engine_debug!("skipping {name}: {err}"),
        }
    }

    let xml = read_part(&mut archive, DOCUMENT_PART)?;
    let parsed = parse_document(&xml, DOCUMENT_PART)?;
    lines.extend(parsed.paragraphs);
    lines.extend(parsed.cells);

    Ok(lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn is_decoration_part(name: &str) -> bool {
    (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml")
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ConvertError> {
    let mut entry = archive.by_name(name).map_err(|err| {
        ConvertError::MalformedArchive(format!("{name}: {err}"))
    })?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[derive(Debug, Default)]
struct ParsedDocument {
    /// Paragraphs outside any table.
    paragraphs: Vec<String>,
    /// Trimmed text of each cell of a top-level table.
    cells: Vec<String>,
}

fn parse_document(xml: &[u8], part: &str) -> Result<ParsedDocument, ConvertError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut parsed = ParsedDocument::default();
    let mut table_depth = 0usize;
    let mut cell: Option<Vec<String>> = None;
    // Text boxes nest paragraphs inside paragraphs.
    let mut open_paragraphs: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| ConvertError::MalformedArchive(format!("{part}: {err}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"tc" if table_depth == 1 => cell = Some(Vec::new()),
                b"p" => open_paragraphs.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if let Some(paragraph) = open_paragraphs.last_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => paragraph.push('\t'),
                        b"br" | b"cr" => paragraph.push('\n'),
                        _ => {}
                    }
                }
            }
            Event::Text(t) if in_text => {
                if let Some(paragraph) = open_paragraphs.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|err| ConvertError::MalformedArchive(format!("{part}: {err}")))?;
                    paragraph.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                b"tc" if table_depth == 1 => {
                    if let Some(paragraphs) = cell.take() {
                        parsed.cells.push(paragraphs.join("\n").trim().to_string());
                    }
                }
                b"p" => {
                    if let Some(paragraph) = open_paragraphs.pop() {
                        if table_depth == 0 {
                            parsed.paragraphs.push(paragraph);
                        } else if let (1, Some(paragraphs)) = (table_depth, cell.as_mut()) {
                            paragraphs.push(paragraph);
                        }
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parsed)
}
