use doc2txt_core::{ExtractionWarning, WarningKind};
use ego_tree::NodeRef;
use engine_logging::engine_warn;
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::node::Node;
use scraper::{Html, Selector};

use crate::decode::{decode_markup, DecodeError};

/// Elements removed together with their subtree before text is collected.
pub const REMOVED_ELEMENTS: &[&str] = &[
    "script",
    "style",
    "nav",
    "header",
    "footer",
    "meta",
    "link",
    "noscript",
    "svg",
    "figure",
    "figcaption",
    "a",
    "img",
    "aside",
];

const PART_SEPARATOR: &str = "\n\n";
const FRAGMENT_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartText {
    pub text: String,
    pub warnings: Vec<ExtractionWarning>,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, part_path: &str, bytes: &[u8]) -> Result<PartText, DecodeError>;
}

/// Strict XHTML walk first; lenient HTML5 parsing when the part is not
/// well-formed XML.
///
/// - only text below the first `body` is kept
/// - [`REMOVED_ELEMENTS`] are dropped with everything inside them
/// - every text node is trimmed at both ends, empty ones are dropped, the
///   rest are joined with a newline. Whitespace inside a node is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupTextExtractor;

impl Extractor for MarkupTextExtractor {
    fn extract(&self, part_path: &str, bytes: &[u8]) -> Result<PartText, DecodeError> {
        let decoded = decode_markup(bytes)?;
        match strict_fragments(&decoded.markup) {
            Ok(fragments) => Ok(PartText {
                text: fragments.join(FRAGMENT_SEPARATOR),
                warnings: Vec::new(),
            }),
            Err(reason) => {
                let message = format!(
                    "markup is not well-formed XML ({reason}); fell back to lenient HTML parsing"
                );
                engine_warn!("[{part_path}] {message}");
                Ok(PartText {
                    text: lenient_fragments(&decoded.markup).join(FRAGMENT_SEPARATOR),
                    warnings: vec![ExtractionWarning::new(
                        WarningKind::LenientFallback,
                        part_path,
                        message,
                    )],
                })
            }
        }
    }
}

/// Joins per-part texts in reading order with a blank line between parts.
pub fn join_parts<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    parts
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

fn is_removed(name: &str) -> bool {
    REMOVED_ELEMENTS
        .iter()
        .any(|removed| removed.eq_ignore_ascii_case(name))
}

fn push_fragment(fragments: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

fn strict_fragments(markup: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(markup);
    let mut open: Vec<String> = Vec::new();
    // Depth at which the current removed subtree / the body started.
    let mut removed_at: Option<usize> = None;
    let mut body_at: Option<usize> = None;
    let mut body_seen = false;
    let mut fragments = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("byte {}: {err}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                let depth = open.len();
                if removed_at.is_none() {
                    if is_removed(&name) {
                        removed_at = Some(depth);
                    } else if name == "body" && !body_seen {
                        body_at = Some(depth);
                        body_seen = true;
                    }
                }
                open.push(name);
            }
            Event::End(_) => {
                open.pop();
                let depth = open.len();
                if removed_at == Some(depth) {
                    removed_at = None;
                } else if body_at == Some(depth) {
                    body_at = None;
                }
            }
            Event::Text(text) => {
                if body_at.is_some() && removed_at.is_none() {
                    let text = text
                        .unescape()
                        .map_err(|err| format!("byte {}: {err}", reader.buffer_position()))?;
                    push_fragment(&mut fragments, &text);
                }
            }
            Event::CData(data) => {
                if body_at.is_some() && removed_at.is_none() {
                    push_fragment(&mut fragments, &String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => {
                if let Some(name) = open.last() {
                    return Err(format!("element <{name}> is never closed"));
                }
                break;
            }
            _ => {}
        }
    }
    Ok(fragments)
}

fn lenient_fragments(markup: &str) -> Vec<String> {
    let document = Html::parse_document(markup);
    let body_sel = Selector::parse("body").ok();
    let Some(body) = body_sel
        .as_ref()
        .and_then(|sel| document.select(sel).next())
    else {
        return Vec::new();
    };

    let mut fragments = Vec::new();
    // Explicit stack: garbage input can nest arbitrarily deep.
    let mut pending: Vec<NodeRef<'_, Node>> = body.children().rev().collect();
    while let Some(node) = pending.pop() {
        match node.value() {
            Node::Text(text) => push_fragment(&mut fragments, text),
            Node::Element(element) if !is_removed(element.name()) => {
                pending.extend(node.children().rev());
            }
            _ => {}
        }
    }
    fragments
}
