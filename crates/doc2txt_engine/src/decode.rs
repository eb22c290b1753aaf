use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// How far into a part to look for an encoding declaration.
const DECLARATION_WINDOW: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMarkup {
    pub markup: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode raw part bytes into UTF-8 using: BOM -> declared encoding (XML
/// declaration or meta charset) -> chardetng fallback.
pub fn decode_markup(bytes: &[u8]) -> Result<DecodedMarkup, DecodeError> {
    // 1) BOM aware decode using encoding_rs helper
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    // 2) encoding declared in the markup itself
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    if let Some(label) = declared_encoding(&String::from_utf8_lossy(head)) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            // An ASCII-readable declaration cannot really be UTF-16.
            return decode_with(bytes, enc.output_encoding());
        }
    }

    // 3) chardetng detection
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn declared_encoding(head: &str) -> Option<String> {
    let lower = head.to_ascii_lowercase();
    ["encoding=", "charset="].iter().find_map(|key| {
        let start = lower.find(key)? + key.len();
        let value: String = lower[start..]
            .trim_start_matches(&['"', '\''][..])
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
            .collect();
        (!value.is_empty()).then_some(value)
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedMarkup, DecodeError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
            message: "decoding error".into(),
        });
    }
    Ok(DecodedMarkup {
        markup: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{declared_encoding, decode_markup};

    #[test]
    fn xml_declaration_is_honoured() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p>caf\xe9</p>";
        let decoded = decode_markup(bytes).unwrap();
        assert!(decoded.markup.ends_with("<p>caf\u{e9}</p>"));
        assert_eq!(decoded.encoding_label, "windows-1252");
    }

    #[test]
    fn utf8_bom_wins() {
        let decoded = decode_markup(b"\xEF\xBB\xBF<p>hello</p>").unwrap();
        assert_eq!(decoded.markup, "<p>hello</p>");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn utf16_declaration_without_bom_reads_as_utf8() {
        let decoded = decode_markup(b"<?xml version='1.0' encoding='utf-16'?><p>x</p>").unwrap();
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn meta_charset_is_found() {
        assert_eq!(
            declared_encoding(r#"<html><head><meta charset="Shift_JIS">"#).as_deref(),
            Some("shift_jis")
        );
        assert_eq!(declared_encoding("<p>no declaration</p>"), None);
    }

    #[test]
    fn invalid_utf8_under_utf8_declaration_fails() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"utf-8\"?><p>\xff\xfe\xfd</p>";
        assert!(decode_markup(bytes).is_err());
    }
}
