use encoding_rs::{Encoding, UTF_8};
use xhtmlchardet::detect;

use crate::error::ParseError;

/// Detect the encoding of template bytes, falling back to UTF-8.
pub(crate) fn detect_encoding(data: &[u8], hint: Option<String>) -> &'static Encoding {
    let mut cursor = std::io::Cursor::new(data);
    let charsets = detect(&mut cursor, hint).unwrap_or_default();
    charsets
        .first()
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8)
}

/// Decode template bytes to text. Malformed input is an error rather than
/// being replaced.
pub(crate) fn decode(data: &[u8], hint: Option<String>) -> Result<String, ParseError> {
    let encoding = detect_encoding(data, hint);
    let (text, _, had_errors) = encoding.decode(data);
    if had_errors {
        return Err(ParseError::Encoding(encoding.name()));
    }
    Ok(text.into_owned())
}
