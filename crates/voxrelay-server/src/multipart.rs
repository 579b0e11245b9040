//! Minimal `multipart/form-data` decoder.
//!
//! This is deliberately not a conformant RFC 7578 parser. Known limitations:
//!
//! - `Content-Transfer-Encoding` and per-part charsets are ignored; payloads
//!   are returned as raw bytes.
//! - Nested multipart bodies are not descended into.
//! - A payload that itself contains the `--boundary` byte sequence is split
//!   at that point.
//! - Header attributes are found by plain substring matching, so quoted
//!   values containing `"` are cut short.

/// A single named part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub name: String,
    /// Present for file uploads, absent for plain fields.
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedPart {
    /// The payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Extracts `attr="value"` from a part's header block.
fn header_attribute(headers: &str, attr: &str) -> Option<String> {
    let key = format!("{}=\"", attr);
    let mut search_from = 0;
    while let Some(pos) = headers[search_from..].find(&key) {
        let start = search_from + pos;
        // `name=` must not match the tail of `filename=`.
        let preceded_by_word = headers[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        let value_start = start + key.len();
        if !preceded_by_word {
            let value_end = headers[value_start..].find('"')? + value_start;
            return Some(headers[value_start..value_end].to_string());
        }
        search_from = value_start;
    }
    None
}

fn parse_segment(segment: &[u8]) -> Option<UploadedPart> {
    let split = find(segment, HEADER_SEPARATOR, 0)?;
    let headers = String::from_utf8_lossy(&segment[..split]);
    let name = header_attribute(&headers, "name")?;
    let filename = header_attribute(&headers, "filename");

    let mut data = &segment[split + HEADER_SEPARATOR.len()..];
    if let Some(stripped) = data.strip_suffix(b"\r\n") {
        data = stripped;
    }

    Some(UploadedPart {
        name,
        filename,
        data: data.to_vec(),
    })
}

/// Splits `body` on `--{boundary}` and decodes each interior segment.
///
/// Parsing stops at the terminal `--{boundary}--` marker, or at the end of
/// the buffer if the marker is missing. Segments without a header block or a
/// `name` attribute are skipped.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<UploadedPart> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let Some(first) = find(body, delimiter, 0) else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    let mut cursor = first + delimiter.len();
    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            break;
        }
        let end = find(body, delimiter, cursor).unwrap_or(body.len());
        if let Some(part) = parse_segment(&body[cursor..end]) {
            parts.push(part);
        }
        if end >= body.len() {
            break;
        }
        cursor = end + delimiter.len();
    }
    parts
}

/// Reads the `boundary` parameter of a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// First part named `name`.
pub fn find_part<'a>(parts: &'a [UploadedPart], name: &str) -> Option<&'a UploadedPart> {
    parts.iter().find(|p| p.name == name)
}
