//! Hand-written `multipart/form-data` decoder.
//!
//! The body is tokenized on byte offsets: delimiter lines are located with
//! `memchr::memmem`, and only the header block of each part is ever decoded
//! as text. File contents are kept as zero-copy slices of the request body.

use std::collections::BTreeMap;
use std::ops::Range;

use bytes::Bytes;
use memchr::memmem;

use crate::error::SubmitError;
use crate::util::parse_string_map;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// One segment of the body between two delimiters, as byte ranges into the
/// original body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    pub headers: Range<usize>,
    pub content: Range<usize>,
}

/// Parsed `Content-Disposition` parameters of a part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disposition {
    pub name: Option<String>,
    pub filename: Option<String>,
}

/// The uploaded file exactly as received.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field_name: Option<String>,
    pub filename: String,
    pub content: Bytes,
}

/// Result of decoding a submission form.
#[derive(Debug, Clone)]
pub struct DecodedForm {
    pub title: String,
    pub body: String,
    /// Submitter details. Logged, never forwarded.
    pub user_info: BTreeMap<String, String>,
    /// Structured form answers used for the compliance check.
    pub form_data: BTreeMap<String, String>,
    pub file: FilePart,
}

/// Extract the `boundary` parameter from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Split `body` into parts on `--boundary` delimiters.
///
/// The preamble and anything after the closing delimiter are dropped, as are
/// segments without a header/body separator.
pub fn split_parts(body: &[u8], boundary: &str) -> Vec<RawPart> {
    let delimiter = [b"--".as_slice(), boundary.as_bytes()].concat();
    let starts: Vec<usize> = memmem::find_iter(body, &delimiter).collect();

    let mut parts = Vec::new();
    for (idx, &pos) in starts.iter().enumerate() {
        let seg_start = pos + delimiter.len();
        let seg_end = starts.get(idx + 1).copied().unwrap_or(body.len());
        let segment = &body[seg_start..seg_end];

        if segment.starts_with(b"--") {
            // closing delimiter
            break;
        }
        let lead = if segment.starts_with(CRLF) {
            2
        } else if segment.starts_with(b"\n") {
            1
        } else {
            0
        };
        let segment = &segment[lead..];
        let Some(header_len) = memmem::find(segment, HEADER_END) else {
            continue;
        };

        let base = seg_start + lead;
        let content_start = base + header_len + HEADER_END.len();
        let mut content_end = seg_end;
        if body[content_start..content_end].ends_with(CRLF) {
            content_end -= CRLF.len();
        }
        parts.push(RawPart {
            headers: base..base + header_len,
            content: content_start..content_end,
        });
    }
    parts
}

/// Find the `Content-Disposition` header in a header block and parse its
/// parameters. Returns `None` when the part carries no disposition.
pub fn parse_disposition(headers: &[u8]) -> Option<Disposition> {
    let text = String::from_utf8_lossy(headers);
    let value = text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then(|| value.trim().to_string())
    })?;

    let mut disposition = Disposition::default();
    for param in split_params(&value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let value = unquote(raw.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => disposition.name = Some(value),
            "filename" => disposition.filename = Some(value),
            _ => {}
        }
    }
    Some(disposition)
}

/// Split a header value on `;` outside of double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode a submission form. Fails only when no file part is present or the
/// file is empty; malformed optional fields fall back to empty values.
pub fn decode_form(body: &Bytes, boundary: &str) -> Result<DecodedForm, SubmitError> {
    let mut title = String::new();
    let mut text_body = String::new();
    let mut user_info = BTreeMap::new();
    let mut form_data = BTreeMap::new();
    let mut file: Option<FilePart> = None;

    for part in split_parts(body, boundary) {
        let Some(disposition) = parse_disposition(&body[part.headers.clone()]) else {
            continue;
        };
        let content = &body[part.content.clone()];

        if let Some(filename) = disposition.filename {
            if file.is_some() {
                tracing::debug!(field = ?disposition.name, "ignoring additional file part");
                continue;
            }
            if filename.is_empty() && content.is_empty() {
                // browsers send this when no file was chosen
                continue;
            }
            file = Some(FilePart {
                field_name: disposition.name,
                filename,
                content: body.slice(part.content),
            });
            continue;
        }

        match disposition.name.as_deref() {
            Some("title") => title = String::from_utf8_lossy(content).into_owned(),
            Some("body") => text_body = String::from_utf8_lossy(content).into_owned(),
            Some("userInfo") => user_info = json_field("userInfo", content),
            Some("formData") => form_data = json_field("formData", content),
            other => tracing::trace!(field = ?other, "ignoring unknown form field"),
        }
    }

    let file = file
        .ok_or_else(|| SubmitError::MalformedRequest("PDF document is required".to_string()))?;
    if file.content.is_empty() {
        return Err(SubmitError::ValidationFailed(
            "PDF document is empty".to_string(),
        ));
    }

    Ok(DecodedForm {
        title,
        body: text_body,
        user_info,
        form_data,
        file,
    })
}

fn json_field(field: &str, content: &[u8]) -> BTreeMap<String, String> {
    let text = String::from_utf8_lossy(content);
    if text.trim().is_empty() {
        return BTreeMap::new();
    }
    parse_string_map(&text).unwrap_or_else(|| {
        tracing::debug!(field, "form field is not a JSON object; ignoring");
        BTreeMap::new()
    })
}
