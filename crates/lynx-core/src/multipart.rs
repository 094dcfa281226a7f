//! Multipart form data decoder.
//!
//! Decodes a complete `multipart/form-data` request body into an ordered
//! list of [`Part`]s in a single forward scan. The decoder is deliberately
//! narrow: every part must open with a `Content-Disposition: form-data`
//! header, value parts carry no other headers, and file parts carry a header
//! block terminated by a blank line. Anything else fails the whole decode.
//!
//! # Ownership
//!
//! Payload bytes are copied out of the body into buffers owned by each part,
//! so parts stay valid after the request is gone. File-part headers are not
//! copied: [`PartHeaders`] is a reference-counted view into the request body.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lynx_core::{Method, Request};
//!
//! let request = Arc::new(
//!     Request::new(Method::Post, "/upload")
//!         .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
//!         .with_body(
//!             "--XYZ\r\nContent-Disposition: form-data; name=\"field1\"\r\n\r\nhello\r\n--XYZ--\r\n",
//!         ),
//! );
//!
//! let form = request.multipart().expect("well-formed body");
//! assert_eq!(form.lookup("field1").and_then(|p| p.text()).as_deref(), Some("hello"));
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use memchr::{memchr, memmem};

use crate::request::{Headers, Request, trim_ows};
use crate::upload::{BodySource, FileUpload};

/// Default maximum number of parts in one form.
pub const DEFAULT_MAX_PARTS: usize = 100;

/// Default maximum total payload size (50MB).
pub const DEFAULT_MAX_TOTAL_SIZE: usize = 50 * 1024 * 1024;

/// MIME type recorded for file parts without a `Content-Type` header.
pub const DEFAULT_PART_MIME: &str = "*/*";

/// RFC 2046 recommends multipart boundary length <= 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Boundaries of two bytes or less are refused.
const MIN_BOUNDARY_LEN: usize = 3;

const MULTIPART_CONTENT_TYPE: &[u8] = b"multipart/form-data";
const BOUNDARY_PARAM: &[u8] = b"; boundary=";
const CONTENT_DISPOSITION: &[u8] = b"Content-Disposition: ";
const FORM_DATA: &[u8] = b"form-data";

const DELIMITER: &[u8] = b"--";
const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

const CR: u8 = b'\r';
const QUOTE: u8 = b'"';
const SPACE: u8 = b' ';
const SEMICOLON: u8 = b';';

/// Configuration for multipart decoding.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Maximum number of parts.
    max_parts: usize,
    /// Maximum sum of all payload sizes in bytes.
    max_total_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_parts: DEFAULT_MAX_PARTS,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

impl MultipartConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of parts.
    #[must_use]
    pub fn max_parts(mut self, count: usize) -> Self {
        self.max_parts = count;
        self
    }

    /// Set the maximum total payload size.
    #[must_use]
    pub fn max_total_size(mut self, size: usize) -> Self {
        self.max_total_size = size;
        self
    }

    /// Get the maximum number of parts.
    #[must_use]
    pub fn get_max_parts(&self) -> usize {
        self.max_parts
    }

    /// Get the maximum total payload size.
    #[must_use]
    pub fn get_max_total_size(&self) -> usize {
        self.max_total_size
    }
}

/// Errors that can occur during multipart decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartError {
    /// Content-Type is multipart/form-data but carries no boundary.
    MissingBoundary,
    /// Content-Type is not multipart/form-data, or the boundary is unusable.
    InvalidBoundary,
    /// The body violates multipart framing.
    Malformed { detail: &'static str },
    /// A part uses a disposition type other than `form-data`.
    UnsupportedDisposition { value: String },
    /// The request carries no body at all.
    MissingBody,
    /// A file part was given an empty file name.
    EmptyFilename,
    /// Too many parts.
    TooManyParts { max: usize },
    /// Total payload size exceeds limit.
    TotalTooLarge { size: usize, max: usize },
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing boundary in multipart Content-Type"),
            Self::InvalidBoundary => write!(f, "invalid multipart boundary"),
            Self::Malformed { detail } => write!(f, "malformed multipart body: {detail}"),
            Self::UnsupportedDisposition { value } => {
                write!(f, "unsupported Content-Disposition type: {value}")
            }
            Self::MissingBody => write!(f, "request has no body"),
            Self::EmptyFilename => write!(f, "file part has an empty file name"),
            Self::TooManyParts { max } => write!(f, "too many parts: limit is {max}"),
            Self::TotalTooLarge { size, max } => {
                write!(
                    f,
                    "total upload too large: {size} bytes exceeds limit of {max}"
                )
            }
        }
    }
}

impl std::error::Error for MultipartError {}

fn malformed(detail: &'static str) -> MultipartError {
    MultipartError::Malformed { detail }
}

/// What a part carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    /// A plain form value.
    Value,
    /// A file attachment.
    File {
        /// MIME type from the part's `Content-Type`.
        mime: String,
        /// File name from the `filename` attribute. Never empty.
        filename: String,
    },
}

/// Header block of a file part.
///
/// A zero-copy view into the originating request body. The lines are
/// parsed on each lookup.
#[derive(Clone, PartialEq, Eq)]
pub struct PartHeaders {
    raw: Bytes,
}

impl PartHeaders {
    /// Wrap a serialized `Name: value\r\n` block.
    #[must_use]
    pub fn new(raw: Bytes) -> Self {
        Self { raw }
    }

    /// The serialized header lines, without the terminating blank line.
    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Iterate over `(name, value)` pairs in order of appearance.
    ///
    /// Lines without a colon are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.raw.split(|&b| b == b'\n').filter_map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let colon = memchr(b':', line)?;
            Some((trim_ows(&line[..colon]), trim_ows(&line[colon + 1..])))
        })
    }

    /// Get the first value of a header (case-insensitive name).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, value)| value)
    }

    /// Get a header value as UTF-8 text.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Copy the block into an owned [`Headers`] collection.
    #[must_use]
    pub fn to_headers(&self) -> Headers {
        Headers::parse(&self.raw)
    }

    /// Returns true if the block holds no header lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl fmt::Debug for PartHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k), String::from_utf8_lossy(v))),
            )
            .finish()
    }
}

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub struct Part {
    name: Option<String>,
    kind: PartKind,
    data: Arc<dyn BodySource>,
    headers: Option<PartHeaders>,
}

impl Part {
    /// Create a value part.
    #[must_use]
    pub fn value(name: impl Into<String>, data: impl BodySource + 'static) -> Self {
        Self {
            name: Some(name.into()),
            kind: PartKind::Value,
            data: Arc::new(data),
            headers: None,
        }
    }

    /// Create a file part.
    ///
    /// Fails with [`MultipartError::EmptyFilename`] if `filename` is empty.
    pub fn file(
        name: Option<String>,
        filename: impl Into<String>,
        mime: impl Into<String>,
        data: impl BodySource + 'static,
    ) -> Result<Self, MultipartError> {
        let filename = filename.into();
        if filename.is_empty() {
            return Err(MultipartError::EmptyFilename);
        }
        Ok(Self {
            name,
            kind: PartKind::File {
                mime: mime.into(),
                filename,
            },
            data: Arc::new(data),
            headers: None,
        })
    }

    /// Field name from `Content-Disposition`. Absent only for appended parts.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Value or file.
    #[must_use]
    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    /// Returns true if this part is a file upload.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, PartKind::File { .. })
    }

    /// Returns true if this part is a plain form value.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self.kind, PartKind::Value)
    }

    /// File name, for file parts.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match &self.kind {
            PartKind::File { filename, .. } => Some(filename),
            PartKind::Value => None,
        }
    }

    /// MIME type, for file parts.
    #[must_use]
    pub fn mime(&self) -> Option<&str> {
        match &self.kind {
            PartKind::File { mime, .. } => Some(mime),
            PartKind::Value => None,
        }
    }

    /// Header block, for decoded file parts.
    #[must_use]
    pub fn headers(&self) -> Option<&PartHeaders> {
        self.headers.as_ref()
    }

    /// The payload source.
    #[must_use]
    pub fn data(&self) -> &dyn BodySource {
        self.data.as_ref()
    }

    /// Produce the payload bytes.
    pub fn bytes(&self) -> std::io::Result<Vec<u8>> {
        self.data.to_bytes()
    }

    /// Decode a value part's payload as UTF-8.
    ///
    /// Returns `None` for file parts, when the payload cannot be produced,
    /// or when it is not valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        if !self.is_value() {
            return None;
        }
        String::from_utf8(self.bytes().ok()?).ok()
    }
}

/// Extract the boundary token from a `Content-Type` value.
///
/// The value must read exactly `multipart/form-data; boundary=<token>`; the
/// token is returned as raw bytes, without its `--` prefix.
pub fn parse_boundary(content_type: &[u8]) -> Result<&[u8], MultipartError> {
    let Some(params) = content_type.strip_prefix(MULTIPART_CONTENT_TYPE) else {
        return Err(MultipartError::InvalidBoundary);
    };
    let Some(boundary) = params.strip_prefix(BOUNDARY_PARAM) else {
        return Err(if params.is_empty() {
            MultipartError::MissingBoundary
        } else {
            MultipartError::InvalidBoundary
        });
    };
    if boundary.len() < MIN_BOUNDARY_LEN || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(MultipartError::InvalidBoundary);
    }
    Ok(boundary)
}

/// Multipart decoder for one boundary.
#[derive(Debug)]
pub struct MultipartParser {
    boundary: Vec<u8>,
    config: MultipartConfig,
}

impl MultipartParser {
    /// Create a decoder for `boundary` (the token without its `--` prefix).
    #[must_use]
    pub fn new(boundary: impl Into<Vec<u8>>, config: MultipartConfig) -> Self {
        Self {
            boundary: boundary.into(),
            config,
        }
    }

    /// The boundary token.
    #[must_use]
    pub fn boundary(&self) -> &[u8] {
        &self.boundary
    }

    /// Decode every part of a complete body.
    ///
    /// Either the whole body decodes or an error is returned; there are no
    /// partial results.
    pub fn parse(&self, body: &Bytes) -> Result<Vec<Part>, MultipartError> {
        if self.boundary.is_empty() {
            return Err(MultipartError::InvalidBoundary);
        }

        let mut cursor = Cursor::new(body);
        let mut parts = Vec::new();
        let mut total_size = 0usize;

        loop {
            cursor.expect(DELIMITER, "missing `--` before boundary")?;
            cursor.expect(&self.boundary, "boundary mismatch")?;

            if cursor.eat(DELIMITER) {
                return Ok(parts);
            }
            cursor.expect(CRLF, "expected CRLF or `--` after boundary")?;

            if parts.len() >= self.config.max_parts {
                return Err(MultipartError::TooManyParts {
                    max: self.config.max_parts,
                });
            }

            let part = self.parse_part(&mut cursor)?;

            total_size = total_size.saturating_add(part.data.len_hint().unwrap_or(0));
            if total_size > self.config.max_total_size {
                return Err(MultipartError::TotalTooLarge {
                    size: total_size,
                    max: self.config.max_total_size,
                });
            }

            parts.push(part);
        }
    }

    /// Decode one part; the cursor sits just past the boundary's CRLF.
    fn parse_part(&self, cursor: &mut Cursor<'_>) -> Result<Part, MultipartError> {
        cursor.expect(CONTENT_DISPOSITION, "expected Content-Disposition header")?;

        let disposition = cursor.take_until_in_line(SPACE, "unterminated disposition type")?;
        let Some(disposition) = disposition.strip_suffix(&[SEMICOLON]) else {
            return Err(malformed("disposition type not followed by `;`"));
        };
        if disposition != FORM_DATA {
            return Err(MultipartError::UnsupportedDisposition {
                value: String::from_utf8_lossy(disposition).into_owned(),
            });
        }

        let name = cursor.quoted_attribute(b"name=")?;

        if cursor.eat(HEADER_END) {
            let data = self.content_run(cursor)?;
            return Ok(Part {
                name: Some(name),
                kind: PartKind::Value,
                data: Arc::new(data),
                headers: None,
            });
        }

        if !cursor.eat(&[SEMICOLON]) {
            return Err(malformed("unexpected byte after name attribute"));
        }

        let filename = cursor.quoted_attribute(b"filename=")?;
        if filename.is_empty() {
            return Err(MultipartError::EmptyFilename);
        }

        let headers = cursor.header_block(&self.boundary)?;
        let mime = headers
            .get_str("content-type")
            .unwrap_or(DEFAULT_PART_MIME)
            .to_string();
        let data = self.content_run(cursor)?;

        Ok(Part {
            name: Some(name),
            kind: PartKind::File { mime, filename },
            data: Arc::new(data),
            headers: Some(headers),
        })
    }

    /// Read a payload up to the next `\r\n--<boundary>` and copy it out.
    ///
    /// Leaves the cursor on the `--` of the delimiter.
    fn content_run(&self, cursor: &mut Cursor<'_>) -> Result<Vec<u8>, MultipartError> {
        let body = cursor.body;
        let start = cursor.pos;
        let delimiter_len = CRLF.len() + DELIMITER.len() + self.boundary.len();
        let mut search = start;

        let end = loop {
            let Some(offset) = memchr(CR, &body[search..]) else {
                return Err(malformed("part not terminated by a boundary"));
            };
            let cr = search + offset;
            if body.len() - cr < delimiter_len {
                return Err(malformed("body ends before closing boundary"));
            }

            let candidate = &body[cr..cr + delimiter_len];
            if candidate.starts_with(b"\r\n--") && candidate[4..] == self.boundary[..] {
                break cr;
            }
            // A bare CR inside the payload.
            search = cr + 1;
        };

        let data = body[start..end].to_vec();
        cursor.pos = end + CRLF.len();
        Ok(data)
    }
}

/// Read position over a borrowed body.
///
/// Every method checks the remaining length before advancing.
struct Cursor<'a> {
    body: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(body: &'a Bytes) -> Self {
        Self { body, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        let body: &'a [u8] = self.body;
        &body[self.pos..]
    }

    /// Advance past `literal` if the remaining bytes start with it.
    fn eat(&mut self, literal: &[u8]) -> bool {
        if self.remaining().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &[u8], detail: &'static str) -> Result<(), MultipartError> {
        if self.eat(literal) {
            Ok(())
        } else {
            Err(malformed(detail))
        }
    }

    /// Return the bytes before the next `byte` on the current line and move
    /// past that byte. Fails if the line (or the body) ends first.
    fn take_until_in_line(
        &mut self,
        byte: u8,
        detail: &'static str,
    ) -> Result<&'a [u8], MultipartError> {
        let rest = self.remaining();
        let line_len = memchr(CR, rest).unwrap_or(rest.len());
        let Some(idx) = memchr(byte, &rest[..line_len]) else {
            return Err(malformed(detail));
        };
        self.pos += idx + 1;
        Ok(&rest[..idx])
    }

    /// Read `<key>"<value>"`, allowing whitespace before the key.
    fn quoted_attribute(&mut self, key: &[u8]) -> Result<String, MultipartError> {
        let prefix = self.take_until_in_line(QUOTE, "missing opening quote")?;
        if !trim_ows(prefix).eq_ignore_ascii_case(key) {
            return Err(malformed("unexpected disposition attribute"));
        }
        let value = self.take_until_in_line(QUOTE, "missing closing quote")?;
        String::from_utf8(value.to_vec()).map_err(|_| malformed("attribute is not valid UTF-8"))
    }

    /// Skip the rest of the disposition line and capture the header lines
    /// up to the blank line. Leaves the cursor at the start of the payload.
    ///
    /// A header line opening with `--<boundary>` means the blank line is
    /// missing and the search ran into the next part.
    fn header_block(&mut self, boundary: &[u8]) -> Result<PartHeaders, MultipartError> {
        let rest = self.remaining();
        let Some(line_end) = memmem::find(rest, CRLF) else {
            return Err(malformed("unterminated Content-Disposition line"));
        };
        let Some(found) = memmem::find(&rest[line_end..], HEADER_END) else {
            return Err(malformed("part headers not terminated by a blank line"));
        };

        let lines = &rest[(line_end + CRLF.len()).min(line_end + found)..line_end + found];
        let crosses_boundary = lines.split(|&b| b == b'\n').any(|line| {
            line.strip_prefix(DELIMITER)
                .is_some_and(|tail| tail.starts_with(boundary))
        });
        if crosses_boundary {
            return Err(malformed("part headers not terminated by a blank line"));
        }

        let block_end = self.pos + line_end + found;
        let block_start = (self.pos + line_end + CRLF.len()).min(block_end);
        let headers = PartHeaders::new(self.body.slice(block_start..block_end));

        self.pos = block_end + HEADER_END.len();
        Ok(headers)
    }
}

/// A decoded (or hand-built) multipart form.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    boundary: Vec<u8>,
    parts: Vec<Part>,
    request: Option<Arc<Request>>,
}

impl MultipartForm {
    /// Create an empty form for building an outgoing body.
    #[must_use]
    pub fn new(boundary: impl Into<Vec<u8>>) -> Self {
        Self::with_parts(boundary, Vec::new())
    }

    /// Create a form from existing parts.
    #[must_use]
    pub fn with_parts(boundary: impl Into<Vec<u8>>, parts: Vec<Part>) -> Self {
        Self {
            boundary: boundary.into(),
            parts,
            request: None,
        }
    }

    /// Decode a request body with the default configuration.
    ///
    /// Returns `None` if the request has no body or the body is malformed.
    #[must_use]
    pub fn decode(boundary: &[u8], request: &Arc<Request>) -> Option<Self> {
        Self::decode_with_config(boundary, request, MultipartConfig::default())
    }

    /// Decode a request body with a custom configuration.
    #[must_use]
    pub fn decode_with_config(
        boundary: &[u8],
        request: &Arc<Request>,
        config: MultipartConfig,
    ) -> Option<Self> {
        match Self::try_decode(boundary, request, config) {
            Ok(form) => Some(form),
            Err(error) => {
                tracing::debug!(
                    %error,
                    path = request.path(),
                    "discarding multipart body"
                );
                None
            }
        }
    }

    /// Decode a request body, reporting why decoding failed.
    pub fn try_decode(
        boundary: &[u8],
        request: &Arc<Request>,
        config: MultipartConfig,
    ) -> Result<Self, MultipartError> {
        let body = request
            .body()
            .as_bytes()
            .ok_or(MultipartError::MissingBody)?;
        let parser = MultipartParser::new(boundary, config);
        let parts = parser.parse(body)?;
        tracing::trace!(parts = parts.len(), bytes = body.len(), "decoded multipart body");

        Ok(Self {
            boundary: parser.boundary,
            parts,
            request: Some(Arc::clone(request)),
        })
    }

    /// The boundary token, without its `--` prefix.
    #[must_use]
    pub fn boundary(&self) -> &[u8] {
        &self.boundary
    }

    /// The request this form was decoded from, if any.
    #[must_use]
    pub fn request(&self) -> Option<&Arc<Request>> {
        self.request.as_ref()
    }

    /// Get all parts, in order of appearance.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Consume the form and return its parts.
    #[must_use]
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }

    /// First part named `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name() == Some(name))
    }

    /// Every part named `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts.iter().filter(move |p| p.name() == Some(name))
    }

    /// All value parts as `(name, text)` pairs, skipping non-UTF-8 values.
    #[must_use]
    pub fn values(&self) -> Vec<(&str, String)> {
        self.parts
            .iter()
            .filter_map(|p| Some((p.name()?, p.text()?)))
            .collect()
    }

    /// All file parts.
    pub fn files(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_file())
    }

    /// Check if a part with this name exists.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Get the number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if the form is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append a part.
    pub fn append(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Append a file from disk, named after the file itself.
    pub fn append_file(&mut self, file: FileUpload) -> Result<(), MultipartError> {
        let name = file.name().to_string();
        let mime = file.mime_type().to_string();
        let part = Part::file(Some(name.clone()), name, mime, file)?;
        self.append(part);
        Ok(())
    }

    /// Append an unnamed file part with the given payload.
    pub fn append_body(
        &mut self,
        body: impl BodySource + 'static,
        filename: impl Into<String>,
        mime: impl Into<String>,
    ) -> Result<(), MultipartError> {
        let part = Part::file(None, filename, mime, body)?;
        self.append(part);
        Ok(())
    }
}

impl Request {
    /// Decode this request's body as `multipart/form-data`.
    ///
    /// Returns `None` if the `Content-Type` is not
    /// `multipart/form-data; boundary=...`, if there is no body, or if the
    /// body is malformed.
    #[must_use]
    pub fn multipart(self: &Arc<Self>) -> Option<MultipartForm> {
        let boundary = parse_boundary(self.content_type()?).ok()?;
        MultipartForm::decode(boundary, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    fn parse(boundary: &str, body: &'static str) -> Result<Vec<Part>, MultipartError> {
        MultipartParser::new(boundary, MultipartConfig::default())
            .parse(&Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn test_parse_boundary() {
        let boundary = parse_boundary(b"multipart/form-data; boundary=XYZ").unwrap();
        assert_eq!(boundary, b"XYZ");
    }

    #[test]
    fn test_parse_boundary_missing() {
        let result = parse_boundary(b"multipart/form-data");
        assert_eq!(result, Err(MultipartError::MissingBoundary));
    }

    #[test]
    fn test_parse_boundary_rejects_short_and_long_tokens() {
        assert_eq!(
            parse_boundary(b"multipart/form-data; boundary=ab"),
            Err(MultipartError::InvalidBoundary)
        );
        let too_long = format!("multipart/form-data; boundary={}", "a".repeat(71));
        assert_eq!(
            parse_boundary(too_long.as_bytes()),
            Err(MultipartError::InvalidBoundary)
        );
    }

    #[test]
    fn test_parse_boundary_wrong_content_type() {
        assert_eq!(
            parse_boundary(b"application/json"),
            Err(MultipartError::InvalidBoundary)
        );
        assert_eq!(
            parse_boundary(b"multipart/form-data;boundary=XYZ"),
            Err(MultipartError::InvalidBoundary)
        );
    }

    #[test]
    fn test_parse_value_part() {
        let parts = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"field1\"\r\n\r\nhello\r\n--XYZ--",
        )
        .unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), Some("field1"));
        assert_eq!(parts[0].kind(), &PartKind::Value);
        assert_eq!(parts[0].text().as_deref(), Some("hello"));
        assert!(parts[0].headers().is_none());
    }

    #[test]
    fn test_parse_file_part() {
        let parts = parse(
            "XYZ",
            concat!(
                "--XYZ\r\n",
                "Content-Disposition: form-data; name=\"file1\"; filename=\"a.txt\"\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "data\r\n",
                "--XYZ--\r\n"
            ),
        )
        .unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), Some("file1"));
        assert_eq!(
            parts[0].kind(),
            &PartKind::File {
                mime: "text/plain".to_string(),
                filename: "a.txt".to_string(),
            }
        );
        assert_eq!(parts[0].bytes().unwrap(), b"data".to_vec());
        assert_eq!(parts[0].text(), None);
    }

    #[test]
    fn test_file_part_without_content_type_defaults_to_any() {
        let parts = parse(
            "XYZ",
            concat!(
                "--XYZ\r\n",
                "Content-Disposition: form-data; name=\"f\"; filename=\"b.bin\"\r\n",
                "\r\n",
                "\x00\x01\r\n",
                "--XYZ--"
            ),
        )
        .unwrap();

        assert_eq!(parts[0].mime(), Some(DEFAULT_PART_MIME));
        assert!(parts[0].headers().unwrap().is_empty());
        assert_eq!(parts[0].bytes().unwrap(), vec![0x00, 0x01]);
    }

    #[test]
    fn test_file_part_keeps_extra_headers() {
        let parts = parse(
            "XYZ",
            concat!(
                "--XYZ\r\n",
                "Content-Disposition: form-data; name=\"f\"; filename=\"c.json\"\r\n",
                "Content-Type: application/json\r\n",
                "X-Checksum: abc123\r\n",
                "\r\n",
                "{}\r\n",
                "--XYZ--"
            ),
        )
        .unwrap();

        let headers = parts[0].headers().unwrap();
        assert_eq!(headers.get_str("x-checksum"), Some("abc123"));
        assert_eq!(headers.get_str("Content-Type"), Some("application/json"));
        assert_eq!(headers.to_headers().len(), 2);
    }

    #[test]
    fn test_bare_carriage_return_is_payload() {
        let parts = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\na\rb\r\n--XYZ--",
        )
        .unwrap();
        assert_eq!(parts[0].bytes().unwrap(), b"a\rb".to_vec());
    }

    #[test]
    fn test_crlf_and_boundary_prefix_inside_payload() {
        let parts = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nl1\r\n--XY\r\nl2\r\n--XYZ--",
        )
        .unwrap();
        assert_eq!(parts[0].bytes().unwrap(), b"l1\r\n--XY\r\nl2".to_vec());
    }

    #[test]
    fn test_empty_payload() {
        let parts = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"e\"\r\n\r\n\r\n--XYZ--",
        )
        .unwrap();
        assert_eq!(parts[0].text().as_deref(), Some(""));
    }

    #[test]
    fn test_non_utf8_value_is_tolerated_until_read_as_text() {
        let body = Bytes::from(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\n\xff\xfe\r\n--XYZ--".to_vec(),
        );
        let parts = MultipartParser::new("XYZ", MultipartConfig::default())
            .parse(&body)
            .unwrap();
        assert!(parts[0].is_value());
        assert_eq!(parts[0].text(), None);
        assert_eq!(parts[0].bytes().unwrap(), vec![0xff, 0xfe]);
    }

    #[test]
    fn test_end_marker_only_is_an_empty_form() {
        assert!(parse("XYZ", "--XYZ--").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_bodies_fail() {
        let cases: &[(&str, &'static str)] = &[
            (
                "missing leading dashes",
                "XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XYZ--",
            ),
            (
                "boundary mismatch",
                "--ABC\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--ABC--",
            ),
            (
                "missing closing quote",
                "--XYZ\r\nContent-Disposition: form-data; name=\"a\r\n\r\nx\r\n--XYZ--",
            ),
            ("truncated body", "--XY"),
            ("empty body", ""),
            (
                "unterminated content",
                "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nno end in sight",
            ),
            (
                "content ends right before boundary",
                "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XY",
            ),
            (
                "garbage after boundary",
                "--XYZ!!Content-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XYZ--",
            ),
            (
                "headers in wrong order",
                "--XYZ\r\nContent-Type: text/plain\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XYZ--",
            ),
            (
                "unexpected byte after name",
                "--XYZ\r\nContent-Disposition: form-data; name=\"a\"X\r\n\r\nx\r\n--XYZ--",
            ),
            (
                "missing final boundary",
                "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XYZ",
            ),
        ];

        for (label, body) in cases {
            let result = parse("XYZ", body);
            assert!(
                matches!(result, Err(MultipartError::Malformed { .. })),
                "{label}: expected malformed, got {result:?}"
            );
        }
    }

    #[test]
    fn test_file_part_without_blank_line_does_not_swallow_next_part() {
        let cases: &[&'static str] = &[
            // Extra header, then straight into the next part.
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\
             --XYZ\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\nval\r\n--XYZ--",
            // No headers at all after the disposition line.
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
             --XYZ\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\nval\r\n--XYZ--",
        ];

        for body in cases {
            let result = parse("XYZ", body);
            assert!(
                matches!(result, Err(MultipartError::Malformed { .. })),
                "expected malformed, got {result:?}"
            );
        }
    }

    #[test]
    fn test_header_value_resembling_a_delimiter_is_kept() {
        let parts = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
             X-Note: --XYZ\r\n\r\nbody\r\n--XYZ--",
        )
        .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].headers().and_then(|h| h.get_str("x-note")),
            Some("--XYZ")
        );
        assert_eq!(parts[0].bytes().unwrap(), b"body".to_vec());
    }

    #[test]
    fn test_attachment_disposition_is_unsupported() {
        let result = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: attachment; name=\"a\"\r\n\r\nx\r\n--XYZ--",
        );
        assert_eq!(
            result.unwrap_err(),
            MultipartError::UnsupportedDisposition {
                value: "attachment".to_string()
            }
        );
    }

    #[test]
    fn test_empty_filename_is_rejected() {
        let result = parse(
            "XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"\"\r\n\r\nx\r\n--XYZ--",
        );
        assert_eq!(result.unwrap_err(), MultipartError::EmptyFilename);
    }

    #[test]
    fn test_limits_are_enforced() {
        let body = Bytes::from_static(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n12345\r\n--XYZ\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n6\r\n--XYZ--",
        );

        let too_many = MultipartParser::new("XYZ", MultipartConfig::new().max_parts(1)).parse(&body);
        assert_eq!(too_many.unwrap_err(), MultipartError::TooManyParts { max: 1 });

        let too_big =
            MultipartParser::new("XYZ", MultipartConfig::new().max_total_size(4)).parse(&body);
        assert_eq!(
            too_big.unwrap_err(),
            MultipartError::TotalTooLarge { size: 5, max: 4 }
        );
    }

    #[test]
    fn test_request_multipart_requires_form_data_content_type() {
        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--XYZ--";

        let plain = Arc::new(
            Request::new(Method::Post, "/")
                .with_header("Content-Type", "text/plain")
                .with_body(body),
        );
        assert!(plain.multipart().is_none());

        let missing = Arc::new(Request::new(Method::Post, "/").with_body(body));
        assert!(missing.multipart().is_none());

        let no_body = Arc::new(
            Request::new(Method::Post, "/")
                .with_header("Content-Type", "multipart/form-data; boundary=XYZ"),
        );
        assert!(no_body.multipart().is_none());
        assert_eq!(
            MultipartForm::try_decode(b"XYZ", &no_body, MultipartConfig::default()).unwrap_err(),
            MultipartError::MissingBody
        );
    }

    #[test]
    fn test_form_holds_the_request_and_payloads_outlive_it() {
        let request = Arc::new(
            Request::new(Method::Post, "/upload")
                .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
                .with_body(concat!(
                    "--XYZ\r\n",
                    "Content-Disposition: form-data; name=\"doc\"; filename=\"d.txt\"\r\n",
                    "Content-Type: text/plain\r\n",
                    "\r\n",
                    "payload\r\n",
                    "--XYZ--"
                )),
        );

        let form = request.multipart().unwrap();
        assert!(Arc::ptr_eq(form.request().unwrap(), &request));
        assert_eq!(Arc::strong_count(&request), 2);

        let parts = form.into_parts();
        drop(request);
        assert_eq!(parts[0].bytes().unwrap(), b"payload".to_vec());
        assert_eq!(
            parts[0].headers().unwrap().get_str("content-type"),
            Some("text/plain")
        );
    }

    #[test]
    fn test_append_builds_outgoing_form() {
        let mut form = MultipartForm::new("OUT");
        form.append(Part::value("greeting", b"hi".to_vec()));
        form.append_body(Bytes::from_static(b"raw"), "raw.bin", "application/octet-stream")
            .unwrap();
        assert_eq!(
            form.append_body(Vec::<u8>::new(), "", "text/plain"),
            Err(MultipartError::EmptyFilename)
        );

        assert_eq!(form.len(), 2);
        assert_eq!(form.boundary(), b"OUT");
        assert!(form.request().is_none());
        assert_eq!(form.values(), vec![("greeting", "hi".to_string())]);

        let file = form.files().next().unwrap();
        assert_eq!(file.name(), None);
        assert_eq!(file.filename(), Some("raw.bin"));
        assert_eq!(file.bytes().unwrap(), b"raw".to_vec());
    }
}
