//! Byte payloads attached to multipart parts.
//!
//! A part's content is anything that can produce its bytes on demand. Decoded
//! parts carry owned in-memory buffers; parts built for outgoing forms may
//! point at files on disk, so producing the bytes is fallible.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::request::Body;

/// Default MIME type for files whose extension is unknown.
pub const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// A source of owned payload bytes.
pub trait BodySource: fmt::Debug + Send + Sync {
    /// Produce the payload as an owned buffer.
    fn to_bytes(&self) -> io::Result<Vec<u8>>;

    /// Payload length, if it is known without producing the bytes.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl BodySource for Vec<u8> {
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl BodySource for Bytes {
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.to_vec())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl BodySource for &'static [u8] {
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.to_vec())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl BodySource for Body {
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.as_bytes().map(|b| b.to_vec()).unwrap_or_default())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// A file on disk to attach to an outgoing multipart form.
///
/// The file is read lazily, every time its bytes are requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    name: String,
    mime_type: String,
    path: PathBuf,
}

impl FileUpload {
    /// Describe the file at `path`.
    ///
    /// The name is the final path component and the MIME type is inferred
    /// from the extension.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .unwrap_or(DEFAULT_FILE_MIME)
            .to_string();
        Self {
            name,
            mime_type,
            path,
        }
    }

    /// Override the file name presented in the form.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// File name presented in the form.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type of the file.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Location of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the file extension from the name.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit('.')
            .next()
            .filter(|ext| !ext.is_empty() && *ext != self.name)
    }
}

impl BodySource for FileUpload {
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn len_hint(&self) -> Option<usize> {
        let len = std::fs::metadata(&self.path).ok()?.len();
        usize::try_from(len).ok()
    }
}

/// Look up the MIME type commonly associated with a file extension.
#[must_use]
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}
