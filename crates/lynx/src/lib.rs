//! Multipart form decoding and non-blocking TCP transport.
//!
//! lynx bundles two small pieces of HTTP plumbing:
//!
//! - **Multipart decoding** turns a `multipart/form-data` request body into
//!   an ordered list of named value and file parts, sharing the request's
//!   buffer instead of copying it where possible.
//! - **TCP transport** connects a non-blocking socket and hands every chunk
//!   it receives to a callback, tearing the connection down exactly once.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use lynx::prelude::*;
//!
//! let request = Arc::new(
//!     Request::new(Method::Post, "/upload")
//!         .with_header("Content-Type", "multipart/form-data; boundary=XyZ")
//!         .with_body(body),
//! );
//! if let Some(form) = request.multipart() {
//!     let title = form.lookup("title").and_then(Part::text);
//! }
//! ```
//!
//! # Crate Structure
//!
//! - [`lynx_core`]: Request model, upload sources and the multipart decoder
//! - [`lynx_http`]: Non-blocking TCP socket and client

#![forbid(unsafe_code)]

// Re-export crates
pub use lynx_core as core;
pub use lynx_http as http;

pub use bytes::Bytes;

// Re-export commonly used types
pub use lynx_core::{
    Body, BodySource, FileUpload, Headers, Method, MultipartConfig, MultipartError, MultipartForm,
    MultipartParser, Part, PartHeaders, PartKind, Request,
};
pub use lynx_http::{ConnectPolicy, SocketConfig, SocketState, TcpClient, TcpError, TcpSocket};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Body, Bytes, ConnectPolicy, FileUpload, Method, MultipartForm, Part, PartKind, Request,
        SocketConfig, TcpClient, TcpError,
    };
}
