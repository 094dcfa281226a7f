//! Multipart form data.
//!
//! `lynx-http` re-exports the decoder from `lynx-core` so callers that only
//! depend on the transport crate see the same types.

pub use lynx_core::multipart::{
    DEFAULT_MAX_PARTS, DEFAULT_MAX_TOTAL_SIZE, DEFAULT_PART_MIME, MultipartConfig,
    MultipartError, MultipartForm, MultipartParser, Part, PartHeaders, PartKind, parse_boundary,
};
