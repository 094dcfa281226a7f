//! Core types for the Lynx HTTP toolkit.
//!
//! This crate provides:
//! - [`Request`], [`Headers`], [`Body`] and [`Method`]
//! - [`BodySource`], the "produces owned bytes" payload contract, and
//!   [`FileUpload`] for attaching files from disk
//! - The `multipart/form-data` decoder ([`MultipartForm`], [`Part`])
//!
//! # Design Principles
//!
//! - Scanning reads the request body in place; only part payloads are copied
//! - All decode failures are total: a form decodes completely or not at all
//! - All types support `Send + Sync`

#![forbid(unsafe_code)]

pub mod multipart;
mod request;
mod upload;

pub use multipart::{
    DEFAULT_MAX_PARTS, DEFAULT_MAX_TOTAL_SIZE, DEFAULT_PART_MIME, MultipartConfig,
    MultipartError, MultipartForm, MultipartParser, Part, PartHeaders, PartKind, parse_boundary,
};
pub use request::{Body, Headers, Method, Request};
pub use upload::{BodySource, DEFAULT_FILE_MIME, FileUpload, mime_for_extension};
