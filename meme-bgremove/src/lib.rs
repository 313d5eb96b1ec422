//! # Meme Canvas Background Removal
//!
//! Cuts the background out of an image by calling an external segmentation
//! service once, then hands back a process-local image handle.
//!
//! ```text
//!  ImageRef ──► BackgroundRemover ──► SegmentationService (HTTP, stub, ...)
//!                      │                        │
//!                      │◄────── ImagePayload ───┘  or SegmentationError
//!                      ▼
//!               HandleRegistry ──► ImageHandle ("blob:meme/<uuid>")
//! ```
//!
//! Errors are logged and passed through untouched. Handles stay alive until
//! revoked; releasing them is the caller's job.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handle;
pub mod image;
pub mod pipeline;
pub mod service;

pub use error::SegmentationError;
pub use handle::{HandleRegistry, ImageHandle, HANDLE_URL_PREFIX};
pub use image::{sniff_content_type, ImagePayload, ImageRef};
pub use pipeline::BackgroundRemover;
pub use service::{HttpSegmentationConfig, HttpSegmentationService, SegmentationService};
