//! Content extraction: fetch a URL and normalize it into an `ExtractedRecord`.
//!
//! This crate provides:
//! - [`Extractor`]: the stateless extractor with partial-failure semantics
//! - [`fetch`]: the [`Fetcher`] seam, [`HttpFetcher`], and the bounded [`RetryPolicy`]
//! - [`html`]: best-effort page metadata parsing
//! - [`video`]: URL-shape video platform adapters

pub mod engine;
pub mod fetch;
pub mod html;
pub mod video;

pub use engine::{ExtractionError, Extractor};
pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher, RetryPolicy};
pub use html::{PageMetadata, parse_date, parse_metadata};
pub use video::{Vimeo, VideoMatch, VideoPlatform, VideoRegistry, YouTube};
