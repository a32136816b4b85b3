//! PDF text extraction
//!
//! Search only needs per-page text, so extraction sits behind the
//! [`TextExtractor`] capability. [`PdfiumExtractor`] is the production
//! implementation.

mod extract;

pub use extract::{PdfiumExtractor, TextExtractor};
