//! Document discovery and live text search

pub mod engine;
pub mod scanner;

pub use engine::{
    build_excerpt, DocumentError, SearchEngine, SearchHit, SearchReport, DEFAULT_MAX_RESULTS,
    EXCERPT_RADIUS,
};
pub use scanner::{DocumentHandle, DocumentScanner, Documents};
