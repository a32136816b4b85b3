//! Live full-text search over the documents a [`DocumentScanner`] yields.
//!
//! Each document is extracted on a blocking thread. Up to `concurrency`
//! documents are in flight at once, and results are collected back in scan
//! order. A document that fails to extract becomes an error entry in the report
//! and never affects its siblings. Directory walks also run on blocking threads.

use crate::error::SearchError;
use crate::pdf::TextExtractor;
use crate::search::scanner::{DocumentHandle, DocumentScanner};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Characters of context kept on each side of a match.
pub const EXCERPT_RADIUS: usize = 150;

/// Marker for text cut from either end of an excerpt.
pub const ELLIPSIS: &str = "...";

pub const DEFAULT_MAX_RESULTS: usize = 100;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// First match on one page of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub file: String,
    /// 1-indexed page number
    pub page: u32,
    pub excerpt: String,
}

/// A document that could not be searched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentError {
    pub file: String,
    pub error: String,
}

/// Everything one search produced, in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub errors: Vec<DocumentError>,
    /// Hits were cut off at the requested maximum
    pub truncated: bool,
}

impl SearchReport {
    /// Neither hits nor errors: the caller gets a plain "no results".
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.errors.is_empty()
    }
}

/// Searches documents under one root.
pub struct SearchEngine {
    scanner: DocumentScanner,
    extractor: Arc<dyn TextExtractor>,
    concurrency: usize,
}

impl SearchEngine {
    pub fn new(scanner: DocumentScanner, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            scanner,
            extractor,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Maximum number of documents extracted at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn scanner(&self) -> &DocumentScanner {
        &self.scanner
    }

    /// Case-insensitive substring search, one hit per matching page.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<SearchReport, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let needle: Arc<[char]> = query.chars().map(fold).collect();
        let root = self.scanner.root().to_path_buf();
        let documents = collect_documents(self.scanner.clone()).await?;
        tracing::debug!(documents = documents.len(), "Searching documents");

        let outcomes: Vec<(String, Result<Vec<(u32, String)>, SearchError>)> =
            stream::iter(documents.into_iter().map(|doc| {
                let name = doc.display_name(&root);
                let extractor = Arc::clone(&self.extractor);
                let needle = Arc::clone(&needle);
                async move {
                    let outcome = tokio::task::spawn_blocking(move || {
                        search_document(extractor.as_ref(), &doc.path, &needle)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(SearchError::ExtractionFailed {
                            file: name.clone(),
                            reason: format!("Task join error: {}", e),
                        })
                    });
                    (name, outcome)
                }
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = SearchReport {
            query: query.to_string(),
            hits: Vec::new(),
            errors: Vec::new(),
            truncated: false,
        };

        for (file, outcome) in outcomes {
            match outcome {
                Ok(pages) => {
                    for (page, excerpt) in pages {
                        if report.hits.len() >= max_results {
                            report.truncated = true;
                            break;
                        }
                        report.hits.push(SearchHit {
                            file: file.clone(),
                            page,
                            excerpt,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "Skipping document that failed to extract");
                    report.errors.push(DocumentError {
                        file,
                        error: e.client_message(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Every document under the root, sorted by path.
    ///
    /// A non-blank `pattern` is a glob matched against file names.
    pub async fn list_all(&self, pattern: Option<&str>) -> Result<Vec<DocumentHandle>, SearchError> {
        let pattern = match pattern.map(str::trim) {
            Some(p) if !p.is_empty() => {
                Some(glob::Pattern::new(p).map_err(|e| SearchError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })?)
            }
            _ => None,
        };

        let scanner = match pattern {
            Some(pattern) => self.scanner.clone().with_pattern(Some(pattern)),
            None => self.scanner.clone(),
        };
        let mut documents = collect_documents(scanner).await?;
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(documents)
    }
}

/// Walk the scanner's tree on a blocking thread.
async fn collect_documents(scanner: DocumentScanner) -> Result<Vec<DocumentHandle>, SearchError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<DocumentHandle>, SearchError> {
        Ok(scanner.documents()?.collect())
    })
    .await
    .map_err(|e| SearchError::Io(std::io::Error::other(format!("Scan task failed: {}", e))))?
}

/// Extract a document and return `(page, excerpt)` for every page that matches.
fn search_document(
    extractor: &dyn TextExtractor,
    path: &Path,
    needle: &[char],
) -> Result<Vec<(u32, String)>, SearchError> {
    let pages = extractor.extract_pages(path)?;
    Ok(pages
        .iter()
        .enumerate()
        .filter_map(|(index, text)| {
            excerpt_folded(text, needle, EXCERPT_RADIUS).map(|excerpt| (index as u32 + 1, excerpt))
        })
        .collect())
}

/// Single-character case fold, so folded text keeps the original char offsets.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Excerpt around the first case-insensitive occurrence of `query` in `text`.
///
/// Keeps `radius` characters on each side of the match, replaces line breaks
/// with spaces, and marks cut ends with [`ELLIPSIS`].
pub fn build_excerpt(text: &str, query: &str, radius: usize) -> Option<String> {
    let needle: Vec<char> = query.chars().map(fold).collect();
    excerpt_folded(text, &needle, radius)
}

fn excerpt_folded(text: &str, needle: &[char], radius: usize) -> Option<String> {
    if needle.is_empty() {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    if needle.len() > chars.len() {
        return None;
    }

    let position = chars
        .windows(needle.len())
        .position(|window| window.iter().zip(needle).all(|(&c, &n)| fold(c) == n))?;

    let start = position.saturating_sub(radius);
    let end = (position + needle.len() + radius).min(chars.len());

    let mut excerpt = String::with_capacity(end - start + 2 * ELLIPSIS.len());
    if start > 0 {
        excerpt.push_str(ELLIPSIS);
    }
    excerpt.extend(chars[start..end].iter().map(|&c| match c {
        '\n' | '\r' => ' ',
        other => other,
    }));
    if end < chars.len() {
        excerpt.push_str(ELLIPSIS);
    }

    Some(excerpt)
}
