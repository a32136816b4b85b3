//! Error types for the paper search server

use thiserror::Error;

/// Result type alias for the paper search server
pub type Result<T> = std::result::Result<T, Error>;

/// Outward message for every authentication failure.
pub const UNAUTHORIZED: &str = "unauthorized";

/// Reasons a bearer token was rejected.
///
/// The detail strings are for server-side logs only; callers always see
/// [`UNAUTHORIZED`] via [`AuthError::client_message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token structure, header, or payload could not be parsed
    #[error("malformed token: {0}")]
    Malformed(String),

    /// No key in the published key set matches the token
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Signature did not verify against any candidate key
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// Token expiry is in the past
    #[error("token expired")]
    Expired,

    /// Audience does not include the configured audience
    #[error("audience mismatch")]
    AudienceMismatch,

    /// Issuer is not the configured identity provider
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// Key set could not be fetched and none is cached
    #[error("key set unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Sanitized message safe to send to clients.
    pub fn client_message(&self) -> &'static str {
        UNAUTHORIZED
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Malformed(_) => "malformed",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::BadSignature(_) => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::Unavailable(_) => "unavailable",
        }
    }
}

/// Errors raised while scanning or searching the document root
#[derive(Error, Debug)]
pub enum SearchError {
    /// Configured root does not exist
    #[error("document root not found: {path}")]
    RootNotFound { path: String },

    /// Configured root exists but is not a directory
    #[error("{path} is not a directory")]
    NotADirectory { path: String },

    /// Query is empty after trimming
    #[error("query must not be empty")]
    EmptyQuery,

    /// File name filter is not a valid glob
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Text extraction failed for a single document
    #[error("failed to extract text from {file}: {reason}")]
    ExtractionFailed { file: String, reason: String },

    /// Invalid PDF file
    #[error("invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (absolute paths, library errors) are omitted.
    pub fn client_message(&self) -> String {
        match self {
            SearchError::RootNotFound { .. } => "Document directory does not exist".to_string(),
            SearchError::NotADirectory { .. } => "Document path is not a directory".to_string(),
            SearchError::EmptyQuery => "Query must not be empty".to_string(),
            SearchError::InvalidPattern { pattern, .. } => {
                format!("Invalid file name pattern: {}", pattern)
            }
            SearchError::ExtractionFailed { .. }
            | SearchError::InvalidPdf { .. }
            | SearchError::Pdfium { .. } => "Could not extract text".to_string(),
            SearchError::Io(_) => "I/O error".to_string(),
        }
    }
}

/// Top-level error for the server
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Search(#[from] SearchError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn client_message(&self) -> String {
        match self {
            Error::Auth(e) => e.client_message().to_string(),
            Error::Search(e) => e.client_message(),
            Error::Config(_) => "Server misconfigured".to_string(),
        }
    }
}
