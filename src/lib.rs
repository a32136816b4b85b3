//! Paper Search MCP Server Library
//!
//! This crate provides authenticated MCP tools over a directory of PDF papers:
//! - `search_papers`: Case-insensitive text search across every page
//! - `list_papers`: List the PDF files under the configured directory
//!
//! Every call must carry a bearer token issued by the configured identity
//! provider and verifiable against its published JWKS.

pub mod auth;
pub mod config;
pub mod error;
pub mod pdf;
pub mod search;
pub mod server;

pub use config::{Cli, ServerConfig};
pub use error::{AuthError, Error, Result, SearchError};
pub use server::{build_router, run_server, ListPapersParams, PaperServer, SearchPapersParams};
