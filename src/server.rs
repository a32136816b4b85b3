//! MCP Server implementation using rmcp, served over streamable HTTP behind
//! bearer token authentication.

use crate::auth::middleware::{
    protected_resource_metadata, require_bearer, AuthState, ProtectedResourceMetadata,
    VerifiedTokenExt, PROTECTED_RESOURCE_PATH,
};
use crate::auth::{HttpKeySource, JwtVerifier, KeySetCache, VerifierConfig};
use crate::config::ServerConfig;
use crate::error::SearchError;
use crate::pdf::{PdfiumExtractor, TextExtractor};
use crate::search::{
    DocumentError, DocumentScanner, SearchEngine, SearchHit, SearchReport, DEFAULT_MAX_RESULTS,
};
use anyhow::Result;
use axum::{middleware, routing::get, Router};
use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    schemars::JsonSchema,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    RoleServer, ServerHandler,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Paper search MCP server
#[derive(Clone)]
pub struct PaperServer {
    engine: Arc<SearchEngine>,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Request/Response types for search_papers
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPapersParams {
    /// Text to search for (case-insensitive)
    pub query: String,
    /// Maximum number of page hits to return (default: 100)
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Outcome of `search_papers`, serialized as one of three shapes.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchPapersResult {
    Found {
        query: String,
        results: Vec<SearchHit>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<DocumentError>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        truncated: bool,
    },
    Empty {
        message: String,
    },
    Failed {
        error: String,
    },
}

impl From<SearchReport> for SearchPapersResult {
    fn from(report: SearchReport) -> Self {
        if report.is_empty() {
            return SearchPapersResult::Empty {
                message: "no results".to_string(),
            };
        }
        SearchPapersResult::Found {
            query: report.query,
            results: report.hits,
            errors: report.errors,
            truncated: report.truncated,
        }
    }
}

// ============================================================================
// Request/Response types for list_papers
// ============================================================================

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListPapersParams {
    /// Filename pattern to filter (e.g., "smith*.pdf"). Supports glob patterns.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaperEntry {
    /// File name
    pub name: String,
    /// Path relative to the document directory
    pub path: String,
    pub size_kb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListPapersResult {
    Listed { count: usize, files: Vec<PaperEntry> },
    Failed { error: String },
}

// ============================================================================

#[tool_router]
impl PaperServer {
    pub fn new(engine: SearchEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            tool_router: Self::tool_router(),
        }
    }

    /// Search all papers for a text query
    #[tool(
        description = "Search the text of every PDF paper for a query (case-insensitive). Returns one result per matching page with the file name, 1-indexed page number, and an excerpt of about 150 characters on each side of the match. Files that cannot be read are reported in `errors` without affecting other results."
    )]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
        context: RequestContext<RoleServer>,
    ) -> String {
        tracing::info!(client_id = %caller(&context), query = %params.query, "search_papers");
        let result = self.process_search(&params).await;
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    /// List all papers
    #[tool(
        description = "List the PDF papers available for search, sorted by path, with file size in KB and last modified time. Optionally filter file names with a glob pattern such as \"smith*.pdf\"."
    )]
    async fn list_papers(
        &self,
        Parameters(params): Parameters<ListPapersParams>,
        context: RequestContext<RoleServer>,
    ) -> String {
        tracing::info!(client_id = %caller(&context), "list_papers");
        let result = self.process_list(&params).await;
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    async fn process_search(&self, params: &SearchPapersParams) -> SearchPapersResult {
        let max_results = params.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);
        match self.engine.search(&params.query, max_results).await {
            Ok(report) => {
                tracing::debug!(
                    hits = report.hits.len(),
                    errors = report.errors.len(),
                    "Search finished"
                );
                report.into()
            }
            Err(e) => {
                tracing::warn!(error = %e, "search_papers failed");
                SearchPapersResult::Failed {
                    error: e.client_message(),
                }
            }
        }
    }

    async fn process_list(&self, params: &ListPapersParams) -> ListPapersResult {
        match self.list_entries(params).await {
            Ok(files) => ListPapersResult::Listed {
                count: files.len(),
                files,
            },
            Err(e) => {
                tracing::warn!(error = %e, "list_papers failed");
                ListPapersResult::Failed {
                    error: e.client_message(),
                }
            }
        }
    }

    async fn list_entries(&self, params: &ListPapersParams) -> Result<Vec<PaperEntry>, SearchError> {
        let documents = self.engine.list_all(params.pattern.as_deref()).await?;
        let root = self.engine.scanner().root();

        Ok(documents
            .into_iter()
            .map(|doc| PaperEntry {
                name: doc.file_name(),
                path: doc.display_name(root),
                size_kb: doc.size_kb(),
                modified: doc.modified_rfc3339(),
            })
            .collect())
    }
}

/// Client id of the authenticated caller, for logs.
fn caller(context: &RequestContext<RoleServer>) -> String {
    context
        .extensions
        .get::<axum::http::request::Parts>()
        .and_then(|parts| parts.verified_token())
        .map(|token| token.client_id.clone())
        .unwrap_or_else(|| "-".to_string())
}

#[tool_handler]
impl ServerHandler for PaperServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Paper Search MCP Server searches a directory of PDF papers by text content. \
                 Use list_papers to see what is available and search_papers to find pages \
                 mentioning a query."
                    .into(),
            ),
        }
    }
}

/// Assemble the HTTP application.
///
/// `/mcp` requires a bearer token; the protected resource metadata and
/// `/health` are public.
pub fn build_router(
    server: PaperServer,
    auth: AuthState,
    metadata: ProtectedResourceMetadata,
) -> Router {
    let mcp_service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let protected = Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(middleware::from_fn_with_state(auth, require_bearer));

    let public = Router::new()
        .route(PROTECTED_RESOURCE_PATH, get(protected_resource_metadata))
        .with_state(Arc::new(metadata))
        .route("/health", get(|| async { "ok" }));

    public.merge(protected)
}

/// Run the MCP server with full configuration
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let key_source = HttpKeySource::with_timeout(&config.provider.jwks_url, config.jwks_timeout)?;
    let keys = KeySetCache::new(Arc::new(key_source))
        .with_max_age(config.jwks_max_age)
        .with_min_refresh_interval(config.jwks_min_refresh);
    let verifier = JwtVerifier::new(
        Arc::new(keys),
        VerifierConfig::new(&config.provider.issuer)
            .with_audience(config.audience.clone())
            .with_default_scopes(config.default_scopes.clone())
            .with_leeway(config.leeway_secs),
    );

    let extractor: Arc<dyn TextExtractor> = Arc::new(PdfiumExtractor::new());
    let engine = SearchEngine::new(DocumentScanner::new(&config.pdf_dir), extractor)
        .with_concurrency(config.search_concurrency);

    let auth = AuthState {
        verifier: Arc::new(verifier),
        resource_metadata_url: config.resource_metadata_url(),
    };
    let metadata = ProtectedResourceMetadata::new(
        &config.resource_url,
        &config.provider.issuer,
        config.default_scopes.clone(),
    );

    let app = build_router(PaperServer::new(engine), auth, metadata);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        resource = %config.resource_url,
        issuer = %config.provider.issuer,
        pdf_dir = %config.pdf_dir.display(),
        audience_check = config.audience.is_some(),
        "Paper search server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verifier::{TokenVerifier, VerificationResult};
    use crate::auth::VerifiedToken;
    use crate::error::AuthError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::Path;
    use tower::ServiceExt;

    struct FakeExtractor {
        pages: HashMap<String, Vec<String>>,
    }

    impl TextExtractor for FakeExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, SearchError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.pages
                .get(&name)
                .cloned()
                .ok_or_else(|| SearchError::InvalidPdf {
                    reason: "no xref table".into(),
                })
        }
    }

    fn papers_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), vec![b'x'; 2048]).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-broken").unwrap();
        std::fs::create_dir(dir.path().join("reviews")).unwrap();
        std::fs::write(dir.path().join("reviews").join("smith2021.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();
        dir
    }

    fn server(root: &Path) -> PaperServer {
        let mut pages = HashMap::new();
        pages.insert(
            "a.pdf".to_string(),
            vec!["Introduction".to_string(), "Results on the quick fox".to_string()],
        );
        pages.insert("smith2021.pdf".to_string(), vec!["A FOX review".to_string()]);
        let engine = SearchEngine::new(
            DocumentScanner::new(root),
            Arc::new(FakeExtractor { pages }),
        );
        PaperServer::new(engine)
    }

    fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn test_params_deserialization() {
        let params: SearchPapersParams = serde_json::from_str(r#"{"query": "fox"}"#).unwrap();
        assert_eq!(params.query, "fox");
        assert_eq!(params.max_results, None);

        let params: SearchPapersParams =
            serde_json::from_str(r#"{"query": "fox", "max_results": 5}"#).unwrap();
        assert_eq!(params.max_results, Some(5));

        let params: ListPapersParams = serde_json::from_str("{}").unwrap();
        assert!(params.pattern.is_none());
    }

    #[tokio::test]
    async fn test_process_search_hits_and_errors() {
        let dir = papers_dir();
        let server = server(dir.path());

        let result = server
            .process_search(&SearchPapersParams {
                query: "fox".into(),
                max_results: None,
            })
            .await;
        let json = to_json(&result);

        assert_eq!(json["query"], "fox");
        assert_eq!(json["results"][0]["file"], "a.pdf");
        assert_eq!(json["results"][0]["page"], 2);
        assert_eq!(json["results"][0]["excerpt"], "Results on the quick fox");
        assert_eq!(json["results"][1]["file"], "reviews/smith2021.pdf");
        assert_eq!(json["errors"][0]["file"], "b.pdf");
        assert_eq!(json["errors"][0]["error"], "Could not extract text");
        assert!(json.get("truncated").is_none());
    }

    #[tokio::test]
    async fn test_process_search_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let result = server
            .process_search(&SearchPapersParams {
                query: "nomatch".into(),
                max_results: None,
            })
            .await;
        assert_eq!(to_json(&result), serde_json::json!({ "message": "no results" }));
    }

    #[tokio::test]
    async fn test_process_search_truncated() {
        let dir = papers_dir();
        let server = server(dir.path());

        let result = server
            .process_search(&SearchPapersParams {
                query: "fox".into(),
                max_results: Some(1),
            })
            .await;
        let json = to_json(&result);
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
        assert_eq!(json["truncated"], true);
    }

    #[tokio::test]
    async fn test_process_search_errors_are_sanitized() {
        let server = server(Path::new("/nonexistent/secret/papers"));

        let result = server
            .process_search(&SearchPapersParams {
                query: "fox".into(),
                max_results: None,
            })
            .await;
        let json = to_json(&result);
        assert_eq!(json["error"], "Document directory does not exist");

        let result = server
            .process_search(&SearchPapersParams {
                query: "   ".into(),
                max_results: None,
            })
            .await;
        assert_eq!(to_json(&result)["error"], "Query must not be empty");
    }

    #[tokio::test]
    async fn test_process_list_sorted() {
        let dir = papers_dir();
        let server = server(dir.path());

        let json = to_json(&server.process_list(&ListPapersParams::default()).await);
        assert_eq!(json["count"], 3);
        let paths: Vec<&str> = json["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["a.pdf", "b.pdf", "reviews/smith2021.pdf"]);
        assert_eq!(json["files"][0]["name"], "a.pdf");
        assert_eq!(json["files"][0]["size_kb"], 2.0);
        assert!(json["files"][0]["modified"].is_string());
    }

    #[tokio::test]
    async fn test_process_list_pattern() {
        let dir = papers_dir();
        let server = server(dir.path());

        let json = to_json(
            &server
                .process_list(&ListPapersParams {
                    pattern: Some("smith*".into()),
                })
                .await,
        );
        assert_eq!(json["count"], 1);
        assert_eq!(json["files"][0]["name"], "smith2021.pdf");

        let json = to_json(
            &server
                .process_list(&ListPapersParams {
                    pattern: Some("[".into()),
                })
                .await,
        );
        assert_eq!(json["error"], "Invalid file name pattern: [");
    }

    #[tokio::test]
    async fn test_process_list_missing_root() {
        let server = server(Path::new("/nonexistent/papers"));
        let json = to_json(&server.process_list(&ListPapersParams::default()).await);
        assert_eq!(json["error"], "Document directory does not exist");
    }

    #[test]
    fn test_server_info() {
        let dir = tempfile::tempdir().unwrap();
        let info = server(dir.path()).get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("search_papers"));
    }

    struct RejectAll;

    #[async_trait]
    impl TokenVerifier for RejectAll {
        async fn verify(&self, _token: &str) -> VerificationResult {
            Err::<VerifiedToken, _>(AuthError::BadSignature("test".into()))
        }
    }

    fn app(root: &Path) -> Router {
        build_router(
            server(root),
            AuthState {
                verifier: Arc::new(RejectAll),
                resource_metadata_url:
                    "https://papers.example.com/.well-known/oauth-protected-resource".into(),
            },
            ProtectedResourceMetadata::new(
                "https://papers.example.com/mcp",
                "https://tenant.auth0.com/",
                vec!["openid".into()],
            ),
        )
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_metadata_is_public() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                Request::get(PROTECTED_RESOURCE_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["resource"], "https://papers.example.com/mcp");
        assert_eq!(json["authorization_servers"][0], "https://tenant.auth0.com/");
    }

    #[tokio::test]
    async fn test_mcp_requires_token() {
        let dir = tempfile::tempdir().unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::post("/mcp")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(dir.path())
            .oneshot(
                Request::post("/mcp")
                    .header(header::AUTHORIZATION, "Bearer forged.token.value")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers()[header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap()
            .contains("invalid_token"));
    }
}
