//! Command-line and environment configuration

use crate::auth::IdentityProvider;
use crate::error::{Error, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Authenticated MCP server for searching PDF papers
#[derive(Parser, Debug, Clone)]
#[command(name = "paper-search-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Identity provider domain (e.g. tenant.us.auth0.com)
    #[arg(long, env = "AUTH0_DOMAIN")]
    pub auth_domain: String,

    /// Expected token audience; omit to accept any audience
    #[arg(long, env = "AUTH0_AUDIENCE")]
    pub audience: Option<String>,

    /// Public URL of this server; `/mcp` is appended if missing
    #[arg(long, env = "SERVER_URL", default_value = "http://localhost:8000")]
    pub server_url: String,

    /// Directory containing the PDF papers
    #[arg(long, env = "PDF_DIR", default_value = "/data/pdfs")]
    pub pdf_dir: PathBuf,

    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Scopes assumed when a token has no scope claim
    #[arg(long = "default-scope", env = "DEFAULT_SCOPES", value_delimiter = ',', default_value = "openid")]
    pub default_scopes: Vec<String>,

    /// Timeout for fetching the JWKS, in seconds
    #[arg(long, env = "JWKS_TIMEOUT_SECS", default_value_t = 10)]
    pub jwks_timeout_secs: u64,

    /// Refresh a cached JWKS older than this many seconds
    #[arg(long, env = "JWKS_MAX_AGE_SECS")]
    pub jwks_max_age_secs: Option<u64>,

    /// Minimum seconds between refreshes forced by unknown key ids
    #[arg(long, env = "JWKS_MIN_REFRESH_SECS", default_value_t = 5)]
    pub jwks_min_refresh_secs: u64,

    /// Clock leeway for token expiry, in seconds
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    pub leeway_secs: u64,

    /// Documents extracted in parallel per search
    #[arg(long, env = "SEARCH_CONCURRENCY", default_value_t = 4)]
    pub search_concurrency: usize,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub provider: IdentityProvider,
    pub audience: Option<String>,
    /// Canonical MCP endpoint URL, always ending in `/mcp`
    pub resource_url: String,
    pub pdf_dir: PathBuf,
    pub bind: SocketAddr,
    pub default_scopes: Vec<String>,
    pub jwks_timeout: Duration,
    pub jwks_max_age: Option<Duration>,
    pub jwks_min_refresh: Duration,
    pub leeway_secs: u64,
    pub search_concurrency: usize,
}

impl ServerConfig {
    /// URL of the protected resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        let base = self
            .resource_url
            .strip_suffix("/mcp")
            .unwrap_or(&self.resource_url);
        format!(
            "{}{}",
            base,
            crate::auth::middleware::PROTECTED_RESOURCE_PATH
        )
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let provider = IdentityProvider::from_domain(&cli.auth_domain)?;

        let default_scopes = cli
            .default_scopes
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            provider,
            audience: cli.audience.filter(|a| !a.trim().is_empty()),
            resource_url: normalize_resource_url(&cli.server_url),
            pdf_dir: cli.pdf_dir,
            bind: cli.bind,
            default_scopes,
            jwks_timeout: Duration::from_secs(cli.jwks_timeout_secs.max(1)),
            jwks_max_age: cli.jwks_max_age_secs.map(Duration::from_secs),
            jwks_min_refresh: Duration::from_secs(cli.jwks_min_refresh_secs),
            leeway_secs: cli.leeway_secs,
            search_concurrency: cli.search_concurrency.max(1),
        })
    }
}

/// Ensure the advertised resource URL points at the MCP endpoint.
fn normalize_resource_url(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/mcp") {
        trimmed.to_string()
    } else {
        format!("{}/mcp", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["paper-search-mcp"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_normalize_resource_url() {
        assert_eq!(normalize_resource_url("https://p.example.com"), "https://p.example.com/mcp");
        assert_eq!(normalize_resource_url("https://p.example.com/"), "https://p.example.com/mcp");
        assert_eq!(normalize_resource_url("https://p.example.com/mcp"), "https://p.example.com/mcp");
        assert_eq!(normalize_resource_url("https://p.example.com/mcp/"), "https://p.example.com/mcp");
    }

    #[test]
    fn test_config_from_flags() {
        let cli = parse(&[
            "--auth-domain",
            "tenant.auth0.com",
            "--audience",
            "https://api",
            "--server-url",
            "https://papers.example.com",
            "--pdf-dir",
            "/srv/pdfs",
            "--default-scope",
            "openid, read:papers",
            "--jwks-max-age-secs",
            "600",
        ]);
        let config = ServerConfig::try_from(cli).unwrap();

        assert_eq!(config.provider.issuer, "https://tenant.auth0.com/");
        assert_eq!(config.audience.as_deref(), Some("https://api"));
        assert_eq!(config.resource_url, "https://papers.example.com/mcp");
        assert_eq!(
            config.resource_metadata_url(),
            "https://papers.example.com/.well-known/oauth-protected-resource"
        );
        assert_eq!(config.pdf_dir, PathBuf::from("/srv/pdfs"));
        assert_eq!(config.default_scopes, vec!["openid", "read:papers"]);
        assert_eq!(config.jwks_max_age, Some(Duration::from_secs(600)));
        assert_eq!(config.jwks_timeout, Duration::from_secs(10));
        assert_eq!(config.jwks_min_refresh, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_audience_disables_check() {
        let cli = parse(&["--auth-domain", "tenant.auth0.com", "--audience", " "]);
        let config = ServerConfig::try_from(cli).unwrap();
        assert_eq!(config.audience, None);
    }

    #[test]
    fn test_domain_required() {
        let command = Cli::command();
        let domain = command
            .get_arguments()
            .find(|arg| arg.get_id() == "auth_domain")
            .unwrap();

        assert!(domain.is_required_set());
        assert_eq!(domain.get_env(), Some(std::ffi::OsStr::new("AUTH0_DOMAIN")));
        command.debug_assert();
    }
}
