use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Largest accepted request body. Leaves room for the multipart envelope and
/// text fields around a maximum-size attachment.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 110 * 1024 * 1024;
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Personal access token. Submissions fail with 500 while unset.
    pub token: Option<String>,
    pub api_url: String,
    /// `owner/repo` the issues are filed against.
    pub repo: String,
}

#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    /// Without a key the pre-check is skipped.
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub github: GitHubConfig,
    pub compliance: ComplianceConfig,
    /// Externally reachable host used for attachment links.
    pub public_domain: Option<String>,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub port: u16,
    pub max_request_bytes: usize,
    pub upstream_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            github: GitHubConfig {
                token: None,
                api_url: "https://api.github.com".to_string(),
                repo: "TSM2Institute/submissions".to_string(),
            },
            compliance: ComplianceConfig {
                api_key: None,
                api_url: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            public_domain: None,
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("."),
            port: DEFAULT_PORT,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let github = GitHubConfig {
            token: optional_string("GITHUB_PAT")?,
            api_url: optional_string("GITHUB_API_URL")?
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.github.api_url),
            repo: optional_string("GITHUB_REPO")?.unwrap_or(defaults.github.repo),
        };
        if !github.repo.contains('/') {
            return Err(anyhow!("GITHUB_REPO must have the form owner/repo"));
        }

        let compliance = ComplianceConfig {
            api_key: optional_string("OPENAI_API_KEY")?,
            api_url: optional_string("COMPLIANCE_API_URL")?
                .unwrap_or(defaults.compliance.api_url),
            model: optional_string("COMPLIANCE_MODEL")?.unwrap_or(defaults.compliance.model),
        };

        let public_domain = optional_string("PUBLIC_DOMAIN")?;
        let upload_dir = optional_string("UPLOAD_DIR")?
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);
        let static_dir = optional_string("STATIC_DIR")?
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must be a valid port number"))?,
            None => defaults.port,
        };
        let max_request_bytes = parse_optional_u64("MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_request_bytes);
        let upstream_timeout_ms =
            parse_optional_u64("UPSTREAM_TIMEOUT_MS")?.unwrap_or(defaults.upstream_timeout_ms);

        Ok(Self {
            github,
            compliance,
            public_domain,
            upload_dir,
            static_dir,
            port,
            max_request_bytes,
            upstream_timeout_ms,
        })
    }
}

fn optional_string(var: &str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("{} is not valid unicode: {}", var, err)),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match optional_string(var)? {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        None => Ok(None),
    }
}
