//! GitHub issue creation.

use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;

pub const ISSUE_LABELS: [&str; 2] = ["submission", "needs-triage"];
const USER_AGENT: &str = "TSM2-Submission-Portal";

/// Issue payload sent upstream.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            labels: ISSUE_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// The created issue as reported by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub html_url: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("GitHub PAT not configured")]
    NotConfigured,
    /// GitHub answered with a non-2xx status.
    #[error("GitHub API error: {message}")]
    Rejected { status: u16, message: String },
    /// No usable response.
    #[error("Network error: {0}")]
    Unreachable(String),
}

impl PublishError {
    pub fn status(&self) -> StatusCode {
        match self {
            PublishError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            PublishError::NotConfigured | PublishError::Unreachable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Outcome of one publish attempt. Never retried.
pub type IssueResult = Result<CreatedIssue, PublishError>;

#[async_trait::async_trait]
pub trait IssuePublisher: Send + Sync {
    /// Whether a credential is available. Checked before any work is done.
    fn is_configured(&self) -> bool;
    async fn publish(&self, issue: &NewIssue) -> IssueResult;
}

/// Pick the upstream `message` out of a JSON error body, else keep the raw text.
pub fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub struct GitHubPublisher {
    token: Option<String>,
    issues_url: String,
    client: reqwest::Client,
}

impl GitHubPublisher {
    pub fn new(cfg: &GitHubConfig, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            token: cfg.token.clone(),
            issues_url: format!("{}/repos/{}/issues", cfg.api_url, cfg.repo),
            client,
        })
    }

    pub fn issues_url(&self) -> &str {
        &self.issues_url
    }
}

#[async_trait::async_trait]
impl IssuePublisher for GitHubPublisher {
    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn publish(&self, issue: &NewIssue) -> IssueResult {
        let token = self.token.as_deref().ok_or(PublishError::NotConfigured)?;

        let resp = self
            .client
            .post(&self.issues_url)
            .header("Authorization", format!("token {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(issue)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "issue publish network error");
                PublishError::Unreachable(err.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "issue publish rejected upstream");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message: upstream_error_message(&body),
            });
        }

        let created: CreatedIssue = resp
            .json()
            .await
            .map_err(|err| PublishError::Unreachable(format!("unreadable response: {}", err)))?;
        tracing::info!(number = created.number, url = %created.html_url, "issue created");
        Ok(created)
    }
}
