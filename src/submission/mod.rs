//! Submission pipeline.
//!
//! `SubmissionService` drives one request through decoding, validation,
//! storage, the optional compliance pre-check and issue publishing. Each
//! request is independent; the only shared resource is the upload directory.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

pub mod compliance;
pub mod multipart;
pub mod publisher;
pub mod sanitize;
pub mod storage;
pub mod validate;

use self::compliance::{ComplianceChecker, ComplianceOutcome, ComplianceResult};
use self::multipart::{boundary_from_content_type, decode_form};
use self::publisher::{CreatedIssue, IssuePublisher, NewIssue};
use self::storage::{Attachment, AttachmentStore};
use self::validate::validate_pdf;

/// Body line replaced with a link to the stored PDF.
pub const PDF_PLACEHOLDER: &str = "[PDF attached]";
pub const COMPLIANCE_HEADING: &str = "### AI Compliance Pre-Check";

/// Pipeline position of a request, traced at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Validated,
    Persisted,
    ComplianceChecked,
    Composed,
    Published,
    Responded,
}

fn enter(stage: Stage) {
    tracing::debug!(stage = ?stage, "submission stage");
}

/// Plain JSON submission. Fields must be strings when present.
#[derive(Debug, Default, Deserialize)]
pub struct JsonSubmission {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// Successful response body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub html_url: String,
    pub number: u64,
    #[serde(rename = "complianceCheck", skip_serializing_if = "Option::is_none")]
    pub compliance_check: Option<ComplianceResult>,
}

impl SubmitResponse {
    fn new(issue: CreatedIssue, compliance_check: Option<ComplianceResult>) -> Self {
        Self {
            success: true,
            html_url: issue.html_url,
            number: issue.number,
            compliance_check,
        }
    }
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
}

/// Rewrite the attachment placeholder and append the pre-check section.
/// The body is returned unchanged unless both an attachment link and a
/// compliance verdict are available.
pub fn compose_body(
    body: &str,
    attachment: Option<(&str, &str)>,
    compliance: Option<&ComplianceResult>,
) -> String {
    let (Some((name, url)), Some(result)) = (attachment, compliance) else {
        return body.to_string();
    };

    let mut composed = body
        .split('\n')
        .map(|line| {
            if line.trim() == PDF_PLACEHOLDER {
                format!("**PDF Document:** [{}]({})", name, url)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let status = if result.compliant {
        "PASSED"
    } else {
        "NEEDS REVIEW"
    };
    composed.push_str(&format!(
        "\n\n---\n\n{}\n\n**Status:** {}\n\n{}\n",
        COMPLIANCE_HEADING, status, result.message
    ));
    composed
}

#[derive(Clone)]
pub struct SubmissionService {
    checker: Arc<dyn ComplianceChecker>,
    publisher: Arc<dyn IssuePublisher>,
    store: AttachmentStore,
}

impl SubmissionService {
    pub fn new(
        checker: Arc<dyn ComplianceChecker>,
        publisher: Arc<dyn IssuePublisher>,
        store: AttachmentStore,
    ) -> Self {
        Self {
            checker,
            publisher,
            store,
        }
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Process one submission. Multipart bodies go through the attachment
    /// pipeline; anything else is read as JSON and published directly.
    pub async fn handle(
        &self,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<SubmitResponse, SubmitError> {
        enter(Stage::Received);
        let result = self.route(content_type, body).await;
        enter(Stage::Responded);
        result
    }

    async fn route(
        &self,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<SubmitResponse, SubmitError> {
        if !self.publisher.is_configured() {
            return Err(SubmitError::Misconfigured(
                "GitHub PAT not configured".to_string(),
            ));
        }
        match content_type {
            Some(ct) if is_multipart(ct) => {
                let boundary = boundary_from_content_type(ct).ok_or_else(|| {
                    SubmitError::MalformedRequest("Missing multipart boundary".to_string())
                })?;
                self.submit_multipart(body, &boundary).await
            }
            _ => self.submit_json(&body).await,
        }
    }

    async fn submit_json(&self, body: &[u8]) -> Result<SubmitResponse, SubmitError> {
        let submission: JsonSubmission = serde_json::from_slice(body)
            .map_err(|_| SubmitError::MalformedRequest("Invalid JSON".to_string()))?;
        enter(Stage::Decoded);
        tracing::info!(
            content_type = "json",
            title_len = submission.title.len(),
            "submission received"
        );

        let issue = self
            .publisher
            .publish(&NewIssue::new(submission.title, submission.body))
            .await?;
        enter(Stage::Published);
        Ok(SubmitResponse::new(issue, None))
    }

    async fn submit_multipart(
        &self,
        body: Bytes,
        boundary: &str,
    ) -> Result<SubmitResponse, SubmitError> {
        let form = decode_form(&body, boundary)?;
        enter(Stage::Decoded);
        tracing::info!(
            content_type = "multipart",
            title_len = form.title.len(),
            user_info = ?form.user_info,
            form_fields = form.form_data.len(),
            "submission received"
        );

        validate_pdf(&form.file)?;
        enter(Stage::Validated);

        let attachment: Attachment = self.store.prepare(form.file);
        self.store.persist(&attachment).await?;
        enter(Stage::Persisted);

        let outcome = self.checker.check(&form.form_data).await;
        match &outcome {
            ComplianceOutcome::Evaluated(result) => {
                tracing::info!(compliant = result.compliant, "compliance check evaluated")
            }
            ComplianceOutcome::Skipped(reason) => {
                tracing::debug!(reason = *reason, "compliance check skipped")
            }
            ComplianceOutcome::Failed(reason) => {
                tracing::info!(reason = %reason, "compliance check unavailable")
            }
        }
        let compliance = outcome.into_result();
        enter(Stage::ComplianceChecked);

        let url = self.store.public_url(&attachment);
        let issue_body = compose_body(
            &form.body,
            Some((&attachment.original_filename, &url)),
            compliance.as_ref(),
        );
        enter(Stage::Composed);

        let issue = self
            .publisher
            .publish(&NewIssue::new(form.title, issue_body))
            .await?;
        enter(Stage::Published);
        Ok(SubmitResponse::new(issue, compliance))
    }
}
