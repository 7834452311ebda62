//! Language-model compliance pre-check.
//!
//! The check is best effort: a missing key or empty form skips it, and every
//! upstream problem is reported as `ComplianceOutcome::Failed` so the caller
//! can carry on without an annotation.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ComplianceConfig;
use crate::util::{json_object_span, strip_code_fence};

/// Verdict shown to the submitter and appended to the issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub compliant: bool,
    pub message: String,
}

/// Why a pre-check produced no verdict, or the verdict itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceOutcome {
    Skipped(&'static str),
    Failed(String),
    Evaluated(ComplianceResult),
}

impl ComplianceOutcome {
    pub fn into_result(self) -> Option<ComplianceResult> {
        match self {
            ComplianceOutcome::Evaluated(result) => Some(result),
            ComplianceOutcome::Skipped(_) | ComplianceOutcome::Failed(_) => None,
        }
    }
}

#[async_trait::async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn check(&self, form_data: &BTreeMap<String, String>) -> ComplianceOutcome;
}

pub const INEXACT_PARSE_MESSAGE: &str =
    "Compliance check completed, but the model reply could not be parsed exactly. Manual review recommended.";

const SYSTEM_PROMPT: &str =
    "You are a strict reviewer of scientific submissions. Reply with JSON only.";

/// Build the evaluation prompt for a set of form answers.
pub fn build_prompt(form_data: &BTreeMap<String, String>) -> String {
    let mut fields = String::new();
    for (key, value) in form_data {
        fields.push_str(&format!("- {}: {}\n", key, value));
    }
    format!(
        "Evaluate the following scientific submission against four criteria:\n\
         1. It states a single, explicit claim.\n\
         2. It gives a testable falsifiability condition: an observation or result that would prove the claim wrong.\n\
         3. It avoids rhetorical, persuasive or emotive language.\n\
         4. It states the physical or cosmological scale the claim applies to.\n\
         \n\
         Submission fields:\n\
         {fields}\n\
         The submission is compliant only if all four criteria are met. \
         Respond with strictly this JSON object and nothing else:\n\
         {{\"compliant\": true or false, \"message\": \"one or two sentences explaining the verdict\"}}"
    )
}

/// Interpret the model's reply text. The verdict may be fenced or wrapped in
/// prose; replies with no readable verdict fall back to a neutral pass with a
/// note.
pub fn parse_reply(text: &str) -> ComplianceResult {
    let parsed = serde_json::from_str::<ComplianceResult>(strip_code_fence(text))
        .ok()
        .or_else(|| {
            json_object_span(text).and_then(|span| serde_json::from_str(span).ok())
        });
    match parsed {
        Some(result) => result,
        None => {
            tracing::debug!("compliance reply did not match expected JSON");
            ComplianceResult {
                compliant: true,
                message: INEXACT_PARSE_MESSAGE.to_string(),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion backed checker. One request per submission, no retry.
pub struct LlmComplianceChecker {
    api_key: Option<String>,
    url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmComplianceChecker {
    pub fn new(cfg: &ComplianceConfig, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            api_key: cfg.api_key.clone(),
            url: cfg.api_url.clone(),
            model: cfg.model.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl ComplianceChecker for LlmComplianceChecker {
    async fn check(&self, form_data: &BTreeMap<String, String>) -> ComplianceOutcome {
        let Some(key) = self.api_key.as_deref() else {
            return ComplianceOutcome::Skipped("no compliance API key configured");
        };
        if form_data.is_empty() {
            return ComplianceOutcome::Skipped("no form data submitted");
        }

        let prompt = build_prompt(form_data);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let resp = match self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, timeout = err.is_timeout(), "compliance check network error");
                return ComplianceOutcome::Failed(format!("network error: {}", err));
            }
        };
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "compliance check rejected upstream");
            return ComplianceOutcome::Failed(format!("upstream status {}", status.as_u16()));
        }
        let completion: ChatResponse = match resp.json().await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(error = %err, "compliance check returned unreadable completion");
                return ComplianceOutcome::Failed(format!("unreadable completion: {}", err));
            }
        };
        let Some(text) = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
        else {
            tracing::warn!("compliance check completion had no content");
            return ComplianceOutcome::Failed("empty completion".to_string());
        };

        ComplianceOutcome::Evaluated(parse_reply(&text))
    }
}
