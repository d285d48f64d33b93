use std::env;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, Choice, CompletionRequest, CompletionResponse};
use crate::endpoint::{ApiKey, encode_segment, non_empty, resolve_base_url};
use crate::text::truncate_chars;

const API_VERSION: &str = "2022-12-01";
const HOST_SUFFIX: &str = "openai.azure.com";
const DEFAULT_DEPLOYMENT: &str = "davinci";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(
        "completion service not configured: set AZURE_OPENAI_SERVICE (or AZURE_OPENAI_ENDPOINT) and AZURE_OPENAI_KEY"
    )]
    NotConfigured,

    #[error("completion rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("completion API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("completion network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("completion response contained no choices")]
    EmptyResponse,
}

/// Abstraction over the hosted text-completion model.
/// Implemented by `AzureOpenAiClient` for production; mock implementations used in tests.
pub trait CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<Choice>, CompletionError>;
}

/// Client for the Azure OpenAI completions API.
#[derive(Clone, Debug)]
pub struct AzureOpenAiClient {
    http: Client,
    api_key: ApiKey,
    base_url: String,
    deployment: String,
}

impl AzureOpenAiClient {
    pub fn from_env(http: Client) -> Result<Self, CompletionError> {
        Self::from_lookup(http, |name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        http: Client,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CompletionError> {
        let base_url = resolve_base_url(
            &lookup,
            "AZURE_OPENAI_ENDPOINT",
            "AZURE_OPENAI_SERVICE",
            HOST_SUFFIX,
        )
        .ok_or(CompletionError::NotConfigured)?;
        let api_key =
            non_empty(&lookup, "AZURE_OPENAI_KEY").ok_or(CompletionError::NotConfigured)?;
        let deployment = non_empty(&lookup, "AZURE_OPENAI_GPT_DEPLOYMENT")
            .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string());
        Ok(Self {
            http,
            api_key: ApiKey::new(&api_key),
            base_url,
            deployment,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey::new("test-key"),
            base_url: base_url.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
        }
    }

    /// Deployment configured for this client; callers put it on each request.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/completions?api-version={API_VERSION}",
            self.base_url,
            encode_segment(deployment)
        )
    }
}

impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<Choice>, CompletionError> {
        let response = self
            .http
            .post(self.completions_url(&request.deployment))
            .header("api-key", self.api_key.as_str())
            .header("User-Agent", crate::USER_AGENT)
            .json(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("completion service rate limited");
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<CompletionResponse>(&text)
                && let Some(err) = &body.error
            {
                let classified = classify_api_error(status.as_u16(), err);
                warn!(error = %classified, "completion API error");
                return Err(classified);
            }
            warn!(status = %status, "completion API error (no structured body)");
            return Err(CompletionError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {}", truncate_chars(&text, 200)),
            });
        }

        let body: CompletionResponse = response.json().await?;
        if let Some(err) = &body.error {
            let classified = classify_api_error(status.as_u16(), err);
            warn!(error = %classified, "completion API error in 200 response");
            return Err(classified);
        }

        let choices = body.choices.unwrap_or_default();
        debug!(
            deployment = %request.deployment,
            choices = choices.len(),
            finish_reason = ?choices.first().and_then(|c| c.finish_reason.as_deref()),
            "completion done"
        );
        Ok(choices)
    }
}

fn classify_api_error(status: u16, err: &ApiError) -> CompletionError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());
    if status == 429 || err.code.as_deref() == Some("429") {
        return CompletionError::RateLimited;
    }
    let message = match &err.code {
        Some(code) if !code.is_empty() => format!("{code}: {message}"),
        _ => message,
    };
    CompletionError::Api {
        code: status,
        message,
    }
}
