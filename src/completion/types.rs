use serde::{Deserialize, Serialize};

/// Body of `POST /openai/deployments/{deployment}/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Routed through the URL path, not the body.
    #[serde(skip)]
    pub deployment: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub n: u32,
    pub stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Option<Vec<Choice>>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub text: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: Option<String>,
}
