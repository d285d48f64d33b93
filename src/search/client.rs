use std::env;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, SearchDocument, SearchQuery, SearchResponse};
use crate::endpoint::{ApiKey, encode_segment, non_empty, resolve_base_url};
use crate::text::truncate_chars;

const API_VERSION: &str = "2023-07-01-Preview";
const HOST_SUFFIX: &str = "search.windows.net";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(
        "search service not configured: set AZURE_SEARCH_SERVICE (or AZURE_SEARCH_ENDPOINT), AZURE_SEARCH_INDEX and AZURE_SEARCH_KEY"
    )]
    NotConfigured,

    #[error("search rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("search API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("search network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("search document has no string field '{0}'")]
    MissingField(String),
}

/// Abstraction over the document index.
/// Implemented by `AzureSearchClient` for production; mock implementations used in tests.
pub trait SearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError>;
}

/// Client for the Azure Cognitive Search documents API.
#[derive(Clone, Debug)]
pub struct AzureSearchClient {
    http: Client,
    api_key: ApiKey,
    base_url: String,
    index: String,
}

impl AzureSearchClient {
    pub fn from_env(http: Client) -> Result<Self, SearchError> {
        Self::from_lookup(http, |name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        http: Client,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SearchError> {
        let base_url = resolve_base_url(
            &lookup,
            "AZURE_SEARCH_ENDPOINT",
            "AZURE_SEARCH_SERVICE",
            HOST_SUFFIX,
        )
        .ok_or(SearchError::NotConfigured)?;
        let index = non_empty(&lookup, "AZURE_SEARCH_INDEX").ok_or(SearchError::NotConfigured)?;
        let api_key = non_empty(&lookup, "AZURE_SEARCH_KEY").ok_or(SearchError::NotConfigured)?;
        Ok(Self {
            http,
            api_key: ApiKey::new(&api_key),
            base_url,
            index,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str, index: &str) -> Self {
        Self {
            http,
            api_key: ApiKey::new("test-key"),
            base_url: base_url.to_string(),
            index: index.to_string(),
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={API_VERSION}",
            self.base_url,
            encode_segment(&self.index)
        )
    }
}

impl SearchClient for AzureSearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
        let response = self
            .http
            .post(self.search_url())
            .header("api-key", self.api_key.as_str())
            .header("User-Agent", crate::USER_AGENT)
            .json(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("search service rate limited");
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<SearchResponse>(&text)
                && let Some(err) = &body.error
            {
                let classified = classify_api_error(status.as_u16(), err);
                warn!(error = %classified, "search API error");
                return Err(classified);
            }
            warn!(status = %status, "search API error (no structured body)");
            return Err(SearchError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {}", truncate_chars(&text, 200)),
            });
        }

        let body: SearchResponse = response.json().await?;
        debug!(index = %self.index, hits = body.value.len(), "search complete");
        Ok(body.value)
    }
}

fn classify_api_error(status: u16, err: &ApiError) -> SearchError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());
    let message = match &err.code {
        Some(code) if !code.is_empty() => format!("{code}: {message}"),
        _ => message,
    };
    SearchError::Api {
        code: status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::lookup_from;

    #[test]
    fn from_lookup_requires_index_and_key() {
        let vars = [("AZURE_SEARCH_SERVICE", "contoso"), ("AZURE_SEARCH_KEY", "k")];
        let err = AzureSearchClient::from_lookup(Client::new(), lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, SearchError::NotConfigured));

        let vars = [("AZURE_SEARCH_SERVICE", "contoso"), ("AZURE_SEARCH_INDEX", "gptkb")];
        let err = AzureSearchClient::from_lookup(Client::new(), lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, SearchError::NotConfigured));
    }

    #[test]
    fn search_url_uses_service_host_and_api_version() {
        let vars = [
            ("AZURE_SEARCH_SERVICE", "contoso"),
            ("AZURE_SEARCH_INDEX", "gptkb"),
            ("AZURE_SEARCH_KEY", "k"),
        ];
        let client = AzureSearchClient::from_lookup(Client::new(), lookup_from(&vars)).unwrap();
        assert_eq!(
            client.search_url(),
            "https://contoso.search.windows.net/indexes/gptkb/docs/search?api-version=2023-07-01-Preview"
        );
    }

    #[test]
    fn debug_output_hides_key() {
        let client = AzureSearchClient::with_base_url(Client::new(), "http://localhost", "idx");
        let debug = format!("{client:?}");
        assert!(!debug.contains("test-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn classify_prefixes_error_code() {
        let err = ApiError {
            code: Some("InvalidRequestParameter".into()),
            message: Some("bad filter".into()),
        };
        match classify_api_error(400, &err) {
            SearchError::Api { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "InvalidRequestParameter: bad filter");
            }
            other => panic!("expected Api error, got: {other:?}"),
        }
    }
}
