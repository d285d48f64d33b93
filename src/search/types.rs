use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Simple,
    Semantic,
}

/// Body of `POST /indexes/{index}/docs/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub top: u32,
    pub query_type: QueryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_configuration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions: Option<String>,
}

impl SearchQuery {
    /// Plain keyword search.
    pub fn keyword(search: &str, filter: Option<String>, top: u32) -> Self {
        Self {
            search: search.to_string(),
            filter,
            top,
            query_type: QueryType::Simple,
            query_language: None,
            speller: None,
            semantic_configuration: None,
            captions: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub value: Vec<SearchDocument>,
    pub error: Option<ApiError>,
}

/// One hit from the index. Field names depend on the index schema, so
/// everything except the captions is kept as raw JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchDocument {
    #[serde(rename = "@search.captions", default)]
    pub captions: Option<Vec<Caption>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Caption {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: Option<String>,
}
