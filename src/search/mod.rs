//! Document retrieval against the managed search index.

pub mod client;
pub mod types;

pub use client::{AzureSearchClient, SearchClient, SearchError};
pub use types::{QueryType, SearchDocument, SearchQuery};
