//! Question-answering approaches built on the search and completion clients.

mod overrides;
pub mod retrieve_then_read;

pub use overrides::Overrides;
pub use retrieve_then_read::RetrieveThenRead;

use serde::Serialize;

use crate::completion::CompletionError;
use crate::search::SearchError;

/// What an approach hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    /// Formatted `source: text` lines, before context truncation.
    pub data_points: Vec<String>,
    pub answer: String,
    /// Question and prompt, `<br>`-separated for display.
    pub thoughts: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApproachError {
    #[error("search unavailable: {0}")]
    Search(#[from] SearchError),

    #[error("generation unavailable: {0}")]
    Generation(#[from] CompletionError),
}

pub trait Approach {
    async fn run(
        &self,
        question: &str,
        overrides: &Overrides,
    ) -> Result<AnswerPayload, ApproachError>;
}
