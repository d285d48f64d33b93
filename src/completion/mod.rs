//! Answer generation through the hosted completion model.

pub mod client;
pub mod types;

pub use client::{AzureOpenAiClient, CompletionClient, CompletionError};
pub use types::CompletionRequest;
