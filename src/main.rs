mod approach;
mod completion;
mod endpoint;
mod search;
mod text;

pub const USER_AGENT: &str = concat!("retrieve-read/", env!("CARGO_PKG_VERSION"));

use std::path::PathBuf;
use std::time::Duration;

use approach::{AnswerPayload, Approach, Overrides, RetrieveThenRead};
use clap::Parser;
use completion::AzureOpenAiClient;
use reqwest::Client;
use search::AzureSearchClient;
use tracing::info;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_SOURCEPAGE_FIELD: &str = "sourcepage";
const DEFAULT_CONTENT_FIELD: &str = "content";

/// Answer a question from an Azure Cognitive Search index using an Azure OpenAI completion model.
///
/// Configuration via environment variables:
/// - `AZURE_SEARCH_SERVICE` / `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_INDEX`, `AZURE_SEARCH_KEY`
/// - `AZURE_OPENAI_SERVICE` / `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_KEY`,
///   `AZURE_OPENAI_GPT_DEPLOYMENT` (default: davinci)
/// - `KB_FIELDS_SOURCEPAGE` (default: sourcepage), `KB_FIELDS_CONTENT` (default: content)
#[derive(Parser, Debug)]
#[command(name = "retrieve-read", version)]
struct Cli {
    /// Question to answer
    question: String,
    /// Number of documents to retrieve (default: 3)
    #[arg(long)]
    top: Option<u32>,
    /// Leave out documents tagged with this category
    #[arg(long)]
    exclude_category: Option<String>,
    /// Use the semantic ranker (en-us, lexicon speller)
    #[arg(long)]
    semantic_ranker: bool,
    /// Pass `semantic_captions: true`, which builds sources from raw content instead of captions.
    /// Can only switch this on; it cannot reset a `true` coming from --overrides
    #[arg(long)]
    semantic_captions: bool,
    /// Sampling temperature (default: 0.3)
    #[arg(long)]
    temperature: Option<f32>,
    /// Read the prompt template from a file; it may use {q} and {retrieved}
    #[arg(long, value_name = "PATH")]
    prompt_template_file: Option<PathBuf>,
    /// Overrides as a JSON object; the flags above take precedence
    #[arg(long, value_name = "JSON")]
    overrides: Option<String>,
    /// Print the full payload as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> Result<Overrides, Box<dyn std::error::Error>> {
        let mut overrides = match &self.overrides {
            Some(raw) => Overrides::from_json(raw)?,
            None => Overrides::default(),
        };
        if self.top.is_some() {
            overrides.top = self.top;
        }
        if self.exclude_category.is_some() {
            overrides.exclude_category = self.exclude_category.clone();
        }
        if self.semantic_ranker {
            overrides.semantic_ranker = Some(true);
        }
        if self.semantic_captions {
            overrides.semantic_captions = Some(true);
        }
        if self.temperature.is_some() {
            overrides.temperature = self.temperature;
        }
        if let Some(path) = &self.prompt_template_file {
            overrides.prompt_template = Some(std::fs::read_to_string(path)?);
        }
        Ok(overrides)
    }
}

fn field_name(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn render_plain(payload: &AnswerPayload) -> String {
    let mut output = payload.answer.trim().to_string();
    if !payload.data_points.is_empty() {
        output.push_str("\n\nSources:\n");
        for point in &payload.data_points {
            output.push_str(&format!("- {point}\n"));
        }
    }
    output
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("retrieve_read=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if cli.question.trim().is_empty() {
        return Err("question must not be empty".into());
    }
    let overrides = cli.overrides()?;

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let search = AzureSearchClient::from_env(http.clone())
        .inspect_err(|e| tracing::error!("search client not available: {e}"))?;
    let completion = AzureOpenAiClient::from_env(http)
        .inspect_err(|e| tracing::error!("completion client not available: {e}"))?;
    let deployment = completion.deployment().to_string();

    let approach = RetrieveThenRead::new(
        search,
        completion,
        deployment,
        field_name("KB_FIELDS_SOURCEPAGE", DEFAULT_SOURCEPAGE_FIELD),
        field_name("KB_FIELDS_CONTENT", DEFAULT_CONTENT_FIELD),
    );

    info!(question = %cli.question, "answering");
    let payload = approach.run(&cli.question, &overrides).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", render_plain(&payload));
    }
    Ok(())
}
