//! Retrieve-then-read: fetch the top documents from the index, pack them into
//! a few-shot prompt, and let the completion model answer from that context.

use tracing::{debug, info, warn};

use super::{AnswerPayload, Approach, ApproachError, Overrides};
use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::search::{QueryType, SearchClient, SearchDocument, SearchError, SearchQuery};
use crate::text::{nonewlines, render_template, to_html_breaks, truncate_chars};

/// Context beyond this many characters is dropped to stay under the model's input limit.
pub const MAX_CONTEXT_CHARS: usize = 1000;
pub const MAX_TOKENS: u32 = 1024;

const QUERY_LANGUAGE: &str = "en-us";
const QUERY_SPELLER: &str = "lexicon";
const SEMANTIC_CONFIGURATION: &str = "default";
const CAPTIONS_MODE: &str = "extractive|highlight-false";
const CAPTION_SEPARATOR: &str = " . ";

pub const DEFAULT_TEMPLATE: &str = "You are an intelligent assistant helping Contoso Inc employees with their healthcare plan questions and employee handbook questions. \
Use 'you' to refer to the individual asking the questions even if they ask with 'I'. \
Answer the following question using only the data provided in the sources below. \
For tabular information return it as an html table. Do not return markdown format. \
Each source has a name followed by colon and the actual information, always include the source name for each fact you use in the response. \
If you cannot answer using the sources below, say you don't know. \n
###
Question: 'What is the deductible for the employee plan for a visit to Overlake in Bellevue?'

Sources:
info1.txt: deductibles depend on whether you are in-network or out-of-network. In-network deductibles are $500 for employee and $1000 for family. Out-of-network deductibles are $1000 for employee and $2000 for family.
info2.pdf: Overlake is in-network for the employee plan.
info3.pdf: Overlake is the name of the area that includes a park and ride near Bellevue.
info4.pdf: In-network institutions include Overlake, Swedish and others in the region

Answer:
In-network deductibles are $500 for employee and $1000 for family [info1.txt] and Overlake is in-network for the employee plan [info2.pdf][info4.pdf].

###
Question: '{q}'?

Sources:
{retrieved}

Answer:
";

pub struct RetrieveThenRead<S, C> {
    search: S,
    completion: C,
    deployment: String,
    sourcepage_field: String,
    content_field: String,
}

impl<S: SearchClient, C: CompletionClient> RetrieveThenRead<S, C> {
    pub fn new(
        search: S,
        completion: C,
        deployment: impl Into<String>,
        sourcepage_field: impl Into<String>,
        content_field: impl Into<String>,
    ) -> Self {
        let this = Self {
            search,
            completion,
            deployment: deployment.into(),
            sourcepage_field: sourcepage_field.into(),
            content_field: content_field.into(),
        };
        info!(
            deployment = %this.deployment,
            sourcepage_field = %this.sourcepage_field,
            content_field = %this.content_field,
            "retrieve-then-read approach ready"
        );
        this
    }

    fn build_query(&self, question: &str, overrides: &Overrides, use_captions: bool) -> SearchQuery {
        let mut query = SearchQuery::keyword(question, overrides.category_filter(), overrides.top());
        if overrides.semantic_ranker() {
            query.query_type = QueryType::Semantic;
            query.query_language = Some(QUERY_LANGUAGE.to_string());
            query.speller = Some(QUERY_SPELLER.to_string());
            query.semantic_configuration = Some(SEMANTIC_CONFIGURATION.to_string());
            query.captions = use_captions.then(|| CAPTIONS_MODE.to_string());
        }
        query
    }

    fn format_document(&self, doc: &SearchDocument, use_captions: bool) -> Result<String, SearchError> {
        let source = doc
            .field_str(&self.sourcepage_field)
            .ok_or_else(|| SearchError::MissingField(self.sourcepage_field.clone()))?;

        let body = if use_captions {
            match &doc.captions {
                Some(captions) => captions
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(CAPTION_SEPARATOR),
                None => {
                    warn!(source, "document has no captions");
                    String::new()
                }
            }
        } else {
            doc.field_str(&self.content_field)
                .ok_or_else(|| SearchError::MissingField(self.content_field.clone()))?
                .to_string()
        };

        Ok(format!("{source}: {}", nonewlines(&body)))
    }
}

impl<S: SearchClient, C: CompletionClient> Approach for RetrieveThenRead<S, C> {
    async fn run(
        &self,
        question: &str,
        overrides: &Overrides,
    ) -> Result<AnswerPayload, ApproachError> {
        let use_captions = overrides.use_semantic_captions();
        let query = self.build_query(question, overrides, use_captions);
        debug!(
            question,
            top = query.top,
            filter = ?query.filter,
            query_type = ?query.query_type,
            use_captions,
            "searching"
        );

        let docs = self.search.search(&query).await?;
        let results = docs
            .iter()
            .map(|doc| self.format_document(doc, use_captions))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(?results, "formatted search results");

        let joined = results.join("\n");
        let context = truncate_chars(&joined, MAX_CONTEXT_CHARS);
        if context.len() < joined.len() {
            debug!(
                chars = joined.chars().count(),
                kept = MAX_CONTEXT_CHARS,
                "context truncated"
            );
        }

        let template = overrides.prompt_template().unwrap_or(DEFAULT_TEMPLATE);
        let prompt = render_template(template, question, context);

        let request = CompletionRequest {
            deployment: self.deployment.clone(),
            prompt,
            temperature: overrides.temperature(),
            max_tokens: MAX_TOKENS,
            n: 1,
            stop: vec!["\n".to_string()],
        };
        let choices = self.completion.complete(&request).await?;
        let answer = choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?
            .text;

        info!(
            results = results.len(),
            answer_chars = answer.chars().count(),
            "retrieve-then-read complete"
        );

        let thoughts = format!(
            "Question:<br>{question}<br><br>Prompt:<br>{}",
            to_html_breaks(&request.prompt)
        );

        Ok(AnswerPayload {
            data_points: results,
            answer,
            thoughts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::types::Choice;
    use crate::search::types::Caption;
    use std::sync::Mutex;

    struct MockSearch {
        response: Mutex<Option<Result<Vec<SearchDocument>, SearchError>>>,
        queries: Mutex<Vec<SearchQuery>>,
    }

    impl MockSearch {
        fn with_docs(docs: Vec<SearchDocument>) -> Self {
            Self {
                response: Mutex::new(Some(Ok(docs))),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: SearchError) -> Self {
            Self {
                response: Mutex::new(Some(Err(error))),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn captured_queries(&self) -> Vec<SearchQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SearchClient for MockSearch {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchDocument>, SearchError> {
            self.queries.lock().unwrap().push(query.clone());
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(SearchError::RateLimited))
        }
    }

    struct MockCompletion {
        response: Mutex<Option<Result<Vec<Choice>, CompletionError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockCompletion {
        fn answering(text: &str) -> Self {
            Self::with_result(Ok(vec![Choice {
                text: text.to_string(),
                finish_reason: Some("stop".into()),
            }]))
        }

        fn with_result(result: Result<Vec<Choice>, CompletionError>) -> Self {
            Self {
                response: Mutex::new(Some(result)),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn captured_requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionClient for MockCompletion {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<Vec<Choice>, CompletionError> {
            self.requests.lock().unwrap().push(request.clone());
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(CompletionError::RateLimited))
        }
    }

    fn doc(page: &str, content: &str, captions: &[&str]) -> SearchDocument {
        let mut fields = serde_json::Map::new();
        fields.insert("sourcepage".into(), page.into());
        fields.insert("content".into(), content.into());
        SearchDocument {
            captions: Some(
                captions
                    .iter()
                    .map(|text| Caption {
                        text: text.to_string(),
                    })
                    .collect(),
            ),
            fields,
        }
    }

    fn approach(
        search: MockSearch,
        completion: MockCompletion,
    ) -> RetrieveThenRead<MockSearch, MockCompletion> {
        RetrieveThenRead::new(search, completion, "davinci", "sourcepage", "content")
    }

    const QUESTION: &str =
        "What is the deductible for the employee plan for a visit to Overlake in Bellevue?";

    #[tokio::test]
    async fn end_to_end_with_default_overrides() {
        let line1 = "info1.txt: In-network deductibles are $500 for employee and $1000 for family.";
        let line2 = "info2.pdf: Overlake is in-network for the employee plan.";
        let search = MockSearch::with_docs(vec![
            doc(
                "info1.txt",
                "raw content one",
                &["In-network deductibles are $500 for employee and $1000 for family."],
            ),
            doc(
                "info2.pdf",
                "raw content two",
                &["Overlake is in-network for the employee plan."],
            ),
        ]);
        let completion = MockCompletion::answering("The deductible is $500 [info1.txt].");
        let rtr = approach(search, completion);

        let payload = rtr.run(QUESTION, &Overrides::default()).await.unwrap();

        let queries = rtr.search.captured_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], SearchQuery::keyword(QUESTION, None, 3));

        let requests = rtr.completion.captured_requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.deployment, "davinci");
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.n, 1);
        assert_eq!(request.stop, vec!["\n".to_string()]);
        assert_eq!(request.temperature, 0.3);
        assert!(request.prompt.contains(&format!("Question: '{QUESTION}'?")));
        assert!(
            request
                .prompt
                .contains(&format!("Sources:\n{line1}\n{line2}\n\nAnswer:\n")),
            "prompt: {}",
            request.prompt
        );

        assert_eq!(payload.data_points, vec![line1.to_string(), line2.to_string()]);
        assert_eq!(payload.answer, "The deductible is $500 [info1.txt].");
    }

    #[tokio::test]
    async fn captions_are_joined_and_newlines_stripped() {
        let search = MockSearch::with_docs(vec![doc(
            "handbook.pdf",
            "unused",
            &["first\nline", "second\r\nline"],
        )]);
        let rtr = approach(search, MockCompletion::answering("ok"));

        let payload = rtr.run("q", &Overrides::default()).await.unwrap();

        assert_eq!(payload.data_points, vec!["handbook.pdf: first line . second  line"]);
    }

    #[tokio::test]
    async fn truthy_semantic_captions_uses_raw_content() {
        let search = MockSearch::with_docs(vec![doc("benefits.pdf", "raw\nbody text", &["caption"])]);
        let rtr = approach(search, MockCompletion::answering("ok"));
        let overrides = Overrides {
            semantic_captions: Some(true),
            ..Default::default()
        };

        let payload = rtr.run("q", &overrides).await.unwrap();

        assert_eq!(payload.data_points, vec!["benefits.pdf: raw body text"]);
    }

    #[tokio::test]
    async fn semantic_ranker_sets_semantic_query_options() {
        let rtr = approach(MockSearch::with_docs(vec![]), MockCompletion::answering("ok"));
        let overrides = Overrides {
            semantic_ranker: Some(true),
            top: Some(5),
            exclude_category: Some("A's".into()),
            ..Default::default()
        };

        rtr.run("q", &overrides).await.unwrap();

        let query = &rtr.search.captured_queries()[0];
        assert_eq!(query.query_type, QueryType::Semantic);
        assert_eq!(query.query_language.as_deref(), Some("en-us"));
        assert_eq!(query.speller.as_deref(), Some("lexicon"));
        assert_eq!(query.semantic_configuration.as_deref(), Some("default"));
        assert_eq!(query.captions.as_deref(), Some("extractive|highlight-false"));
        assert_eq!(query.top, 5);
        assert_eq!(query.filter.as_deref(), Some("category ne 'A''s'"));
    }

    #[tokio::test]
    async fn semantic_ranker_without_captions_omits_caption_mode() {
        let rtr = approach(MockSearch::with_docs(vec![]), MockCompletion::answering("ok"));
        let overrides = Overrides {
            semantic_ranker: Some(true),
            semantic_captions: Some(true),
            ..Default::default()
        };

        rtr.run("q", &overrides).await.unwrap();

        let query = &rtr.search.captured_queries()[0];
        assert_eq!(query.query_type, QueryType::Semantic);
        assert_eq!(query.captions, None);
    }

    #[tokio::test]
    async fn context_is_truncated_to_limit() {
        let long = "x".repeat(300);
        let docs = (0..10)
            .map(|i| doc(&format!("p{i}.txt"), &long, &[long.as_str()]))
            .collect();
        let rtr = approach(MockSearch::with_docs(docs), MockCompletion::answering("ok"));
        let overrides = Overrides {
            prompt_template: Some("{retrieved}".into()),
            ..Default::default()
        };

        let payload = rtr.run("q", &overrides).await.unwrap();

        let prompt = &rtr.completion.captured_requests()[0].prompt;
        assert_eq!(prompt.chars().count(), MAX_CONTEXT_CHARS);
        assert!(prompt.starts_with("p0.txt: xxx"));
        assert_eq!(payload.data_points.len(), 10);
        assert!(payload.data_points.iter().all(|p| p.len() > 300));
    }

    #[tokio::test]
    async fn custom_template_and_temperature_are_used() {
        let rtr = approach(
            MockSearch::with_docs(vec![doc("a.txt", "", &["fact"])]),
            MockCompletion::answering("ok"),
        );
        let overrides = Overrides {
            prompt_template: Some("Q={q}\nS={retrieved}".into()),
            temperature: Some(0.9),
            ..Default::default()
        };

        rtr.run("why?", &overrides).await.unwrap();

        let request = &rtr.completion.captured_requests()[0];
        assert_eq!(request.prompt, "Q=why?\nS=a.txt: fact");
        assert_eq!(request.temperature, 0.9);
    }

    #[tokio::test]
    async fn thoughts_render_question_and_prompt_with_breaks() {
        let rtr = approach(
            MockSearch::with_docs(vec![doc("a.txt", "", &["fact"])]),
            MockCompletion::answering("ok"),
        );
        let overrides = Overrides {
            prompt_template: Some("Q={q}\nS={retrieved}".into()),
            ..Default::default()
        };

        let payload = rtr.run("why?", &overrides).await.unwrap();

        assert_eq!(
            payload.thoughts,
            "Question:<br>why?<br><br>Prompt:<br>Q=why?<br>S=a.txt: fact"
        );
        assert!(!payload.thoughts.contains('\n'));
    }

    #[tokio::test]
    async fn missing_captions_yield_empty_body() {
        let mut d = doc("a.txt", "content", &[]);
        d.captions = None;
        let rtr = approach(MockSearch::with_docs(vec![d]), MockCompletion::answering("ok"));

        let payload = rtr.run("q", &Overrides::default()).await.unwrap();

        assert_eq!(payload.data_points, vec!["a.txt: "]);
    }

    #[tokio::test]
    async fn missing_sourcepage_is_search_failure() {
        let mut d = doc("a.txt", "content", &["c"]);
        d.fields.remove("sourcepage");
        let rtr = approach(MockSearch::with_docs(vec![d]), MockCompletion::answering("ok"));

        let err = rtr.run("q", &Overrides::default()).await.unwrap_err();

        assert!(matches!(
            err,
            ApproachError::Search(SearchError::MissingField(ref f)) if f == "sourcepage"
        ));
        assert!(rtr.completion.captured_requests().is_empty());
    }

    #[tokio::test]
    async fn missing_content_without_captions_is_search_failure() {
        let mut d = doc("a.txt", "content", &["c"]);
        d.fields.remove("content");
        let rtr = approach(MockSearch::with_docs(vec![d]), MockCompletion::answering("ok"));
        let overrides = Overrides {
            semantic_captions: Some(true),
            ..Default::default()
        };

        let err = rtr.run("q", &overrides).await.unwrap_err();

        assert!(matches!(
            err,
            ApproachError::Search(SearchError::MissingField(ref f)) if f == "content"
        ));
        assert!(rtr.completion.captured_requests().is_empty());
    }

    #[tokio::test]
    async fn search_error_propagates_without_generation() {
        let rtr = approach(
            MockSearch::failing(SearchError::Api {
                code: 503,
                message: "unavailable".into(),
            }),
            MockCompletion::answering("ok"),
        );

        let err = rtr.run("q", &Overrides::default()).await.unwrap_err();

        assert!(matches!(err, ApproachError::Search(SearchError::Api { code: 503, .. })));
        assert!(err.to_string().starts_with("search unavailable"));
        assert!(rtr.completion.captured_requests().is_empty());
    }

    #[tokio::test]
    async fn generation_error_propagates() {
        let rtr = approach(
            MockSearch::with_docs(vec![]),
            MockCompletion::with_result(Err(CompletionError::RateLimited)),
        );

        let err = rtr.run("q", &Overrides::default()).await.unwrap_err();

        assert!(matches!(err, ApproachError::Generation(CompletionError::RateLimited)));
        assert!(err.to_string().starts_with("generation unavailable"));
    }

    #[tokio::test]
    async fn empty_choices_is_generation_failure() {
        let rtr = approach(
            MockSearch::with_docs(vec![]),
            MockCompletion::with_result(Ok(vec![])),
        );

        let err = rtr.run("q", &Overrides::default()).await.unwrap_err();

        assert!(matches!(
            err,
            ApproachError::Generation(CompletionError::EmptyResponse)
        ));
    }

    #[test]
    fn default_template_has_both_placeholders() {
        assert!(DEFAULT_TEMPLATE.contains("Question: '{q}'?"));
        assert!(DEFAULT_TEMPLATE.contains("Sources:\n{retrieved}\n\nAnswer:\n"));
    }
}
