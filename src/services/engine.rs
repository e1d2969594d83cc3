//! The query engine: turns a settings record into one response per chunk,
//! with retrying transport calls, lineage recording, and optional recursive
//! summarization of multi-chunk results.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::error::QueryError;
use crate::domain::models::{ImproveSettings, ModelConfig, QueryOutput, QuerySettings};
use crate::domain::ports::{CompletionOptions, Message, TokenEstimator, Transport};
use crate::services::chunker::{chunk_content, ChunkBudget};
use crate::services::retry::RetryPolicy;
use crate::services::tracker::Tracker;

/// Default process-wide ceiling on transport-bound queries per engine.
pub const DEFAULT_MAX_QUERY_COUNT: u32 = 250;

/// Default ceiling on the outer validate-or-repair loop.
pub const DEFAULT_MAX_GUIDE_LOOPS: u32 = 10;

/// Cap on recursive summarization depth.
pub(crate) const MAX_SUMMARY_DEPTH: u32 = 8;

/// Polished summaries longer than this get a paragraph-split pass.
const POLISH_SPLIT_THRESHOLD: usize = 1_500;

const COMBINATION_PROMPT: &str = "The following texts are responses based on chunks of the same \
    input text. Combine the texts into a single, overarching summary, broken into paragraphs. \
    Preserve as many details as possible and even elaborate on any vague concepts:\n\n";

const POLISH_PROMPT: &str =
    "Rephrase the following text without losing any detail, but with elaboration and \
    professional wording.";

const SEPARATION_PROMPT: &str = "Break the following text into separate paragraphs and remove \
    any duplicate or redundant information:\n\n";

/// Tunable knobs for a [`QueryEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model identity and token window.
    pub model: ModelConfig,

    /// Backoff policy wrapped around every transport call.
    pub retry: RetryPolicy,

    /// Ceiling on queries issued by this engine over its lifetime. Guards
    /// against runaway recursive refinement spend.
    pub max_query_count: u32,

    /// Ceiling on the outer validate-or-repair loop.
    pub max_guide_loops: u32,
}

impl EngineConfig {
    /// Configuration with recommended defaults around `model`.
    pub fn new(model: ModelConfig) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
            max_query_count: DEFAULT_MAX_QUERY_COUNT,
            max_guide_loops: DEFAULT_MAX_GUIDE_LOOPS,
        }
    }
}

/// Orchestrates queries against a caller-supplied transport.
///
/// Layered on the transport are: token-budget-aware chunking of oversized
/// inputs, exponential-backoff retry per call, lineage recording, recursive
/// multi-chunk summarization, structural validation with a repair loop (see
/// the constrained entry points), and the refinement engine.
pub struct QueryEngine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) estimator: Arc<dyn TokenEstimator>,
    pub(crate) model: ModelConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) max_query_count: u32,
    pub(crate) max_guide_loops: u32,
    query_count: AtomicU32,
}

impl QueryEngine {
    /// Create an engine with recommended defaults.
    pub fn new(
        transport: Arc<dyn Transport>,
        estimator: Arc<dyn TokenEstimator>,
        model: ModelConfig,
    ) -> Self {
        Self::with_config(transport, estimator, EngineConfig::new(model))
    }

    /// Create an engine with custom configuration.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        estimator: Arc<dyn TokenEstimator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            transport,
            estimator,
            model: config.model,
            retry: config.retry,
            max_query_count: config.max_query_count,
            max_guide_loops: config.max_guide_loops,
            query_count: AtomicU32::new(0),
        }
    }

    /// Queries issued by this engine so far.
    pub fn queries_issued(&self) -> u32 {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Query the model with the given settings.
    ///
    /// Oversized primary content is chunked per the model's token budget and
    /// the chunks are processed strictly in order — continuation chunks carry
    /// a truncation marker referring to prior context. Returns one response
    /// per chunk, or a single collapsed summary when `settings.summarize` is
    /// set.
    ///
    /// A lineage tracker is created when the caller supplies none.
    pub async fn query(
        &self,
        settings: QuerySettings,
        tracker: Option<&Tracker>,
    ) -> Result<QueryOutput, QueryError> {
        match tracker {
            Some(tracker) => self.query_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.query_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn query_with(
        &self,
        settings: QuerySettings,
        tracker: &Tracker,
    ) -> Result<QueryOutput, QueryError> {
        if settings.primary_content.is_empty() {
            return Err(QueryError::InvalidInput(
                "primary content must be a non-empty string".to_string(),
            ));
        }

        let used = self.query_count.fetch_add(1, Ordering::SeqCst) + 1;
        if used > self.max_query_count {
            warn!(used, max = self.max_query_count, "query quota exceeded");
            return Err(QueryError::QuotaExceeded {
                used,
                max: self.max_query_count,
            });
        }

        let max_response_tokens = match settings.max_query_response_tokens {
            Some(tokens) => tokens.min(self.model.max_model_tokens),
            None => self.model.max_model_tokens / 2,
        };

        let budget = ChunkBudget {
            max_model_tokens: self.model.max_model_tokens,
            reserved_response_tokens: max_response_tokens,
        };
        let pre = settings.pre_content.as_deref().unwrap_or("");
        let post = settings.post_content.as_deref().unwrap_or("");
        let chunks = chunk_content(
            &settings.primary_content,
            pre,
            post,
            self.estimator.as_ref(),
            &budget,
        )?;

        debug!(
            model = %self.model.model,
            chunks = chunks.len(),
            max_response_tokens,
            "dispatching query"
        );

        let options = CompletionOptions {
            max_tokens: max_response_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        };

        let mut results = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let mut messages = Vec::with_capacity(2);
            if let Some(system_prompt) = &settings.system_prompt {
                messages.push(Message::system(system_prompt.clone()));
            }
            messages.push(Message::user(chunk));

            let completion = self
                .retry
                .execute(|| self.transport.complete(&messages, &options))
                .await?;

            tracker.add_node("query", completion.usage);
            results.push(completion.content);
        }

        if settings.improve.passes > 0 {
            self.diagnostic_refinement(&settings, &results, tracker)
                .await?;
        }

        if settings.summarize {
            let summary = self.summarize_with(&results, false, tracker, 0).await?;
            return Ok(QueryOutput::Summary(summary));
        }
        Ok(QueryOutput::Chunks(results))
    }

    /// Refine each per-chunk result for observability. The revision is
    /// logged, never substituted into the returned results.
    async fn diagnostic_refinement(
        &self,
        settings: &QuerySettings,
        results: &[String],
        tracker: &Tracker,
    ) -> Result<(), QueryError> {
        for result in results {
            let improve = ImproveSettings {
                input: result.clone(),
                passes: settings.improve.passes,
                maintain_length: settings.improve.maintain_length,
                maintain_style: false,
            };
            let revised = self.improve_with(improve, tracker).await?;
            debug!(
                original_len = result.len(),
                revised_len = revised.len(),
                %revised,
                "diagnostic refinement of chunk result"
            );
        }
        Ok(())
    }

    /// Collapse a set of per-chunk completions into one summary string.
    ///
    /// A single completion is returned unchanged without any model call.
    /// Multi-chunk combinations recurse until one string remains, bounded by
    /// a depth cap. With `polish`, the summary gets a professional-rewording
    /// pass, plus a paragraph-split pass when it runs long.
    pub async fn summarize_completion_set(
        &self,
        completions: &[String],
        polish: bool,
        tracker: Option<&Tracker>,
    ) -> Result<String, QueryError> {
        match tracker {
            Some(tracker) => self.summarize_with(completions, polish, tracker, 0).await,
            None => {
                let local = Tracker::new();
                self.summarize_with(completions, polish, &local, 0).await
            }
        }
    }

    pub(crate) fn summarize_with<'a>(
        &'a self,
        completions: &'a [String],
        polish: bool,
        tracker: &'a Tracker,
        depth: u32,
    ) -> BoxFuture<'a, Result<String, QueryError>> {
        Box::pin(async move {
            tracker.add_node("summarize_completion_set", None);

            if completions.len() <= 1 {
                return completions.first().cloned().ok_or_else(|| {
                    QueryError::InvalidInput("completion set must not be empty".to_string())
                });
            }
            if depth >= MAX_SUMMARY_DEPTH {
                return Err(QueryError::IterationLimitExceeded {
                    operation: "summarize",
                    limit: MAX_SUMMARY_DEPTH,
                });
            }

            let content = completions.join("\n\n");
            let combination = self
                .query_with(
                    QuerySettings::new(content).with_system_prompt(COMBINATION_PROMPT),
                    tracker,
                )
                .await?
                .into_strings();

            let mut summary = combination
                .first()
                .cloned()
                .unwrap_or_default();

            if polish {
                summary = self
                    .query_with(
                        QuerySettings::new(summary).with_system_prompt(POLISH_PROMPT),
                        tracker,
                    )
                    .await?
                    .into_text();

                if summary.len() > POLISH_SPLIT_THRESHOLD {
                    summary = self
                        .query_with(
                            QuerySettings::new(summary).with_system_prompt(SEPARATION_PROMPT),
                            tracker,
                        )
                        .await?
                        .into_text();
                }
            }

            // The combination itself spanned multiple chunks: collapse again.
            if combination.len() > 1 {
                summary = self
                    .summarize_with(&combination, polish, tracker, depth + 1)
                    .await?;
            }

            Ok(summary)
        })
    }
}
