//! The refinement engine: decompose the input into its underlying
//! assumptions, analyze each one from alternative perspectives, and
//! reconcile the analysis back into a revised text.

use futures::future::{join_all, BoxFuture};
use tracing::debug;

use crate::domain::error::QueryError;
use crate::domain::models::{ImproveSettings, ListSettings, QuerySettings};
use crate::services::engine::QueryEngine;
use crate::services::tracker::Tracker;

/// Cap on the shorten and restyle convergence loops.
const MAX_CONVERGENCE_ITERATIONS: u32 = 8;

const DECOMPOSE_PROMPT: &str = "Break the following input into a list of facts, assertions, or \
    controversial ideas assumed by the author: ";

const RECONCILE_PRE: &str = "When considering the revisions, keep in mind this analysis:";

const RECONCILE_POST: &str = "Decide on the most reasonable, accurate, and concise way to \
    modify the revised input with that information in mind.";

impl QueryEngine {
    /// Refine a text through decompose/analyze/reconcile passes.
    ///
    /// Each pass extracts the working text's underlying assumptions, fans
    /// out one perspective-taking analysis per assumption, and reconciles
    /// the collected analysis into a revised text. With `maintain_length`
    /// the revision is shortened until it is no longer than the input; with
    /// `maintain_style` it is rephrased, after all passes, until the model
    /// judges it stylistically similar to the input. Both convergence loops
    /// are capped.
    ///
    /// # Errors
    /// [`QueryError::MissingInput`] when `settings.input` is empty, and
    /// [`QueryError::IterationLimitExceeded`] when a convergence loop fails
    /// to settle.
    pub async fn improve(
        &self,
        settings: ImproveSettings,
        tracker: Option<&Tracker>,
    ) -> Result<String, QueryError> {
        match tracker {
            Some(tracker) => self.improve_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.improve_with(settings, &local).await
            }
        }
    }

    pub(crate) fn improve_with<'a>(
        &'a self,
        settings: ImproveSettings,
        tracker: &'a Tracker,
    ) -> BoxFuture<'a, Result<String, QueryError>> {
        Box::pin(async move {
            tracker.add_node("improve", None);

            if settings.input.is_empty() {
                return Err(QueryError::MissingInput);
            }

            let input = settings.input;
            let mut revised = input.clone();

            for pass in 1..=settings.passes {
                debug!(pass, passes = settings.passes, "starting refinement pass");
                revised = self.refinement_pass(&input, &revised, tracker).await?;

                if settings.maintain_length {
                    revised = self.shorten_to(&input, revised, tracker).await?;
                }
            }

            if settings.maintain_style {
                revised = self.restyle_to(&input, revised, tracker).await?;
            }

            Ok(revised)
        })
    }

    /// One decompose/analyze/reconcile pass. Every pass decomposes the
    /// original input; only the reconciliation targets the working revision.
    async fn refinement_pass(
        &self,
        input: &str,
        working: &str,
        tracker: &Tracker,
    ) -> Result<String, QueryError> {
        let decompose = QuerySettings::new(format!("Input:\n\"{input}\""))
            .with_system_prompt(DECOMPOSE_PROMPT);
        let assumptions = self
            .query_list_with(ListSettings::new(decompose), tracker)
            .await?;
        debug!(assumptions = assumptions.len(), "decomposed input");

        // One perspective-taking analysis per assumption, in parallel.
        let analyses = join_all(assumptions.iter().map(|assumption| {
            let query = QuerySettings::new(format!(
                "Consider alternative perspectives, self-reflect on alternative perspectives, \
                possibilities, mistakes, and biases, and write about them, weighing the \
                validity of each one against the original information for concern: \
                \"{assumption}\""
            ))
            .summarized();
            self.query_with(query, tracker)
        }))
        .await
        .into_iter()
        .map(|result| result.map(|output| output.into_text()))
        .collect::<Result<Vec<_>, _>>()?;

        let reconcile = QuerySettings::new(analyses.join("\n\n"))
            .with_pre_content(RECONCILE_PRE)
            .with_post_content(RECONCILE_POST)
            .with_system_prompt(format!(
                "Reconcile these considerations with the original input:\n\n{working}"
            ))
            .summarized();
        let output = self.query_with(reconcile, tracker).await?;
        Ok(output.into_text())
    }

    /// Shorten `revised` until it is no longer than `input`.
    async fn shorten_to(
        &self,
        input: &str,
        mut revised: String,
        tracker: &Tracker,
    ) -> Result<String, QueryError> {
        let mut iterations = 0;
        while revised.len() > input.len() {
            if iterations >= MAX_CONVERGENCE_ITERATIONS {
                return Err(QueryError::IterationLimitExceeded {
                    operation: "shorten",
                    limit: MAX_CONVERGENCE_ITERATIONS,
                });
            }
            iterations += 1;

            let shorten = QuerySettings::new(format!(
                "Shorten the text \"{revised}\" while keeping as much detail as possible."
            ))
            .summarized();
            revised = self.query_with(shorten, tracker).await?.into_text();
            debug!(iterations, revised_len = revised.len(), "shortened revision");
        }
        Ok(revised)
    }

    /// Rephrase `revised` until the model judges it stylistically similar to
    /// `input`.
    async fn restyle_to(
        &self,
        input: &str,
        mut revised: String,
        tracker: &Tracker,
    ) -> Result<String, QueryError> {
        let mut iterations = 0;
        loop {
            let check = QuerySettings::new(format!(
                "Is the modified text: \"{revised}\" very similar in style in flow to the \
                original text? Original text: \"{input}\""
            ));
            if self.query_boolean_with(check, tracker).await? {
                return Ok(revised);
            }

            if iterations >= MAX_CONVERGENCE_ITERATIONS {
                return Err(QueryError::IterationLimitExceeded {
                    operation: "restyle",
                    limit: MAX_CONVERGENCE_ITERATIONS,
                });
            }
            iterations += 1;

            let restyle = QuerySettings::new(format!(
                "Rephrase the text: \"{revised}\" to be as similar in style and flow to the \
                original text, while maintaining as much of the meaning as possible. Original \
                text: \"{input}\""
            ))
            .summarized();
            revised = self.query_with(restyle, tracker).await?.into_text();
            debug!(iterations, "restyled revision");
        }
    }
}
