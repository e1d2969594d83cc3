//! The constraint guide: a bounded repair loop that re-prompts the model
//! with explicit format instructions until its output matches the required
//! structural shape, plus the constrained entry points built on it.

use tracing::{debug, warn};

use crate::domain::error::QueryError;
use crate::domain::models::{
    ConstrainedOutput, ConstraintSettings, ConstraintType, ListSettings, QuerySettings,
    Validation, ValidatorFn,
};
use crate::services::engine::QueryEngine;
use crate::services::tracker::Tracker;
use crate::services::validator;

/// Attempt budget of the repair loop itself.
const MAX_GUIDE_ATTEMPTS: u32 = 5;

/// Temperature escalation applied after each failed repair attempt.
const GUIDE_TEMPERATURE_STEP: f32 = 0.1;

/// Starting temperature for repair attempts when the caller set none.
const GUIDE_DEFAULT_TEMPERATURE: f32 = 0.7;

/// Response-token cap applied to list queries when the caller set none.
const LIST_RESPONSE_TOKENS: usize = 500;

/// Response-token cap applied to boolean queries when the caller set none.
const BOOLEAN_RESPONSE_TOKENS: usize = 100;

const NUMBERED_FORMAT_PROMPT: &str = "The response to this prompt must be in a numbered list \
    format, like so:\n1. item\n2. item\n3. item\nThe numbered list must be the entire response, \
    and the only response. Return only a numbered list.";

const BULLETED_FORMAT_PROMPT: &str = "The response to this prompt must be in a bulleted list \
    format, like so:\n- item\n- item\n- item\nThe bulleted list must be the entire response, \
    and the only response. Return only a bulleted list.";

const BOOLEAN_FORMAT_PROMPT: &str = "The response to this prompt must be yes or no, like:\nyes\n\
    or like:\nno\nThe yes or no must be the entire response.  Return only a single word: yes or \
    no.";

const REPAIR_PREAMBLE: &str = "The text does not match the required format. Please correct the \
    format based on the following formatting requirements:\n";

const BOOLEAN_PRECURSOR: &str = "Respond by choosing only \"yes\" or \"no\"\nThe output \
    strictly must be a single bullet 'yes' or 'no' depending on the answer to the question.";

/// Built-in validator for a constraint type.
fn default_validator(constraint_type: ConstraintType) -> ValidatorFn {
    match constraint_type {
        ConstraintType::Numbered => validator::numbered_list,
        ConstraintType::Bulleted => validator::bulleted_list,
        ConstraintType::Boolean => validator::yes_no,
    }
}

/// Fixed format-instruction literal for a constraint type.
fn format_prompt(constraint_type: ConstraintType) -> &'static str {
    match constraint_type {
        ConstraintType::Numbered => NUMBERED_FORMAT_PROMPT,
        ConstraintType::Bulleted => BULLETED_FORMAT_PROMPT,
        ConstraintType::Boolean => BOOLEAN_FORMAT_PROMPT,
    }
}

/// Apply the vocabulary constraint, if configured, to a structural success.
fn passes_vocabulary(result: &Validation, settings: &ConstraintSettings) -> bool {
    let Some(choices) = &settings.constrained_choices else {
        return true;
    };
    match result {
        Validation::List(items) => {
            validator::constrained_array(items, choices, settings.single_choice)
        }
        // Vocabulary constraints only make sense for list shapes.
        Validation::Bool(_) | Validation::Invalid => true,
    }
}

impl QueryEngine {
    /// Re-prompt the model with explicit format instructions until its
    /// output is structurally valid.
    ///
    /// Each attempt issues a query carrying a fixed repair instruction for
    /// the constraint type, re-validates, and — on a still-failing result —
    /// raises the temperature by 0.1 (capped at 1.0) to encourage output
    /// diversity. A structural success must also pass the vocabulary
    /// constraint, when one is configured, within the same attempt budget.
    ///
    /// # Errors
    /// [`QueryError::GuideAttemptsExhausted`] after 5 failed attempts.
    pub async fn query_guide_constraint(
        &self,
        settings: &ConstraintSettings,
        tracker: Option<&Tracker>,
    ) -> Result<Validation, QueryError> {
        match tracker {
            Some(tracker) => self.guide_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.guide_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn guide_with(
        &self,
        settings: &ConstraintSettings,
        tracker: &Tracker,
    ) -> Result<Validation, QueryError> {
        tracker.add_node("query_guide_constraint", None);

        let validate = default_validator(settings.constraint_type);
        let system_prompt = format!("{REPAIR_PREAMBLE}{}", format_prompt(settings.constraint_type));
        let mut temperature = settings
            .query
            .temperature
            .unwrap_or(GUIDE_DEFAULT_TEMPERATURE);

        for attempt in 1..=MAX_GUIDE_ATTEMPTS {
            let mut query = QuerySettings::new(settings.query.primary_content.clone())
                .with_system_prompt(system_prompt.clone())
                .with_temperature(temperature);
            query.pre_content = settings.query.pre_content.clone();
            query.post_content = settings.query.post_content.clone();
            query.max_query_response_tokens = settings.query.max_query_response_tokens;

            let output = self.query_with(query, tracker).await?;
            let text = output.first().unwrap_or("");
            temperature = (temperature + GUIDE_TEMPERATURE_STEP).min(1.0);

            let result = validate(text.trim());
            if result.is_valid() {
                if passes_vocabulary(&result, settings) {
                    debug!(attempt, "constraint guide produced valid output");
                    return Ok(result);
                }
                debug!(attempt, "output valid in shape but outside allowed vocabulary");
                continue;
            }
            debug!(attempt, next_temperature = temperature, "repair attempt still malformed");
        }

        warn!(
            attempts = MAX_GUIDE_ATTEMPTS,
            constraint = %settings.constraint_type,
            "constraint guide exhausted its attempt budget"
        );
        Err(QueryError::GuideAttemptsExhausted {
            attempts: MAX_GUIDE_ATTEMPTS,
        })
    }

    /// Query, validate, and repair until output satisfies the constraint.
    ///
    /// Calls `query`, runs the validation function on the first result, and
    /// on failure hands the request to the constraint guide; the whole
    /// cycle repeats under a safety ceiling. On success the result is shaped
    /// by the constraint type: list constraints yield the parsed items
    /// (truncated to one when `single_choice` is set), the boolean
    /// constraint yields the parsed answer.
    ///
    /// # Errors
    /// [`QueryError::GuideLoopExhausted`] when the ceiling is hit, plus any
    /// error propagated from `query` or the guide.
    pub async fn query_valid(
        &self,
        settings: ConstraintSettings,
        tracker: Option<&Tracker>,
    ) -> Result<ConstrainedOutput, QueryError> {
        match tracker {
            Some(tracker) => self.query_valid_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.query_valid_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn query_valid_with(
        &self,
        settings: ConstraintSettings,
        tracker: &Tracker,
    ) -> Result<ConstrainedOutput, QueryError> {
        tracker.add_node("query_valid", None);

        let validate = settings
            .validation
            .unwrap_or_else(|| default_validator(settings.constraint_type));
        let instruction = settings
            .format_instruction
            .clone()
            .unwrap_or_else(|| format_prompt(settings.constraint_type).to_string());

        let mut query = settings.query.clone();
        query.system_prompt = Some(match query.system_prompt.take() {
            Some(existing) => format!("{existing}{instruction}"),
            None => instruction,
        });

        // `guide_with` returns a valid result or a fatal error, so one
        // iteration settles this loop; the ceiling is a backstop in case the
        // guide is ever changed to report a non-fatal miss.
        let mut valid = None;
        for attempt in 1..=self.max_guide_loops {
            let output = self.query_with(query.clone(), tracker).await?;
            let text = output.first().unwrap_or("");

            let mut result = validate(text.trim());
            if result.is_valid() && !passes_vocabulary(&result, &settings) {
                result = Validation::Invalid;
            }
            if result.is_valid() {
                valid = Some(result);
                break;
            }

            debug!(attempt, "first-pass output invalid, invoking constraint guide");
            let guided = self.guide_with(&settings, tracker).await?;
            if guided.is_valid() {
                valid = Some(guided);
                break;
            }
        }

        let Some(result) = valid else {
            return Err(QueryError::GuideLoopExhausted {
                attempts: self.max_guide_loops,
            });
        };

        match settings.constraint_type {
            ConstraintType::Numbered | ConstraintType::Bulleted => {
                let mut items = result.into_list();
                if settings.single_choice {
                    items.truncate(1);
                }
                Ok(ConstrainedOutput::List(items))
            }
            ConstraintType::Boolean => match result {
                Validation::Bool(answer) => Ok(ConstrainedOutput::Bool(answer)),
                Validation::List(_) | Validation::Invalid => Ok(ConstrainedOutput::Bool(false)),
            },
        }
    }

    /// Query for a bulleted list, repairing malformed output as needed.
    ///
    /// Returns the parsed items with their original casing. When
    /// `constrained_choices` is set, the items are guaranteed to match the
    /// allowed vocabulary.
    pub async fn query_list(
        &self,
        settings: impl Into<ListSettings>,
        tracker: Option<&Tracker>,
    ) -> Result<Vec<String>, QueryError> {
        let settings = settings.into();
        match tracker {
            Some(tracker) => self.query_list_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.query_list_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn query_list_with(
        &self,
        settings: ListSettings,
        tracker: &Tracker,
    ) -> Result<Vec<String>, QueryError> {
        tracker.add_node("query_list", None);

        let mut choices_block = String::new();
        if let Some(choices) = &settings.constrained_choices {
            choices_block.push_str("Only the following choices are allowed in the bulleted list:\n");
            for choice in choices {
                choices_block.push_str(&format!("- {choice}\n"));
            }
            choices_block.push('\n');
        }
        let instruction = format!(
            "The response to this prompt must be in a bulleted list format, like so:\n- item\n\
            - item\n- item\nThe bulleted list must be the entire response, and the only \
            response. Return only a bulleted list. This is the most important requirement, \
            above all others.\n{choices_block}\nAdditional requirements:\n"
        );

        let mut query = settings.query;
        if query.max_query_response_tokens.is_none() {
            query.max_query_response_tokens = Some(LIST_RESPONSE_TOKENS);
        }

        let mut constraint = ConstraintSettings::new(query, ConstraintType::Bulleted)
            .with_format_instruction(instruction);
        constraint.validation = settings.validation;
        constraint.constrained_choices = settings.constrained_choices;
        constraint.single_choice = settings.single_choice;

        match self.query_valid_with(constraint, tracker).await? {
            ConstrainedOutput::List(items) => Ok(items),
            ConstrainedOutput::Bool(_) => Ok(Vec::new()),
        }
    }

    /// Query for a sequentially numbered list, repairing malformed output as
    /// needed.
    pub async fn query_numbered_list(
        &self,
        settings: impl Into<ListSettings>,
        tracker: Option<&Tracker>,
    ) -> Result<Vec<String>, QueryError> {
        let settings = settings.into();
        match tracker {
            Some(tracker) => self.query_numbered_list_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.query_numbered_list_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn query_numbered_list_with(
        &self,
        settings: ListSettings,
        tracker: &Tracker,
    ) -> Result<Vec<String>, QueryError> {
        tracker.add_node("query_numbered_list", None);

        let mut choices_block = String::new();
        if let Some(choices) = &settings.constrained_choices {
            choices_block.push_str(
                "Only the following choices are allowed in the numbered list, and they must be \
                copied verbatim, and the order can be modified. If the order is changed, the \
                number associated with the choice must be changed accordingly.  Changing the \
                choices by even one character will invalidate the output:\n",
            );
            for (position, choice) in choices.iter().enumerate() {
                choices_block.push_str(&format!("{}. {choice}\n", position + 1));
            }
            choices_block.push('\n');
        }
        let instruction = format!(
            "The response to this prompt must be in a numbered list format, like so:\n1. item\n\
            2. item\n3. item\nThe numbered list must be the entire response, and the only \
            response. Return only a numbered list.\n{choices_block}\nAdditional \
            requirements:\n"
        );

        let mut query = settings.query;
        if query.max_query_response_tokens.is_none() {
            query.max_query_response_tokens = Some(LIST_RESPONSE_TOKENS);
        }

        let mut constraint = ConstraintSettings::new(query, ConstraintType::Numbered)
            .with_format_instruction(instruction);
        constraint.validation = settings.validation;
        constraint.constrained_choices = settings.constrained_choices;
        constraint.single_choice = settings.single_choice;

        match self.query_valid_with(constraint, tracker).await? {
            ConstrainedOutput::List(items) => Ok(items),
            ConstrainedOutput::Bool(_) => Ok(Vec::new()),
        }
    }

    /// Query for a yes/no answer, repairing malformed output as needed.
    pub async fn query_boolean(
        &self,
        settings: QuerySettings,
        tracker: Option<&Tracker>,
    ) -> Result<bool, QueryError> {
        match tracker {
            Some(tracker) => self.query_boolean_with(settings, tracker).await,
            None => {
                let local = Tracker::new();
                self.query_boolean_with(settings, &local).await
            }
        }
    }

    pub(crate) async fn query_boolean_with(
        &self,
        settings: QuerySettings,
        tracker: &Tracker,
    ) -> Result<bool, QueryError> {
        tracker.add_node("query_boolean", None);

        let mut query = settings;
        if query.max_query_response_tokens.is_none() {
            query.max_query_response_tokens = Some(BOOLEAN_RESPONSE_TOKENS);
        }

        let constraint = ConstraintSettings::new(query, ConstraintType::Boolean)
            .with_format_instruction(BOOLEAN_PRECURSOR);

        match self.query_valid_with(constraint, tracker).await? {
            ConstrainedOutput::Bool(answer) => Ok(answer),
            ConstrainedOutput::List(_) => Ok(false),
        }
    }
}
