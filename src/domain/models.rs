//! Configuration records and result shapes for query orchestration.
//!
//! Every public operation takes an explicit settings struct with optional
//! fields and documented defaults, resolved once at the operation's entry
//! point. Nothing here is merged from untyped maps.

use std::fmt;
use std::str::FromStr;

use super::error::QueryError;

/// Default nucleus-sampling value applied when the caller does not override it.
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Model configuration owned by the query engine.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Opaque model identifier, forwarded to the transport untouched.
    pub model: String,

    /// Total token window of the model. Chunking and response-token clamping
    /// both derive from this figure.
    pub max_model_tokens: usize,
}

impl ModelConfig {
    /// Create a model configuration.
    ///
    /// # Panics
    /// Panics if `max_model_tokens` is zero.
    pub fn new(model: impl Into<String>, max_model_tokens: usize) -> Self {
        assert!(max_model_tokens > 0, "max_model_tokens must be greater than 0");
        Self {
            model: model.into(),
            max_model_tokens,
        }
    }
}

/// Automatic refinement applied to each per-chunk result of a query.
///
/// The refinement output is diagnostic only: it is logged, not substituted
/// into the returned results. Call [`improve`](crate::QueryEngine::improve)
/// directly to obtain revised text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImprovePolicy {
    /// Number of refinement passes. Zero disables the pass entirely.
    pub passes: u32,

    /// Keep the revised text no longer than the original.
    pub maintain_length: bool,
}

/// Settings for a single query operation.
///
/// `primary_content` is the only required field. Everything else defaults as
/// documented on each field.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// The content to process. Must be non-empty.
    pub primary_content: String,

    /// Text prepended to every chunk, separated by a newline.
    pub pre_content: Option<String>,

    /// Text appended to every chunk, separated by a newline.
    pub post_content: Option<String>,

    /// System instruction sent ahead of the user chunk.
    pub system_prompt: Option<String>,

    /// Cap on response tokens per call, clamped to the model window.
    /// Defaults to half the model window when unset.
    pub max_query_response_tokens: Option<usize>,

    /// Sampling temperature. Forwarded only when set.
    pub temperature: Option<f32>,

    /// Nucleus sampling value. Defaults to [`DEFAULT_TOP_P`].
    pub top_p: Option<f32>,

    /// Collapse multi-chunk results into a single summary string.
    pub summarize: bool,

    /// Diagnostic refinement of each per-chunk result.
    pub improve: ImprovePolicy,
}

impl QuerySettings {
    /// Create settings with the documented defaults around `primary_content`.
    pub fn new(primary_content: impl Into<String>) -> Self {
        Self {
            primary_content: primary_content.into(),
            pre_content: None,
            post_content: None,
            system_prompt: None,
            max_query_response_tokens: None,
            temperature: None,
            top_p: Some(DEFAULT_TOP_P),
            summarize: false,
            improve: ImprovePolicy::default(),
        }
    }

    /// Set the wrapping text prepended to every chunk.
    pub fn with_pre_content(mut self, pre_content: impl Into<String>) -> Self {
        self.pre_content = Some(pre_content.into());
        self
    }

    /// Set the wrapping text appended to every chunk.
    pub fn with_post_content(mut self, post_content: impl Into<String>) -> Self {
        self.post_content = Some(post_content.into());
        self
    }

    /// Set the system instruction.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Cap the response tokens per call.
    pub fn with_max_response_tokens(mut self, tokens: usize) -> Self {
        self.max_query_response_tokens = Some(tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the nucleus sampling value.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Collapse multi-chunk results into one summary string.
    pub fn summarized(mut self) -> Self {
        self.summarize = true;
        self
    }

    /// Enable the diagnostic refinement pass.
    pub fn with_improve(mut self, improve: ImprovePolicy) -> Self {
        self.improve = improve;
        self
    }
}

/// Settings for the refinement engine.
#[derive(Debug, Clone)]
pub struct ImproveSettings {
    /// The text to refine. Must be non-empty.
    pub input: String,

    /// Number of decompose/analyze/reconcile passes. Defaults to 1.
    pub passes: u32,

    /// Shrink the revision until it is no longer than the input.
    pub maintain_length: bool,

    /// Restyle the revision until it reads like the input. Checked once,
    /// after all passes.
    pub maintain_style: bool,
}

impl ImproveSettings {
    /// Create settings with the documented defaults around `input`.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            passes: 1,
            maintain_length: false,
            maintain_style: false,
        }
    }

    /// Set the number of refinement passes.
    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    /// Shrink the revision to the input's length.
    pub fn maintain_length(mut self) -> Self {
        self.maintain_length = true;
        self
    }

    /// Restyle the revision to match the input's voice.
    pub fn maintain_style(mut self) -> Self {
        self.maintain_style = true;
        self
    }
}

/// The structural shape required of model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// Sequentially numbered list, `1. item` per line.
    Numbered,
    /// Bulleted list, `- item` per line.
    Bulleted,
    /// A bare `yes` or `no`.
    Boolean,
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintType::Numbered => "numbered",
            ConstraintType::Bulleted => "bulleted",
            ConstraintType::Boolean => "boolean",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ConstraintType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numbered" => Ok(ConstraintType::Numbered),
            "bulleted" => Ok(ConstraintType::Bulleted),
            "boolean" => Ok(ConstraintType::Boolean),
            other => Err(QueryError::UnsupportedConstraint(other.to_string())),
        }
    }
}

/// Result of a structural validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The text parsed as a list with these items.
    List(Vec<String>),
    /// The text parsed as a yes/no answer.
    Bool(bool),
    /// The text did not match the required shape.
    Invalid,
}

impl Validation {
    /// Returns true unless the text failed validation.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Validation::Invalid)
    }

    /// Consume the validation, yielding the parsed items or an empty list.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Validation::List(items) => items,
            Validation::Bool(_) | Validation::Invalid => Vec::new(),
        }
    }
}

/// Validation capability: trimmed model text in, structural verdict out.
///
/// A plain function pointer, no receiver binding. The built-in validators in
/// [`validator`](crate::services::validator) all have this shape.
pub type ValidatorFn = fn(&str) -> Validation;

/// Settings for the validate-or-repair operations (`query_valid`,
/// `query_guide_constraint`).
#[derive(Debug, Clone)]
pub struct ConstraintSettings {
    /// The underlying query.
    pub query: QuerySettings,

    /// Required output shape.
    pub constraint_type: ConstraintType,

    /// Format instruction appended to the caller's system prompt. Defaults
    /// to the fixed literal for the constraint type.
    pub format_instruction: Option<String>,

    /// Validation function. Defaults to the built-in validator for the
    /// constraint type.
    pub validation: Option<ValidatorFn>,

    /// Allowed vocabulary for list items. When set, items must match one of
    /// these entries (case-insensitive, whitespace-trimmed).
    pub constrained_choices: Option<Vec<String>>,

    /// Require exactly one list item.
    pub single_choice: bool,
}

impl ConstraintSettings {
    /// Create settings for a constraint type with all defaults.
    pub fn new(query: QuerySettings, constraint_type: ConstraintType) -> Self {
        Self {
            query,
            constraint_type,
            format_instruction: None,
            validation: None,
            constrained_choices: None,
            single_choice: false,
        }
    }

    /// Replace the format instruction literal.
    pub fn with_format_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.format_instruction = Some(instruction.into());
        self
    }

    /// Replace the validation function.
    pub fn with_validator(mut self, validation: ValidatorFn) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Restrict list items to an allowed vocabulary.
    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.constrained_choices = Some(choices);
        self
    }

    /// Require exactly one list item.
    pub fn single_choice(mut self) -> Self {
        self.single_choice = true;
        self
    }
}

/// Settings for the list-shaped entry points (`query_list`,
/// `query_numbered_list`).
#[derive(Debug, Clone)]
pub struct ListSettings {
    /// The underlying query.
    pub query: QuerySettings,

    /// Allowed vocabulary for list items.
    pub constrained_choices: Option<Vec<String>>,

    /// Require exactly one list item.
    pub single_choice: bool,

    /// Override the built-in validator.
    pub validation: Option<ValidatorFn>,
}

impl ListSettings {
    /// Create settings with all defaults around `query`.
    pub fn new(query: QuerySettings) -> Self {
        Self {
            query,
            constrained_choices: None,
            single_choice: false,
            validation: None,
        }
    }

    /// Restrict list items to an allowed vocabulary.
    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.constrained_choices = Some(choices);
        self
    }

    /// Require exactly one list item.
    pub fn single_choice(mut self) -> Self {
        self.single_choice = true;
        self
    }

    /// Override the built-in validator.
    pub fn with_validator(mut self, validation: ValidatorFn) -> Self {
        self.validation = Some(validation);
        self
    }
}

impl From<QuerySettings> for ListSettings {
    fn from(query: QuerySettings) -> Self {
        Self::new(query)
    }
}

/// Result of a query: one response per chunk, or one collapsed summary.
///
/// The shape is decided by `QuerySettings::summarize` at the call site, so
/// callers never have to sniff it at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    /// One response per input chunk, in chunk order.
    Chunks(Vec<String>),
    /// The single collapsed summary of a summarized query.
    Summary(String),
}

impl QueryOutput {
    /// The first response, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryOutput::Chunks(chunks) => chunks.first().map(String::as_str),
            QueryOutput::Summary(summary) => Some(summary),
        }
    }

    /// Number of response strings carried.
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Chunks(chunks) => chunks.len(),
            QueryOutput::Summary(_) => 1,
        }
    }

    /// True when no responses are carried.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the output into its response strings.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            QueryOutput::Chunks(chunks) => chunks,
            QueryOutput::Summary(summary) => vec![summary],
        }
    }

    /// Flatten the output to one string, joining chunk responses with `", "`.
    pub fn into_text(self) -> String {
        match self {
            QueryOutput::Chunks(chunks) => chunks.join(", "),
            QueryOutput::Summary(summary) => summary,
        }
    }
}

/// Shaped result of a validate-or-repair query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstrainedOutput {
    /// Parsed list items, original casing preserved.
    List(Vec<String>),
    /// Parsed yes/no answer.
    Bool(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_settings_defaults() {
        let settings = QuerySettings::new("content");
        assert_eq!(settings.primary_content, "content");
        assert_eq!(settings.top_p, Some(DEFAULT_TOP_P));
        assert!(settings.temperature.is_none());
        assert!(!settings.summarize);
        assert_eq!(settings.improve.passes, 0);
    }

    #[test]
    fn test_query_settings_builders() {
        let settings = QuerySettings::new("content")
            .with_system_prompt("be terse")
            .with_pre_content("pre")
            .with_post_content("post")
            .with_max_response_tokens(256)
            .with_temperature(0.3)
            .summarized();
        assert_eq!(settings.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(settings.pre_content.as_deref(), Some("pre"));
        assert_eq!(settings.post_content.as_deref(), Some("post"));
        assert_eq!(settings.max_query_response_tokens, Some(256));
        assert_eq!(settings.temperature, Some(0.3));
        assert!(settings.summarize);
    }

    #[test]
    fn test_constraint_type_from_str() {
        assert_eq!(
            "numbered".parse::<ConstraintType>().unwrap(),
            ConstraintType::Numbered
        );
        assert_eq!(
            " Bulleted ".parse::<ConstraintType>().unwrap(),
            ConstraintType::Bulleted
        );
        assert_eq!(
            "boolean".parse::<ConstraintType>().unwrap(),
            ConstraintType::Boolean
        );
        let err = "json".parse::<ConstraintType>().unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedConstraint(ref t) if t == "json"));
    }

    #[test]
    fn test_validation_helpers() {
        assert!(Validation::List(vec!["a".to_string()]).is_valid());
        assert!(Validation::Bool(false).is_valid());
        assert!(!Validation::Invalid.is_valid());
        assert_eq!(
            Validation::List(vec!["a".to_string()]).into_list(),
            vec!["a".to_string()]
        );
        assert!(Validation::Bool(true).into_list().is_empty());
    }

    #[test]
    fn test_query_output_shapes() {
        let chunks = QueryOutput::Chunks(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(chunks.first(), Some("a"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.into_text(), "a, b");

        let summary = QueryOutput::Summary("s".to_string());
        assert_eq!(summary.first(), Some("s"));
        assert_eq!(summary.clone().into_strings(), vec!["s".to_string()]);
        assert_eq!(summary.into_text(), "s");
    }

    #[test]
    #[should_panic(expected = "max_model_tokens must be greater than 0")]
    fn test_model_config_rejects_zero_window() {
        let _ = ModelConfig::new("test-model", 0);
    }
}
