use thiserror::Error;

/// Error type produced by caller-supplied transports.
///
/// Transports carry whatever error their backend produces (HTTP status
/// mapping, socket failures, auth rejections); the orchestration layer only
/// needs to display and propagate it.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while orchestrating model queries
#[derive(Error, Debug)]
pub enum QueryError {
    /// Empty or malformed primary content. Fatal, never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transport retry budget exhausted. Carries the last underlying failure.
    #[error("max retries reached ({attempts}), failed to complete transport call: {cause}")]
    MaxRetriesExceeded {
        /// Number of transport calls made before giving up.
        attempts: u32,
        /// The failure returned by the final attempt.
        cause: TransportError,
    },

    /// Process-wide query ceiling hit. Signals runaway recursion or spend.
    #[error("query quota exceeded: {used} calls issued, ceiling is {max}")]
    QuotaExceeded {
        /// Calls issued so far, including the one that tripped the ceiling.
        used: u32,
        /// Configured ceiling.
        max: u32,
    },

    /// The constraint guide could not repair the output shape within its
    /// attempt budget.
    #[error("exceeded maximum attempts ({attempts}) to generate structurally valid output")]
    GuideAttemptsExhausted {
        /// Attempts consumed by the repair loop.
        attempts: u32,
    },

    /// The outer validate-or-repair loop hit its safety ceiling.
    #[error("validate-or-repair loop exhausted after {attempts} attempts")]
    GuideLoopExhausted {
        /// Attempts consumed by the outer loop.
        attempts: u32,
    },

    /// Unrecognized constraint type. Caller bug, fatal.
    #[error("unsupported constraint type: {0} (expected numbered, bulleted, or boolean)")]
    UnsupportedConstraint(String),

    /// The refinement engine was invoked without input text.
    #[error("input must be provided to the improve settings")]
    MissingInput,

    /// A convergence loop (shorten, restyle, recursive summarize) failed to
    /// settle within its iteration cap.
    #[error("{operation} did not converge within {limit} iterations")]
    IterationLimitExceeded {
        /// Which loop failed to converge.
        operation: &'static str,
        /// The iteration cap that was hit.
        limit: u32,
    },
}

impl QueryError {
    /// Returns true if this error reports an exhausted bounded loop.
    ///
    /// Exhaustion errors mean the orchestration gave up after spending its
    /// full attempt budget; they are observable by design and never
    /// swallowed. Input and parameter errors are caller bugs instead.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            QueryError::MaxRetriesExceeded { .. }
                | QueryError::QuotaExceeded { .. }
                | QueryError::GuideAttemptsExhausted { .. }
                | QueryError::GuideLoopExhausted { .. }
                | QueryError::IterationLimitExceeded { .. }
        )
    }
}
