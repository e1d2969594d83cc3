//! Port traits: the capabilities callers plug into the engine.

pub mod estimator;
pub mod transport;

pub use estimator::{CharsPerToken, TokenEstimator, CHARS_PER_TOKEN};
pub use transport::{Completion, CompletionOptions, Message, Transport};
