//! Domain layer: configuration records, result shapes, error taxonomy, and
//! the ports callers implement.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{QueryError, TransportError};
pub use models::{
    ConstrainedOutput, ConstraintSettings, ConstraintType, ImprovePolicy, ImproveSettings,
    ListSettings, ModelConfig, QueryOutput, QuerySettings, Validation, ValidatorFn,
};
pub use ports::{CharsPerToken, Completion, CompletionOptions, Message, TokenEstimator, Transport};
