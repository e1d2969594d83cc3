//! Transport port: the caller-supplied capability that actually reaches a
//! generative model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::TransportError;

/// A single message in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author ("system" or "user").
    pub role: String,

    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Build a system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Build a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call sampling options forwarded to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Maximum tokens to generate.
    pub max_tokens: usize,

    /// Sampling temperature (0.0 to 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// Response returned by a transport call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub content: String,

    /// Opaque usage metadata, recorded on the lineage trace when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

/// Port trait for the model transport.
///
/// The engine never talks to a model directly; the caller supplies an
/// implementation of this trait carrying its own authentication, wire
/// format, and network-level concerns. The engine layers budget-aware
/// chunking, exponential-backoff retry, and structural repair on top.
///
/// Implementations must be `Send + Sync`; the refinement engine fans out
/// concurrent calls against a shared reference.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an ordered message list to the model and return its completion.
    ///
    /// # Errors
    /// Any failure the backend can produce. The retrier treats every error
    /// as retryable and backs off between attempts; classification of
    /// permanent failures belongs to the transport itself.
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion, TransportError>;
}
