//! Shepherd herds large-language-model output into shapes a program can
//! trust.
//!
//! The crate is transport-agnostic: callers implement
//! [`Transport`](ports::Transport) for whatever chat-completion backend they
//! talk to, plus a [`TokenEstimator`](ports::TokenEstimator) for its
//! tokenizer, and the [`QueryEngine`] layers orchestration on top:
//!
//! - token-budget-aware chunking of oversized inputs, with continuation
//!   markers and shared pre/post wrapping per chunk
//! - exponential-backoff retry with jitter around every transport call
//! - structurally constrained queries (numbered lists, bulleted lists,
//!   yes/no answers) with a validate-or-repair loop that re-prompts the
//!   model with explicit format instructions and escalating temperature
//! - recursive summarization that collapses multi-chunk responses into one
//!   string
//! - a refinement engine that decomposes a text into its assumptions,
//!   analyzes each from alternative perspectives, and reconciles a revision
//! - lineage tracking of every orchestration step, and a process-wide query
//!   quota guarding against runaway recursive spend
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shepherd::models::{ModelConfig, QuerySettings};
//! use shepherd::ports::CharsPerToken;
//! use shepherd::QueryEngine;
//!
//! # async fn example(transport: Arc<dyn shepherd::ports::Transport>) -> Result<(), shepherd::QueryError> {
//! let engine = QueryEngine::new(
//!     transport,
//!     Arc::new(CharsPerToken),
//!     ModelConfig::new("my-model", 8192),
//! );
//!
//! let steps = engine
//!     .query_numbered_list(QuerySettings::new("List the steps to brew tea."), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod services;

pub use domain::error::{QueryError, TransportError};
pub use domain::models;
pub use domain::ports;
pub use services::chunker::{chunk_content, ChunkBudget, TRUNCATION_MARKER};
pub use services::validator;
pub use services::{
    EngineConfig, QueryEngine, RetryPolicy, TraceNode, Tracker, DEFAULT_MAX_GUIDE_LOOPS,
    DEFAULT_MAX_QUERY_COUNT,
};
