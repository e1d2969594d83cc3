//! Orchestration services layered over the domain ports.

pub mod chunker;
pub mod engine;
pub mod guide;
pub mod improve;
pub mod retry;
pub mod tracker;
pub mod validator;

pub use engine::{EngineConfig, QueryEngine, DEFAULT_MAX_GUIDE_LOOPS, DEFAULT_MAX_QUERY_COUNT};
pub use retry::RetryPolicy;
pub use tracker::{TraceNode, Tracker};
