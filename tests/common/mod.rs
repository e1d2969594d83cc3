//! Shared fixtures for integration tests: a scripted transport and engine
//! builders with test-friendly budgets.

// Not every test binary exercises every fixture.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::json;

use shepherd::models::ModelConfig;
use shepherd::ports::{Completion, CompletionOptions, Message, Transport};
use shepherd::{EngineConfig, QueryEngine, RetryPolicy, TransportError};

static INIT_LOGGING: Once = Once::new();

/// Route crate logs to the test writer, honoring `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scripted transport: returns canned completions in order and records every
/// request it receives. Once the script runs dry it answers "ok".
pub struct MockTransport {
    script: Mutex<VecDeque<String>>,
    failures_before_success: AtomicU32,
    calls: AtomicU32,
    requests: Mutex<Vec<(Vec<Message>, CompletionOptions)>>,
}

impl MockTransport {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(script.into_iter().map(Into::into).collect()),
            failures_before_success: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` calls before answering the script.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_before_success.store(n, Ordering::SeqCst);
        self
    }

    /// Total calls received, including failed ones.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every successful request, in arrival order.
    pub fn requests(&self) -> Vec<(Vec<Message>, CompletionOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_before_success.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_before_success
                .store(remaining - 1, Ordering::SeqCst);
            return Err("simulated transport outage".into());
        }

        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));

        let content = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ok".to_string());
        Ok(Completion {
            content,
            usage: Some(json!({"input_tokens": 7, "output_tokens": 3})),
        })
    }
}

/// Engine over `transport` with a generous window and millisecond backoff.
pub fn test_engine(transport: Arc<MockTransport>) -> QueryEngine {
    test_engine_with(transport, EngineConfig::new(ModelConfig::new("test-model", 8_192)))
}

/// Engine over `transport` with a custom configuration, backoff forced to
/// milliseconds so retry paths stay fast.
pub fn test_engine_with(transport: Arc<MockTransport>, mut config: EngineConfig) -> QueryEngine {
    config.retry = RetryPolicy::new(config.retry.max_attempts, 1, 10);
    QueryEngine::with_config(transport, Arc::new(|text: &str| text.len()), config)
}
