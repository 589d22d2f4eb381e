//! Guards, interceptors and handlers that record what ran, in order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use switchboard_mcp::{
    handler_fn, ExecutionContext, Guard, Handler, HandlerError, HandlerResult, Interceptor,
    McpError, Next,
};

/// Shared, ordered log of execution events.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Number of recorded events equal to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

/// Guard that records `guard:<label>` and returns a fixed verdict.
pub struct RecordingGuard {
    label: String,
    allow: bool,
    journal: Journal,
}

impl RecordingGuard {
    pub fn allow(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            allow: true,
            journal: journal.clone(),
        }
    }

    pub fn deny(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            allow: false,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Guard for RecordingGuard {
    async fn can_activate(&self, _ctx: &ExecutionContext) -> Result<bool, HandlerError> {
        self.journal.record(format!("guard:{}", self.label));
        Ok(self.allow)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Guard that fails with an unauthorized error carrying its message.
pub struct FailingGuard {
    message: String,
}

impl FailingGuard {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Guard for FailingGuard {
    async fn can_activate(&self, _ctx: &ExecutionContext) -> Result<bool, HandlerError> {
        Err(McpError::Unauthorized {
            message: self.message.clone(),
            data: None,
        }
        .into())
    }
}

/// Interceptor recording `<label>:before` and then `<label>:after` or
/// `<label>:error` around the rest of the chain.
pub struct RecordingInterceptor {
    label: String,
    journal: Journal,
}

impl RecordingInterceptor {
    pub fn new(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next<'_>) -> HandlerResult {
        self.journal.record(format!("{}:before", self.label));
        let result = next.run(ctx).await;
        let outcome = if result.is_ok() { "after" } else { "error" };
        self.journal.record(format!("{}:{outcome}", self.label));
        result
    }
}

/// Interceptor calling the rest of the chain until it succeeds, at most
/// `attempts` times.
pub struct RetryInterceptor {
    attempts: usize,
}

impl RetryInterceptor {
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next<'_>) -> HandlerResult {
        let mut last = None;
        for _ in 0..self.attempts {
            match next.run(ctx).await {
                Ok(value) => return Ok(value),
                Err(err) => last = Some(err),
            }
        }
        Err(last.unwrap_or_else(|| HandlerError::msg("no attempts made")))
    }
}

/// Handler recording `handler:<label>` and returning `result` (an error
/// result becomes an ordinary failure with that message).
pub fn recording_handler(
    label: &str,
    journal: &Journal,
    result: Result<Value, &'static str>,
) -> Arc<dyn Handler> {
    let event = format!("handler:{label}");
    let journal = journal.clone();
    handler_fn(move |_| {
        journal.record(event.clone());
        result.clone().map_err(HandlerError::msg)
    })
}

/// Handler failing with `message` on the first `failures` calls and
/// returning `value` afterwards.
pub fn flaky_handler(failures: usize, message: &'static str, value: Value) -> Arc<dyn Handler> {
    let calls = AtomicUsize::new(0);
    handler_fn(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) < failures {
            Err(HandlerError::msg(message))
        } else {
            Ok(value.clone())
        }
    })
}
