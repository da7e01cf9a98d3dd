//! Request-scoped correlation context
//!
//! One context is created per development cycle and a child is derived per
//! capability invocation. The value is threaded explicitly through calls,
//! never stored in globals or thread-locals, and is discarded when its
//! invocation chain completes.

use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CorrelationContext {
    /// Stable across the whole invocation chain.
    pub correlation_id: Uuid,
    /// Unique per invocation.
    pub request_id: Uuid,
    pub component: String,
    pub operation: String,
    start_time: Instant,
}

impl CorrelationContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            start_time: Instant::now(),
        }
    }

    /// Derive a context for a nested invocation: same correlation id, new
    /// request id and timer.
    pub fn child(&self, component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            correlation_id: self.correlation_id,
            request_id: Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
