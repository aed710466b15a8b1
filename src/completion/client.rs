use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::CompletionError;

/// Opaque text generation: one prompt in, one completion out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Bounds every completion call with a deadline.
pub struct TimeoutCompletion {
    inner: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl TimeoutCompletion {
    pub fn new(inner: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl CompletionClient for TimeoutCompletion {
    #[instrument(skip_all)]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Completion did not answer within {:?}", self.timeout);
                Err(CompletionError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}
