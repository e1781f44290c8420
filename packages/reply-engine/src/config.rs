//! Engine configuration.

use std::time::Duration;

/// Per-operation timeout. A flow stuck longer than this on any single
/// collaborator call fails as retryable rather than hanging the form.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub operation_timeout: Duration,
}

impl EngineConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}
