use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::OperationKind;

/// How one logical request fared against its retry budget.
///
/// Returned alongside the value by [`super::RetryCoordinator`] and copied
/// onto the [`crate::ApiResponse`] so callers can see how many exchanges a
/// call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub operation: OperationKind,
    /// Exchanges issued, including the first.
    pub attempts: u8,
    pub success: bool,
    /// Time spent sleeping between attempts plus the attempts themselves.
    pub total_delay: Duration,
}

impl RetryOutcome {
    pub(crate) fn finish(
        operation: OperationKind,
        attempts: u8,
        success: bool,
        started: Instant,
    ) -> Self {
        let outcome = Self {
            operation,
            attempts,
            success,
            total_delay: started.elapsed(),
        };
        outcome.log();
        outcome
    }

    pub fn retries(&self) -> u8 {
        self.attempts.saturating_sub(1)
    }

    fn log(&self) {
        // First-try successes are the common case; keep them out of info logs.
        if self.retries() == 0 && self.success {
            debug!(operation = %self.operation, "retry.outcome");
            return;
        }
        info!(
            operation = %self.operation,
            attempts = self.attempts,
            retries = self.retries(),
            success = self.success,
            total_delay_ms = self.total_delay.as_millis() as u64,
            "retry.outcome"
        );
    }
}
