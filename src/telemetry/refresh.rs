use jiff::Timestamp;
use tracing::{Level, event};
use uuid::Uuid;

use crate::refresh::RefreshOutcome;

/// Structured events for one session refresh, tied together by `attempt_id`.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn emit_start(&self, at: Timestamp) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = %at,
            "refresh.start"
        );
    }

    pub fn emit_success(&self, waiters: usize, at: Timestamp) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = %at,
            outcome = ?RefreshOutcome::Refreshed,
            waiters,
            "refresh.success"
        );
    }

    pub fn emit_queued(&self) {
        event!(
            Level::INFO,
            context = %self.context,
            "refresh.queued"
        );
    }

    pub fn emit_failure(&self, reason: &str, waiters: usize, at: Timestamp) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = %at,
            error = %reason,
            waiters,
            "refresh.failure"
        );
    }
}
