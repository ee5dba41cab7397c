use rand::{SeedableRng, rngs::StdRng};
use std::fmt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::errors::Error;

use super::{RetryOutcome, plan::RetryPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Request,
    ReissueAfterRefresh,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Request => write!(f, "request"),
            OperationKind::ReissueAfterRefresh => write!(f, "reissue_after_refresh"),
        }
    }
}

/// Runs an operation, retrying transient transport failures with backoff.
///
/// The attempt counter belongs to one `execute` call and starts at 0.
pub struct RetryCoordinator {
    plan: RetryPlan,
    rng: Mutex<StdRng>,
}

impl RetryCoordinator {
    pub fn new(plan: RetryPlan) -> Self {
        Self {
            plan,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn plan(&self) -> RetryPlan {
        self.plan.clone()
    }

    pub async fn execute<F, Fut, T>(
        &self,
        operation: OperationKind,
        op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u8) -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, Error>> + Send,
    {
        let plan = self.plan.clone();
        self.execute_with_plan(&plan, operation, op).await
    }

    pub async fn execute_with_plan<F, Fut, T>(
        &self,
        plan: &RetryPlan,
        operation: OperationKind,
        mut op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u8) -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, Error>> + Send,
    {
        let mut attempt: u8 = 0;
        let started = Instant::now();
        loop {
            let attempts = attempt.saturating_add(1);
            let err = match op(attempt).await {
                Ok(value) => {
                    let outcome = RetryOutcome::finish(operation, attempts, true, started);
                    return Ok((value, outcome));
                }
                Err(err) => err,
            };
            if !err.is_transient() {
                RetryOutcome::finish(operation, attempts, false, started);
                return Err(err);
            }
            if attempt >= plan.max_retries {
                RetryOutcome::finish(operation, attempts, false, started);
                return Err(Error::MaxRetriesExceeded {
                    attempts,
                    source: Box::new(err),
                });
            }
            let delay = {
                let mut rng = self.rng.lock().await;
                plan.delay_for_attempt(attempt, &mut *rng)
            };
            warn!(
                operation = %operation,
                attempt,
                max_retries = plan.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retry.scheduling"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryPlan::default_plan())
    }
}
