//! Transport-level retry: the backoff plan, the loop that applies it, and
//! the per-request summary it hands back.

mod coordinator;
mod outcome;
mod plan;

pub use coordinator::{OperationKind, RetryCoordinator};
pub use outcome::RetryOutcome;
pub use plan::{JitterStrategy, MAX_RETRY_BUDGET, RetryPlan};
