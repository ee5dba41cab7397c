mod state;

pub use state::{RefreshCoordinator, RefreshLease, RefreshOutcome, RefreshTurn, RefreshWait};
