use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How an in-flight session refresh resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Failed(String),
    /// The refreshing caller went away before finishing; waiters should try again.
    Abandoned,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    /// Number of refreshes resolved so far; the running one resolves as `generation + 1`.
    generation: u64,
    /// Highest generation whose session expiry has already been acted on.
    expired_through: u64,
}

/// Single-flight guard around the session refresh call.
///
/// At most one caller holds a [`RefreshLease`] at a time; everyone who hits a
/// 401 meanwhile gets a [`RefreshWait`] and is woken with the lease holder's
/// outcome. The mutex is never held across an await point.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

pub enum RefreshTurn<'a> {
    Leader(RefreshLease<'a>),
    Waiter(RefreshWait),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Either starts a refresh (Idle -> Refreshing) or queues behind the running one.
    pub fn enter(&self) -> RefreshTurn<'_> {
        let mut state = self.lock();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            debug!(waiters = state.waiters.len(), "refresh already running; queued");
            RefreshTurn::Waiter(RefreshWait {
                rx,
                generation: state.generation + 1,
            })
        } else {
            state.refreshing = true;
            RefreshTurn::Leader(RefreshLease {
                coordinator: self,
                generation: state.generation + 1,
                completed: false,
            })
        }
    }

    pub fn try_begin_refresh(&self) -> Option<RefreshLease<'_>> {
        let mut state = self.lock();
        if state.refreshing {
            return None;
        }
        state.refreshing = true;
        Some(RefreshLease {
            coordinator: self,
            generation: state.generation + 1,
            completed: false,
        })
    }

    /// Resets to Idle and wakes every waiter. Returns how many were queued.
    pub fn complete_refresh(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.refreshing = false;
            state.generation += 1;
            std::mem::take(&mut state.waiters)
        };
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was cancelled has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
        count
    }

    /// Claims the right to act on the session expiring after refresh
    /// `generation`. Only the first caller per generation gets `true`, so a
    /// burst of requests rejected after the same refresh logs out once.
    pub fn expire_once(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.expired_through >= generation {
            return false;
        }
        state.expired_through = generation;
        true
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that the holder is the one caller performing the refresh.
///
/// Dropping it without calling [`RefreshLease::complete`] releases waiters
/// with [`RefreshOutcome::Abandoned`].
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    completed: bool,
}

impl RefreshLease<'_> {
    /// Generation this refresh resolves as.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn complete(mut self, outcome: RefreshOutcome) -> usize {
        self.completed = true;
        self.coordinator.complete_refresh(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let released = self.coordinator.complete_refresh(RefreshOutcome::Abandoned);
            warn!(waiters = released, "refresh abandoned before completion");
        }
    }
}

pub struct RefreshWait {
    rx: oneshot::Receiver<RefreshOutcome>,
    generation: u64,
}

impl RefreshWait {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn await_refresh(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(RefreshOutcome::Abandoned)
    }
}
