use std::fmt;

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Where the embedding client should send the user next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationTarget {
    Login(String),
    Upgrade(String),
}

impl NavigationTarget {
    pub fn url(&self) -> &str {
        match self {
            NavigationTarget::Login(url) | NavigationTarget::Upgrade(url) => url,
        }
    }
}

impl fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationTarget::Login(url) => write!(f, "login({})", url),
            NavigationTarget::Upgrade(url) => write!(f, "upgrade({})", url),
        }
    }
}

/// Performs the full navigation the pipeline asks for on unrecoverable
/// auth failures and plan-limit responses.
pub trait Navigator: Send + Sync {
    fn redirect(&self, target: NavigationTarget);
}

/// Only records the redirect in the trace log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect(&self, target: NavigationTarget) {
        info!(target = %target, "navigation.redirect");
    }
}

/// Forwards redirects to whatever loop drives the UI.
#[derive(Clone, Debug)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<NavigationTarget>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NavigationTarget>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn redirect(&self, target: NavigationTarget) {
        info!(target = %target, "navigation.redirect");
        if let Err(err) = self.tx.send(target) {
            warn!(target = %err.0, "navigation receiver dropped");
        }
    }
}
