//! Resilient request pipeline for a multi-tenant console's backend API.
//!
//! Every call goes through [`RequestPipeline::send`], which attaches the
//! session token and CSRF token, bounds each exchange with a timeout, retries
//! transport failures with exponential backoff, coordinates a single session
//! refresh across concurrent 401s, and surfaces 402 plan limits.

pub mod config;
pub mod cookies;
pub mod errors;
pub mod navigation;
mod pipeline;
pub mod refresh;
pub mod request;
pub mod request_context;
pub mod retry;
pub mod session;
pub mod telemetry;

pub use config::{Config, ConfigLocation};
pub use cookies::{CookieCsrfStore, CookieJar, CookieSessionStore};
pub use errors::{Error, TransportFailure, TransportKind};
pub use navigation::{ChannelNavigator, NavigationTarget, Navigator, TracingNavigator};
pub use pipeline::{RequestPipeline, RequestPipelineBuilder};
pub use request::{ApiResponse, RequestDescriptor};
pub use session::{
    CsrfStore, FileSessionStore, MemorySessionStore, SessionStore, SessionToken, StaticCsrfStore,
};
