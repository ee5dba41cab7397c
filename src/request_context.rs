use std::sync::Arc;

use reqwest::Client;
use reqwest::header::HeaderName;

use crate::config::Config;
use crate::cookies::CookieJar;
use crate::navigation::Navigator;
use crate::refresh::RefreshCoordinator;
use crate::retry::{RetryCoordinator, RetryPlan};
use crate::session::{CsrfStore, SessionStore};

/// Shared context for outbound requests ensuring consistent retry/session handling.
#[derive(Clone)]
pub struct RequestDispatchContext {
    http_client: Client,
    config: Arc<Config>,
    base_url: reqwest::Url,
    csrf_header: HeaderName,
    retry: Arc<RetryCoordinator>,
    refresh: Arc<RefreshCoordinator>,
    session: Arc<dyn SessionStore>,
    csrf: Option<Arc<dyn CsrfStore>>,
    cookies: Option<Arc<CookieJar>>,
    navigator: Arc<dyn Navigator>,
}

pub struct DispatchParts {
    pub http_client: Client,
    pub config: Config,
    pub base_url: reqwest::Url,
    pub csrf_header: HeaderName,
    pub retry_plan: RetryPlan,
    pub refresh: Arc<RefreshCoordinator>,
    pub session: Arc<dyn SessionStore>,
    pub csrf: Option<Arc<dyn CsrfStore>>,
    pub cookies: Option<Arc<CookieJar>>,
    pub navigator: Arc<dyn Navigator>,
}

impl RequestDispatchContext {
    pub fn build(parts: DispatchParts) -> Self {
        Self {
            http_client: parts.http_client,
            config: Arc::new(parts.config),
            base_url: parts.base_url,
            csrf_header: parts.csrf_header,
            retry: Arc::new(RetryCoordinator::new(parts.retry_plan)),
            refresh: parts.refresh,
            session: parts.session,
            csrf: parts.csrf,
            cookies: parts.cookies,
            navigator: parts.navigator,
        }
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }

    pub fn csrf_header(&self) -> &HeaderName {
        &self.csrf_header
    }

    pub fn retry(&self) -> Arc<RetryCoordinator> {
        Arc::clone(&self.retry)
    }

    pub fn refresh(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.refresh)
    }

    pub fn session(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.session)
    }

    pub fn csrf(&self) -> Option<Arc<dyn CsrfStore>> {
        self.csrf.clone()
    }

    pub fn cookies(&self) -> Option<Arc<CookieJar>> {
        self.cookies.clone()
    }

    pub fn navigator(&self) -> Arc<dyn Navigator> {
        Arc::clone(&self.navigator)
    }
}
