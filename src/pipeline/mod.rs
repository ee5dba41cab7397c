use std::sync::Arc;

use reqwest::Client;
use reqwest::header::HeaderName;

use crate::config::Config;
use crate::cookies::{CookieCsrfStore, CookieJar};
use crate::errors::Error;
use crate::navigation::{Navigator, TracingNavigator};
use crate::refresh::RefreshCoordinator;
use crate::request_context::{DispatchParts, RequestDispatchContext};
use crate::session::{CsrfStore, MemorySessionStore, SessionStore, SessionToken};

mod headers;
mod impls;
mod plan_limit;

/// The uniform request entry point every UI-level call goes through.
///
/// Cheap to clone; clones share the session store, the refresh state and
/// the HTTP connection pool.
#[derive(Clone)]
pub struct RequestPipeline {
    context: RequestDispatchContext,
}

pub struct RequestPipelineBuilder {
    config: Config,
    http_client: Option<Client>,
    session: Option<Arc<dyn SessionStore>>,
    csrf: Option<Arc<dyn CsrfStore>>,
    cookies: Option<Arc<CookieJar>>,
    navigator: Option<Arc<dyn Navigator>>,
    refresh: Option<Arc<RefreshCoordinator>>,
}

impl RequestPipelineBuilder {
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session = Some(store);
        self
    }

    pub fn csrf_store(mut self, store: Arc<dyn CsrfStore>) -> Self {
        self.csrf = Some(store);
        self
    }

    /// Attaches a cookie jar: its cookies go out on every request and every
    /// `Set-Cookie` that comes back is applied to it. Without an explicit CSRF
    /// store the CSRF token is read from the jar's `csrf_cookie_name` cookie.
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Shares refresh state with other pipelines talking to the same
    /// backend, so a burst of 401s across all of them triggers one refresh.
    pub fn refresh_state(mut self, refresh: Arc<RefreshCoordinator>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn build(self) -> Result<RequestPipeline, Error> {
        let config = self.config;
        config.validate()?;
        let base_url = reqwest::Url::parse(&config.base_url).map_err(|e| {
            Error::Config(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        let csrf_header = HeaderName::from_bytes(config.csrf_header_name.as_bytes())
            .map_err(|e| {
                Error::Config(format!(
                    "Invalid CSRF header name '{}': {}",
                    config.csrf_header_name, e
                ))
            })?;
        let retry_plan = config.retry_plan()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(config.user_agent.as_str())
                .build()
                .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?,
        };

        let session: Arc<dyn SessionStore> = match self.session {
            Some(store) => store,
            None => match config.session_token.as_deref() {
                Some(token) if !token.is_empty() => {
                    Arc::new(MemorySessionStore::with_token(SessionToken::new(token)))
                }
                _ => Arc::new(MemorySessionStore::new()),
            },
        };

        let csrf = match (self.csrf, self.cookies.as_ref()) {
            (Some(store), _) => Some(store),
            (None, Some(jar)) => Some(Arc::new(CookieCsrfStore::new(
                Arc::clone(jar),
                config.csrf_cookie_name.clone(),
            )) as Arc<dyn CsrfStore>),
            (None, None) => None,
        };

        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator));

        Ok(RequestPipeline {
            context: RequestDispatchContext::build(DispatchParts {
                http_client,
                config,
                base_url,
                csrf_header,
                retry_plan,
                refresh: self.refresh.unwrap_or_default(),
                session,
                csrf,
                cookies: self.cookies,
                navigator,
            }),
        })
    }
}

impl RequestPipeline {
    pub fn builder(config: Config) -> RequestPipelineBuilder {
        RequestPipelineBuilder {
            config,
            http_client: None,
            session: None,
            csrf: None,
            cookies: None,
            navigator: None,
            refresh: None,
        }
    }

    /// Pipeline with an in-memory session store and log-only navigation.
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::builder(config).build()
    }
}
