use std::sync::Arc;

use jiff::Timestamp;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::Error;
use crate::navigation::NavigationTarget;
use crate::refresh::{RefreshCoordinator, RefreshOutcome, RefreshTurn};
use crate::request::{ApiResponse, RequestDescriptor};
use crate::retry::OperationKind;
use crate::session::{SessionStore, SessionToken};
use crate::telemetry::refresh::RefreshTelemetry;

use super::RequestPipeline;
use super::headers::{Credentials, assemble_headers};
use super::plan_limit::parse_plan_limit;

/// Body returned by the refresh endpoint when it hands back a bearer token.
/// Cookie-based backends answer with `Set-Cookie` and may leave it empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RefreshResponse {
    #[serde(alias = "token")]
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl RequestPipeline {
    pub fn config(&self) -> &Config {
        self.context.config()
    }

    pub fn session(&self) -> Arc<dyn SessionStore> {
        self.context.session()
    }

    pub fn refresh_state(&self) -> Arc<RefreshCoordinator> {
        self.context.refresh()
    }

    /// Sends one logical request through the pipeline.
    ///
    /// Transport failures are retried with backoff, a 401 runs the shared
    /// session refresh and re-issues the request once, a 402 redirects to the
    /// upgrade flow. Every other non-2xx status comes back as [`Error::Http`].
    pub async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, Error> {
        let response = self.dispatch(request, OperationKind::Request).await?;
        if response.status() == StatusCode::UNAUTHORIZED && request.refreshes_on_unauthorized() {
            warn!(
                method = %request.method(),
                url = request.url(),
                status = 401,
                "received 401 unauthorized; refreshing session"
            );
            let generation = self.refresh_session().await?;
            let reissued = self
                .dispatch(request, OperationKind::ReissueAfterRefresh)
                .await?;
            if reissued.status() == StatusCode::UNAUTHORIZED {
                let reason = "request still unauthorized after session refresh".to_string();
                error!(method = %request.method(), url = request.url(), status = 401, "{}", reason);
                if self.context.refresh().expire_once(generation) {
                    self.expire_session();
                }
                return Err(Error::SessionExpired(reason));
            }
            return self.settle(request, reissued);
        }
        self.settle(request, response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        self.send(&RequestDescriptor::get(url)).await?.json()
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::post(url).json(body)?;
        self.send(&request).await?.json()
    }

    pub async fn put_json<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::put(url).json(body)?;
        self.send(&request).await?.json()
    }

    pub async fn patch_json<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::patch(url).json(body)?;
        self.send(&request).await?.json()
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        self.send(&RequestDescriptor::delete(url)).await?.json()
    }

    fn settle(&self, request: &RequestDescriptor, response: ApiResponse) -> Result<ApiResponse, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(self.plan_limit_exceeded(request, &response));
        }
        warn!(
            method = %request.method(),
            url = request.url(),
            status = status.as_u16(),
            "request failed with http error"
        );
        Err(Error::Http {
            status,
            status_text: response.status_text(),
            body: response.text(),
        })
    }

    fn plan_limit_exceeded(&self, request: &RequestDescriptor, response: &ApiResponse) -> Error {
        let limit = parse_plan_limit(response.body());
        warn!(
            method = %request.method(),
            url = request.url(),
            status = 402,
            detail = %limit.detail,
            upgrade_url = ?limit.upgrade_url,
            "received 402 payment required; plan limit reached"
        );
        let destination = limit
            .upgrade_url
            .clone()
            .unwrap_or_else(|| self.context.config().upgrade_url.clone());
        self.context
            .navigator()
            .redirect(NavigationTarget::Upgrade(destination));
        Error::PlanLimitExceeded {
            detail: limit.detail,
            upgrade_url: limit.upgrade_url,
        }
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        operation: OperationKind,
    ) -> Result<ApiResponse, Error> {
        let retry = self.context.retry();
        let plan = match request.retry_budget() {
            Some(budget) => retry.plan().with_max_retries(budget),
            None => retry.plan(),
        };
        let (response, outcome) = retry
            .execute_with_plan(&plan, operation, move |attempt| {
                debug!(operation = %operation, attempt, url = request.url(), "dispatching");
                self.exchange(request)
            })
            .await?;
        Ok(response.with_attempts(outcome.attempts))
    }

    /// One HTTP round trip bound to the request's timeout. The in-flight
    /// future is dropped, aborting the connection, when the timer fires first.
    async fn exchange(&self, request: &RequestDescriptor) -> Result<ApiResponse, Error> {
        let timeout = request
            .timeout_override()
            .unwrap_or_else(|| self.context.config().timeout());
        let url = self.resolve_url(request.url())?;

        let session = self.context.session().load();
        let csrf = if request.is_mutating() {
            self.context.csrf().and_then(|store| store.csrf_token())
        } else {
            None
        };
        let cookies = self
            .context
            .cookies()
            .and_then(|jar| jar.cookie_header(&url, self.context.base_url().host_str()));
        let headers = assemble_headers(
            request,
            &Credentials {
                session: session.as_ref(),
                csrf: csrf.as_deref(),
                csrf_header: self.context.csrf_header(),
                cookies: cookies.as_deref(),
            },
        )?;

        let mut builder = self
            .context
            .http_client()
            .request(request.method().clone(), url.clone())
            .headers(headers);
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }

        let in_flight = async {
            let resp = builder.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(ApiResponse::new(status, headers, body.to_vec()))
        };
        let response = match tokio::time::timeout(timeout, in_flight).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(Error::from_reqwest(err, timeout)),
            Err(_) => {
                warn!(
                    method = %request.method(),
                    url = request.url(),
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out; aborted"
                );
                return Err(Error::Timeout(timeout));
            }
        };

        self.ingest_cookies(&url, response.headers());
        debug!(
            method = %request.method(),
            url = request.url(),
            status = response.status().as_u16(),
            "exchange complete"
        );
        Ok(response)
    }

    fn resolve_url(&self, url: &str) -> Result<reqwest::Url, Error> {
        let resolved = if url.starts_with("http://") || url.starts_with("https://") {
            reqwest::Url::parse(url)
        } else {
            self.context.base_url().join(url)
        };
        resolved.map_err(|e| Error::InvalidRequest(format!("Invalid URL '{}': {}", url, e)))
    }

    fn ingest_cookies(&self, origin: &reqwest::Url, headers: &HeaderMap) {
        let Some(jar) = self.context.cookies() else {
            return;
        };
        for value in headers.get_all(SET_COOKIE) {
            match value.to_str() {
                Ok(raw) => jar.ingest_set_cookie(origin, raw),
                Err(_) => debug!("ignoring non-ascii set-cookie header"),
            }
        }
    }

    /// Waits for, or performs, the single in-flight session refresh.
    ///
    /// Only the caller that performed a failed refresh clears the session and
    /// navigates to login; queued callers just fail. Returns the generation
    /// of the refresh that succeeded.
    async fn refresh_session(&self) -> Result<u64, Error> {
        let refresh = self.context.refresh();
        loop {
            match refresh.enter() {
                RefreshTurn::Leader(lease) => {
                    let generation = lease.generation();
                    let telemetry = RefreshTelemetry::new("session.refresh");
                    telemetry.emit_start(Timestamp::now());
                    return match self.call_refresh_endpoint().await {
                        Ok(()) => {
                            let waiters = lease.complete(RefreshOutcome::Refreshed);
                            telemetry.emit_success(waiters, Timestamp::now());
                            Ok(generation)
                        }
                        Err(reason) => {
                            let waiters = lease.complete(RefreshOutcome::Failed(reason.clone()));
                            telemetry.emit_failure(&reason, waiters, Timestamp::now());
                            if refresh.expire_once(generation) {
                                self.expire_session();
                            }
                            Err(Error::SessionExpired(reason))
                        }
                    };
                }
                RefreshTurn::Waiter(wait) => {
                    RefreshTelemetry::new("session.refresh").emit_queued();
                    let generation = wait.generation();
                    match wait.await_refresh().await {
                        RefreshOutcome::Refreshed => return Ok(generation),
                        RefreshOutcome::Failed(reason) => return Err(Error::SessionExpired(reason)),
                        RefreshOutcome::Abandoned => continue,
                    }
                }
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<(), String> {
        let request =
            RequestDescriptor::post(self.context.config().refresh_path.clone()).without_refresh();
        let response = self.exchange(&request).await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!(
                "refresh endpoint answered {} {}",
                response.status().as_u16(),
                response.status_text()
            ));
        }
        self.adopt_refreshed_session(&response)
            .map_err(|e| e.to_string())
    }

    fn adopt_refreshed_session(&self, response: &ApiResponse) -> Result<(), Error> {
        let body = response.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            debug!("refresh returned no body; relying on cookies");
            return Ok(());
        }
        let parsed: RefreshResponse = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(error = %err, "refresh body is not a token payload");
                return Ok(());
            }
        };
        if let Some(token) = parsed.access_token.filter(|t| !t.is_empty()) {
            let token = match parsed.expires_in {
                Some(secs) => SessionToken::expiring_in(token, std::time::Duration::from_secs(secs))?,
                None => SessionToken::new(token),
            };
            self.context.session().store(token)?;
            info!(expires_in = ?parsed.expires_in, "session token refreshed");
        }
        Ok(())
    }

    fn expire_session(&self) {
        if let Err(err) = self.context.session().clear() {
            warn!(error = %err, "failed to clear session store");
        }
        let login = self.context.config().login_url.clone();
        self.context
            .navigator()
            .redirect(NavigationTarget::Login(login));
    }
}
