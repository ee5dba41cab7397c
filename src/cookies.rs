//! In-memory cookie jar fed from `Set-Cookie` response headers.
//!
//! Plays the role a browser's cookie storage plays for the web console: the
//! backend sets the CSRF (and optionally session) cookies, the pipeline reads
//! them back before each request. Values are stored and sent back exactly as
//! the backend wrote them.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use cookie::Cookie;
use jiff::{SignedDuration, Timestamp};
use reqwest::Url;
use tracing::debug;

use crate::errors::Error;
use crate::session::{CsrfStore, SessionStore, SessionToken};

/// Where a cookie may be sent. Cookies seeded by the caller have no domain
/// and only go to the pipeline's own host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct CookieScope {
    domain: Option<String>,
    host_only: bool,
    path: String,
    secure: bool,
}

impl CookieScope {
    fn unscoped() -> Self {
        Self {
            path: "/".to_string(),
            ..Self::default()
        }
    }

    fn matches(&self, url: &Url, default_host: Option<&str>) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = match (&self.domain, default_host) {
            (Some(domain), _) if self.host_only => host == *domain,
            (Some(domain), _) => host == *domain || host.ends_with(&format!(".{}", domain)),
            (None, Some(default)) => host.eq_ignore_ascii_case(default),
            (None, None) => false,
        };
        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Directory of the request path, used when `Set-Cookie` carries no `Path`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

#[derive(Clone, Debug)]
struct CookieEntry {
    value: String,
    expires_at: Option<Timestamp>,
    scope: CookieScope,
}

impl CookieEntry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Default)]
pub struct CookieJar {
    entries: RwLock<BTreeMap<String, CookieEntry>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a jar from a `Cookie:` style string such as `a=1; csrftoken=xyz`.
    pub fn from_cookie_header(header: &str) -> Self {
        let jar = Self::new();
        for cookie in Cookie::split_parse(header).filter_map(Result::ok) {
            jar.set(cookie.name(), cookie.value());
        }
        jar
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name.into(), value.into(), None, CookieScope::unscoped());
    }

    pub fn set_with_expiry(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
        expires_at: Option<Timestamp>,
    ) {
        let name = name.into();
        let scope = self
            .entry(&name)
            .map(|existing| existing.scope)
            .unwrap_or_else(CookieScope::unscoped);
        self.insert(name, value.into(), expires_at, scope);
    }

    fn insert(&self, name: String, value: String, expires_at: Option<Timestamp>, scope: CookieScope) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            name,
            CookieEntry {
                value,
                expires_at,
                scope,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entry(name).map(|entry| entry.value)
    }

    fn entry(&self, name: &str) -> Option<CookieEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .filter(|entry| entry.is_live(Timestamp::now()))
            .cloned()
    }

    pub fn remove(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(name);
    }

    /// Applies one `Set-Cookie` header received from `origin`. `Max-Age`
    /// wins over `Expires`; a non-positive `Max-Age` or a past `Expires`
    /// deletes the cookie.
    pub fn ingest_set_cookie(&self, origin: &Url, header: &str) {
        let cookie = match Cookie::parse(header) {
            Ok(cookie) => cookie,
            Err(err) => {
                debug!(error = %err, "ignoring malformed set-cookie header");
                return;
            }
        };
        let name = cookie.name().to_string();

        let Some(host) = origin.host_str().map(str::to_ascii_lowercase) else {
            return;
        };
        let scope = match cookie.domain().map(|d| d.trim_start_matches('.').to_ascii_lowercase()) {
            Some(domain) if host == domain || host.ends_with(&format!(".{}", domain)) => CookieScope {
                domain: Some(domain),
                host_only: false,
                path: String::new(),
                secure: false,
            },
            Some(domain) => {
                debug!(cookie = %name, domain = %domain, host = %host, "rejecting cookie for foreign domain");
                return;
            }
            None => CookieScope {
                domain: Some(host),
                host_only: true,
                path: String::new(),
                secure: false,
            },
        };
        let scope = CookieScope {
            path: cookie
                .path()
                .filter(|p| p.starts_with('/'))
                .map(str::to_string)
                .unwrap_or_else(|| default_path(origin)),
            secure: cookie.secure().unwrap_or(false),
            ..scope
        };

        let now = Timestamp::now();
        let expires_at = match cookie.max_age() {
            Some(age) if age.whole_seconds() <= 0 => {
                debug!(cookie = %name, "cookie deleted by max-age");
                self.remove(&name);
                return;
            }
            Some(age) => now
                .checked_add(SignedDuration::from_secs(age.whole_seconds()))
                .ok(),
            None => cookie
                .expires_datetime()
                .and_then(|at| Timestamp::from_second(at.unix_timestamp()).ok()),
        };
        if expires_at.is_some_and(|at| at <= now) {
            debug!(cookie = %name, "cookie deleted by expiry");
            self.remove(&name);
            return;
        }
        self.insert(name, cookie.value().to_string(), expires_at, scope);
    }

    /// Renders the live cookies that may be sent to `url` as a request
    /// `Cookie` header value. Unscoped cookies only go to `default_host`.
    pub fn cookie_header(&self, url: &Url, default_host: Option<&str>) -> Option<String> {
        let now = Timestamp::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let rendered = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now) && entry.scope.matches(url, default_host))
            .map(|(name, entry)| format!("{}={}", name, entry.value))
            .collect::<Vec<_>>();
        if rendered.is_empty() {
            None
        } else {
            Some(rendered.join("; "))
        }
    }
}

/// Reads the CSRF token out of a named jar cookie.
pub struct CookieCsrfStore {
    jar: Arc<CookieJar>,
    cookie_name: String,
}

impl CookieCsrfStore {
    pub fn new(jar: Arc<CookieJar>, cookie_name: impl Into<String>) -> Self {
        Self {
            jar,
            cookie_name: cookie_name.into(),
        }
    }
}

impl CsrfStore for CookieCsrfStore {
    fn csrf_token(&self) -> Option<String> {
        self.jar.get(&self.cookie_name).filter(|v| !v.is_empty())
    }
}

/// Session credential kept in a jar cookie, so a refresh endpoint that
/// answers with `Set-Cookie` updates it in place.
pub struct CookieSessionStore {
    jar: Arc<CookieJar>,
    cookie_name: String,
}

impl CookieSessionStore {
    pub fn new(jar: Arc<CookieJar>, cookie_name: impl Into<String>) -> Self {
        Self {
            jar,
            cookie_name: cookie_name.into(),
        }
    }
}

impl SessionStore for CookieSessionStore {
    fn load(&self) -> Option<SessionToken> {
        self.jar
            .entry(&self.cookie_name)
            .filter(|entry| !entry.value.is_empty())
            .map(|entry| match entry.expires_at {
                Some(at) => SessionToken::with_expiry(entry.value, at),
                None => SessionToken::new(entry.value),
            })
    }

    fn store(&self, token: SessionToken) -> Result<(), Error> {
        self.jar
            .set_with_expiry(&self.cookie_name, token.value(), token.expires_at());
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.jar.remove(&self.cookie_name);
        Ok(())
    }
}
