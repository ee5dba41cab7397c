use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue};

use crate::errors::Error;
use crate::request::RequestDescriptor;
use crate::session::SessionToken;

/// Per-exchange inputs read from the stores just before sending.
pub(crate) struct Credentials<'a> {
    pub session: Option<&'a SessionToken>,
    pub csrf: Option<&'a str>,
    pub csrf_header: &'a HeaderName,
    pub cookies: Option<&'a str>,
}

/// Default content type, then caller headers, then the pipeline-owned
/// credentials. The CSRF header is only added for mutating verbs.
pub(crate) fn assemble_headers(
    request: &RequestDescriptor,
    credentials: &Credentials<'_>,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for name in request.header_map().keys() {
        headers.remove(name);
    }
    for (name, value) in request.header_map() {
        headers.append(name.clone(), value.clone());
    }

    if let Some(token) = credentials.session {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.value()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if request.is_mutating()
        && let Some(csrf) = credentials.csrf
    {
        let mut value = HeaderValue::from_str(csrf)?;
        value.set_sensitive(true);
        headers.insert(credentials.csrf_header.clone(), value);
    }

    if let Some(cookies) = credentials.cookies
        && !headers.contains_key(COOKIE)
    {
        let mut value = HeaderValue::from_str(cookies)?;
        value.set_sensitive(true);
        headers.insert(COOKIE, value);
    }

    Ok(headers)
}
