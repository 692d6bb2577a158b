//! JSON transport used by the adapters and the resolver's secondary lookups.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::Result;

/// Basic-auth credentials. The password is never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub credentials: Option<Credentials>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
        }
    }
}

/// Fetches a URL and decodes the body as JSON.
///
/// Implementations must report non-2xx statuses as errors.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, request: &Request) -> Result<Value>;
}

#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl JsonFetcher for HttpFetcher {
    #[tracing::instrument(name = "HTTP GET", skip_all, fields(url = %request.url), level = "debug")]
    async fn get_json(&self, request: &Request) -> Result<Value> {
        let mut builder = self.client.get(&request.url);
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        let response = builder.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// Remove user-info from a URL so it can be sent as an `Authorization` header instead.
///
/// Only the authority is rewritten; the rest of the text is kept verbatim, so template
/// placeholders survive.
pub fn strip_credentials(raw: &str) -> Result<(String, Option<Credentials>)> {
    let parsed = Url::parse(raw)?;
    if parsed.username().is_empty() && parsed.password().is_none() {
        return Ok((raw.to_owned(), None));
    }

    let decode = |s: &str| {
        urlencoding::decode(s).map_or_else(|_| s.to_owned(), std::borrow::Cow::into_owned)
    };
    let credentials = Credentials {
        username: decode(parsed.username()),
        password: parsed.password().map(decode),
    };

    let authority_start = raw.find("://").map_or(0, |i| i + 3);
    let authority_end = raw[authority_start..]
        .find(['/', '?', '#'])
        .map_or(raw.len(), |i| authority_start + i);
    let stripped = match raw[authority_start..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &raw[..authority_start], &raw[authority_start + at + 1..]),
        None => raw.to_owned(),
    };

    Ok((stripped, Some(credentials)))
}
