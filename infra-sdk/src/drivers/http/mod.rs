//! HTTP drivers
//!
//! Shared plumbing for REST backends: client construction, URL building,
//! authentication and status handling.

pub mod discovery;
pub mod search;

use std::fmt;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::{Credentials, ServiceSettings};
use crate::error::BoxError;

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "infra-sdk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }

        Ok(())
    }
}

/// Non-success HTTP response
#[derive(Error, Debug)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub body: String,
}

/// Normalize an endpoint into a base URL; bare `host:port` endpoints get `http://`
pub fn base_url(endpoint: &str) -> Result<Url, BoxError> {
    let endpoint = endpoint.trim();
    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let url = Url::parse(&candidate)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}' in endpoint {}", other, endpoint).into()),
    }
}

/// Build a standard HTTP client with default settings
pub fn build_http_client(user_agent: Option<UserAgent>, timeout: Duration) -> Result<Client, BoxError> {
    let mut headers = header::HeaderMap::new();
    let ua = user_agent.unwrap_or_default().to_string();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_str(&ua)?);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .build()?;

    Ok(client)
}

/// An authenticated REST endpoint
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
    token_header: Option<&'static str>,
}

impl HttpEndpoint {
    /// Build from service settings.
    ///
    /// Token credentials go into `token_header` when given, otherwise into a
    /// bearer `Authorization` header.
    pub fn from_settings(
        base: Url,
        settings: &ServiceSettings,
        user_agent: UserAgent,
        token_header: Option<&'static str>,
    ) -> Result<Self, BoxError> {
        Ok(Self {
            client: build_http_client(Some(user_agent), settings.timeout())?,
            base,
            credentials: settings.credentials.clone(),
            token_header,
        })
    }

    /// URL of `segments` below the base path, each segment percent-encoded
    pub fn url(&self, segments: &[&str]) -> Result<Url, BoxError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| format!("endpoint {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request with authentication applied
    pub fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, BoxError> {
        let builder = self.client.request(method, self.url(segments)?);
        Ok(match (&self.credentials, self.token_header) {
            (Some(Credentials::Basic { username, password }), _) => builder.basic_auth(username, Some(password)),
            (Some(Credentials::Token { token }), Some(name)) => builder.header(name, token),
            (Some(Credentials::Token { token }), None) => builder.bearer_auth(token),
            (None, _) => builder,
        })
    }

    /// Send and require a success status
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, BoxError> {
        let response = request.send().await?;
        check_status(response).await
    }

    /// Send, mapping `404 Not Found` to `None`
    pub async fn send_optional(&self, request: RequestBuilder) -> Result<Option<Response>, BoxError> {
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response).await.map(Some)
    }
}

/// Parse error response from HTTP response
async fn check_status(response: Response) -> Result<Response, BoxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("Failed to read error response: {}", e),
    };
    Err(HttpStatusError { status, body }.into())
}
