use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{Span, field, instrument, trace};

use crate::util::http::Uri;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid request URI: {0}")]
    InvalidUri(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

/// A request to the broker or the hub
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Attach a JSON body, setting the matching content type
    pub fn with_json(self, body: String) -> Self {
        let mut request = self.with_header("content-type", "application/json");
        request.body = Some(body);
        request
    }

    /// Value of the first header matching `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Blocking-per-call request primitive over a secure channel.
///
/// Implementations report a [`Response`] for any status the server
/// answers with; only failures to get an answer at all are errors.
pub trait Transport {
    fn send(&self, request: Request)
    -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// HTTP transport backed by reqwest.
///
/// A new client is created for every request; nothing is pooled or reused
/// between calls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transport for HttpTransport {
    #[instrument(name = "http", skip_all, fields(method = %request.method, status = field::Empty), err)]
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let Request {
            method,
            uri,
            headers,
            body,
        } = request;

        let client = Client::new();
        let url = reqwest::Url::parse(&uri.to_string())
            .map_err(|e| TransportError::InvalidUri(e.to_string()))?;

        trace!(url = %url, "sending request");
        let mut builder = client.request(method, url).timeout(self.timeout);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        Span::current().record("status", status.as_u16());

        let body = response.text().await?;
        Ok(Response { status, body })
    }
}
