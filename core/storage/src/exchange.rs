//! Single-attempt HTTP exchanges.
//!
//! Every call into the Drive or OAuth2 endpoints goes through [`HttpExchange`].
//! A call never retries and never panics: transport problems are folded into
//! an [`Exchange`] carrying [`TRANSPORT_FAILURE`] as its status so callers can
//! report them uniformly with protocol-level failures.

use futures::StreamExt;
use oauth2::AccessToken;
use reqwest::header::{self, AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Body, Client, Method, StatusCode, Url};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use driveconnect_common::{Error, Result};

/// Status reported when no HTTP status could be obtained.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Connection establishment limit.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Longest allowed pause between two reads of a response.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("driveconnect/", env!("CARGO_PKG_VERSION"));

/// Outcome of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// HTTP status, or [`TRANSPORT_FAILURE`].
    pub status: i32,
    /// Response body; the redirect target when `status` is 302.
    pub body: String,
    /// Response headers (empty on transport failure).
    pub headers: HeaderMap,
}

impl Exchange {
    fn transport_failure(message: String) -> Self {
        warn!("{}", message);
        Self {
            status: TRANSPORT_FAILURE,
            body: message,
            headers: HeaderMap::new(),
        }
    }

    /// Whether the request never produced an HTTP status.
    pub fn is_transport_failure(&self) -> bool {
        self.status == TRANSPORT_FAILURE
    }

    /// Whether `body` holds a redirect target.
    pub fn is_redirect(&self) -> bool {
        self.status == i32::from(StatusCode::FOUND.as_u16())
    }

    /// Raw text of a response header.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Require an exact status.
    ///
    /// # Errors
    /// - `Error::Transport` if the exchange never reached the server
    /// - `Error::Protocol` with status and body for any other status
    pub fn expect_status(self, expected: StatusCode, step: &'static str) -> Result<Self> {
        self.require(step, |status| status == i32::from(expected.as_u16()))
    }

    /// Require any 2xx status.
    pub fn expect_success(self, step: &'static str) -> Result<Self> {
        self.require(step, |status| (200..300).contains(&status))
    }

    fn require(self, step: &'static str, accept: impl Fn(i32) -> bool) -> Result<Self> {
        if self.is_transport_failure() {
            return Err(Error::Transport(format!("{}: {}", step, self.body)));
        }
        if !accept(self.status) {
            return Err(Error::Protocol {
                step,
                status: self.status,
                body: self.body,
            });
        }
        Ok(self)
    }
}

/// A request waiting to be sent through [`HttpExchange`].
pub struct ExchangeRequest<'a> {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Body>,
    bearer: Option<&'a AccessToken>,
    invalid: Option<String>,
}

impl<'a> ExchangeRequest<'a> {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            bearer: None,
            invalid: None,
        }
    }

    /// GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request with a raw payload.
    pub fn post(url: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::POST, url).body(body)
    }

    /// PUT request with a raw payload.
    pub fn put(url: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::PUT, url).body(body)
    }

    /// Replace the payload.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Authorize with `Authorization: Bearer <token>`.
    ///
    /// The token is borrowed for the duration of the call only.
    pub fn bearer(mut self, token: &'a AccessToken) -> Self {
        self.bearer = Some(token);
        self
    }

    /// Append a query parameter (URL-encoded on send).
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Set a request header.
    pub fn header(mut self, name: HeaderName, value: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(e) => self.invalid = Some(format!("Invalid value for header {}: {}", name, e)),
        }
        self
    }

    /// Mark the payload as a form-encoded string.
    pub fn form_encoded(self) -> Self {
        self.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
    }
}

/// Shared HTTP transport.
///
/// Built once at startup; clones share the same connection pool, which is
/// released when the last handle is dropped.
#[derive(Clone)]
pub struct HttpExchange {
    http: Client,
}

impl HttpExchange {
    /// Create the transport.
    ///
    /// Redirects are never followed so that a 302 can be reported to the
    /// caller with its target.
    ///
    /// # Errors
    /// - `Error::Transport` if the TLS backend cannot be initialised
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("Unable to start HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Send a request and buffer the response body.
    ///
    /// A 302 response carries the redirect target in `body` instead of the
    /// payload. Relative targets are resolved against the request URL.
    pub async fn send(&self, request: ExchangeRequest<'_>) -> Exchange {
        let response = match self.dispatch(request).await {
            Ok(r) => r,
            Err(failure) => return failure,
        };

        let status = response.status();
        let headers = response.headers().clone();

        if status == StatusCode::FOUND {
            let target = redirect_target(response.url(), &headers);
            debug!(target = %target, "Redirect received");
            return Exchange {
                status: i32::from(status.as_u16()),
                body: target,
                headers,
            };
        }

        match response.text().await {
            Ok(body) => Exchange {
                status: i32::from(status.as_u16()),
                body,
                headers,
            },
            Err(e) => Exchange::transport_failure(format!("Failed to read response body: {}", e)),
        }
    }

    /// Send a request and stream a successful body into `writer`.
    ///
    /// On a non-2xx status nothing is written and the body is buffered for
    /// diagnosis instead. An interruption mid-body reports a transport failure.
    pub async fn send_to_writer<W>(&self, request: ExchangeRequest<'_>, writer: &mut W) -> Exchange
    where
        W: AsyncWrite + Unpin,
    {
        let response = match self.dispatch(request).await {
            Ok(r) => r,
            Err(failure) => return failure,
        };

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Exchange {
                status: i32::from(status.as_u16()),
                body,
                headers,
            };
        }

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    return Exchange::transport_failure(format!(
                        "Transfer interrupted after {} bytes: {}",
                        written, e
                    ))
                }
            };
            if let Err(e) = writer.write_all(&chunk).await {
                return Exchange::transport_failure(format!("Failed to write output: {}", e));
            }
            written += chunk.len() as u64;
        }

        if let Err(e) = writer.flush().await {
            return Exchange::transport_failure(format!("Failed to flush output: {}", e));
        }

        debug!(bytes = written, "Response body streamed");

        Exchange {
            status: i32::from(status.as_u16()),
            body: String::new(),
            headers,
        }
    }

    async fn dispatch(
        &self,
        request: ExchangeRequest<'_>,
    ) -> std::result::Result<reqwest::Response, Exchange> {
        if let Some(problem) = request.invalid {
            return Err(Exchange::transport_failure(problem));
        }

        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token.secret());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        builder.send().await.map_err(|e| {
            Exchange::transport_failure(format!("Request to {} failed: {}", request.url, e))
        })
    }
}

/// Redirect target of a 302 response.
///
/// Absolute targets are kept verbatim.
fn redirect_target(request_url: &Url, headers: &HeaderMap) -> String {
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };

    if Url::parse(location).is_ok() {
        return location.to_string();
    }

    request_url
        .join(location)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}
