//! Request plumbing shared by the platform and wallet clients.
//!
//! Both services authenticate with an `X-API-KEY` header and answer with JSON.
//! [`ApiClient`] attaches the key and the per-request timeout, sends, and turns
//! the response into either the decoded body or a [`ClientError`] that keeps
//! the status and raw body for the caller to classify.

use std::fmt::Display;
use std::time::Duration;

use http::StatusCode;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Span;

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Errors that can occur while talking to an upstream service.
///
/// Every variant carries a static `context` naming the request, such as
/// `"POST /orders"`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A request URL could not be built.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The base URL cannot carry path segments.
    #[error("URL cannot be a base: {0}")]
    CannotBeABase(Url),
    /// Transport failure, including the per-request timeout.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The caller's overall deadline passed before a response arrived.
    #[error("deadline elapsed: {context}")]
    DeadlineElapsed {
        /// Human-readable context.
        context: &'static str,
    },
    /// A success response did not decode.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The service answered with a non-success status.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        body: String,
    },
    /// The response body could not be read.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// An authenticated JSON client for one upstream service.
#[derive(Clone, Debug)]
pub(crate) struct ApiClient {
    client: Client,
    api_key: String,
    timeout: Option<Duration>,
}

impl ApiClient {
    pub(crate) fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            timeout: None,
        }
    }

    pub(crate) const fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url)
    }

    /// Applies auth and timeout, sends, and decodes a JSON success body.
    pub(crate) async fn send_json<R>(
        &self,
        mut request: RequestBuilder,
        context: &'static str,
    ) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        request = request.header(API_KEY_HEADER, &self.api_key);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let http_response = request
            .send()
            .await
            .map_err(|e| ClientError::Http { context, source: e })?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| ClientError::ResponseBodyRead { context, source: e })?;
        let result = if status.is_success() {
            serde_json::from_str::<R>(&body)
                .map_err(|e| ClientError::JsonDeserialization { context, source: e })
        } else {
            Err(ClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

/// Ensures a base URL ends with `/` so relative joins append to it.
///
/// Returns the URL unchanged as the error if it cannot carry a path.
pub(crate) fn normalize_base(mut url: Url) -> Result<Url, Url> {
    if url.cannot_be_a_base() {
        return Err(url);
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Joins `segment` onto a normalized base URL.
pub(crate) fn join(
    base: &Url,
    segment: &'static str,
    context: &'static str,
) -> Result<Url, ClientError> {
    base.join(segment)
        .map_err(|source| ClientError::UrlParse { context, source })
}

/// Appends a path segment, percent-encoding it.
pub(crate) fn push_segment(url: &Url, segment: &str) -> Result<Url, ClientError> {
    let mut extended = url.clone();
    extended
        .path_segments_mut()
        .map_err(|()| ClientError::CannotBeABase(url.clone()))?
        .push(segment);
    Ok(extended)
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
