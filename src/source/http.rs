//! HTTP plumbing shared by the source adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::config::ConfigError;
use crate::listener::FetchError;

/// Longest response body excerpt carried into an error message.
const ERROR_BODY_LIMIT: usize = 256;

/// Build a client whose every request is bounded by `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("signalhub/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::validation(format!("failed to build HTTP client: {e}")))
}

/// Map an HTTP status to the error class the driver acts on.
///
/// Rejected requests (bad parameters, credentials, unknown resources) cannot
/// succeed on retry; throttling and server-side failures can.
pub(crate) fn classify_status(status: StatusCode, context: impl std::fmt::Display) -> FetchError {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => FetchError::unrecoverable(format!("{context}: HTTP {status}")),
        _ => FetchError::transient(format!("{context}: HTTP {status}")),
    }
}

/// Pass successful responses through; turn the rest into a classified error.
pub(crate) async fn check_status(
    response: Response,
    context: &str,
) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    tracing::debug!(status = %status, body = %excerpt, "{} rejected", context);
    Err(classify_status(status, context))
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return classify_status(status, "request failed");
        }
        if err.is_builder() {
            return FetchError::unrecoverable(format!("invalid request: {err}"));
        }
        if err.is_decode() {
            return FetchError::transient(format!("malformed response: {err}"));
        }
        FetchError::transient(err)
    }
}
