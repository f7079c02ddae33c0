use axum::{
    http::{self, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::envelope::ValidationErrors;
use crate::metrics::consts::PROXY_REJECTED;

pub(crate) enum ProxyError {
    Validation(ValidationErrors),
    UnreadableBody(String),
    InvalidKey,
    UrlNotWhitelisted,
    UpstreamTimeout,
    Upstream(String),
    Internal(anyhow::Error),
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Validation(errors) => write!(f, "Invalid envelope: {errors}"),
            ProxyError::UnreadableBody(error) => write!(f, "Couldn't read request body: {error}"),
            ProxyError::InvalidKey => write!(f, "Invalid key"),
            ProxyError::UrlNotWhitelisted => write!(f, "URL not whitelisted"),
            ProxyError::UpstreamTimeout => write!(f, "Upstream request timed out"),
            ProxyError::Upstream(error) => write!(f, "Upstream request failed: {error}"),
            ProxyError::Internal(error) => write!(f, "{error}"),
        }
    }
}

impl ProxyError {
    /// Label for requests turned away before anything was forwarded.
    fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            ProxyError::Validation(_) => Some("validation"),
            ProxyError::UnreadableBody(_) => Some("unreadable_body"),
            ProxyError::InvalidKey => Some("invalid_key"),
            ProxyError::UrlNotWhitelisted => Some("url_not_whitelisted"),
            ProxyError::UpstreamTimeout | ProxyError::Upstream(_) | ProxyError::Internal(_) => None,
        }
    }

    pub(crate) fn from_upstream(error: reqwest::Error) -> Self {
        match error.is_timeout() {
            true => ProxyError::UpstreamTimeout,
            false => ProxyError::Upstream(error.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if let Some(reason) = self.rejection_reason() {
            metrics::counter!(PROXY_REJECTED, "reason" => reason).increment(1);
        }
        let message = self.to_string();

        let mut response = match self {
            ProxyError::Validation(errors) => (
                http::StatusCode::BAD_REQUEST,
                [(http::header::CONTENT_TYPE, "application/json")],
                serde_json::to_string_pretty(&errors).unwrap_or_else(|_| errors.to_string()),
            )
                .into_response(),
            ProxyError::UnreadableBody(_) => {
                (http::StatusCode::BAD_REQUEST, message).into_response()
            }
            // Deliberately uninformative.
            ProxyError::InvalidKey | ProxyError::UrlNotWhitelisted => {
                (http::StatusCode::BAD_REQUEST, message).into_response()
            }
            ProxyError::UpstreamTimeout => {
                (http::StatusCode::GATEWAY_TIMEOUT, message).into_response()
            }
            ProxyError::Upstream(_) => {
                (http::StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
            ProxyError::Internal(error) => {
                tracing::error!(?error, "Internal error while proxying.");
                (http::StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        };

        response.headers_mut().insert(
            http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}

impl<E> From<E> for ProxyError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
