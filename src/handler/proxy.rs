use super::errors::ProxyError;
use super::state::ProxyState;
use crate::envelope::{EnvelopeMethod, ProxyEnvelope};
use crate::metrics::consts as crate_metrics;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{self, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::instrument;

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

// Headers that describe the upstream connection rather than the payload.
static HOP_BY_HOP_HEADERS: [HeaderName; 6] = [
    http::header::CONNECTION,
    http::header::TRANSFER_ENCODING,
    http::header::TE,
    http::header::TRAILER,
    http::header::UPGRADE,
    http::header::PROXY_AUTHENTICATE,
];

fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn preflight() -> Response {
    (
        http::StatusCode::OK,
        [
            (http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (http::header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
            (http::header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
    )
        .into_response()
}

#[instrument(skip_all, err(level = tracing::Level::WARN), fields(request_id=uuid()))]
pub(crate) async fn proxy(
    State(state): State<ProxyState>,
    client_request: Request<Body>,
) -> Result<Response, ProxyError> {
    if client_request.method() == http::Method::OPTIONS {
        return Ok(preflight());
    }

    let request_start = Instant::now();

    let envelope_bytes = axum::body::to_bytes(client_request.into_body(), state.max_envelope_bytes)
        .await
        .map_err(|error| ProxyError::UnreadableBody(error.to_string()))?;
    let envelope = ProxyEnvelope::parse(&envelope_bytes).map_err(ProxyError::Validation)?;

    if !state.shared_secret.matches(&envelope.key) {
        return Err(ProxyError::InvalidKey);
    }

    if !state.destinations.is_allowed(&envelope.url) {
        tracing::debug!(url = envelope.url, "Destination not allow-listed.");
        return Err(ProxyError::UrlNotWhitelisted);
    }

    let proxy_request_headers = state.destinations.outbound_headers(&envelope)?;
    tracing::debug!(?proxy_request_headers);

    let ProxyEnvelope {
        url: proxy_request_url,
        method: proxy_request_method,
        body: proxy_request_body,
        ..
    } = envelope;

    let mut proxy_request = state
        .http_client
        .request(proxy_request_method.to_http(), &proxy_request_url)
        .headers(proxy_request_headers);
    match (proxy_request_method, proxy_request_body) {
        (EnvelopeMethod::Post, Some(body)) => proxy_request = proxy_request.body(body),
        (EnvelopeMethod::Get, Some(_)) => tracing::debug!("Dropping body of GET envelope."),
        (_, None) => {}
    }

    // Dropping this future (client disconnect) also drops the outbound request.
    let reqwest_start = Instant::now();
    let server_response = proxy_request
        .send()
        .await
        .map_err(ProxyError::from_upstream)?;

    let reqwest_duration = reqwest_start.elapsed();
    metrics::histogram!(crate_metrics::UPSTREAM_REQUEST_DURATION_SECS)
        .record(reqwest_duration.as_secs_f64());

    let server_response_status = server_response.status();
    let proxy_response_headers = relay_headers(server_response.headers());

    tracing::info!(
        %server_response_status,
        %proxy_request_method,
        proxy_request_url,
    );

    let server_response_body_stream = server_response.bytes_stream();
    let proxy_response_body_stream = Body::from_stream(server_response_body_stream);

    let processing_duration = request_start.elapsed() - reqwest_duration;
    metrics::histogram!(crate_metrics::PROXY_PROCESSING_DURATION_SECS)
        .record(processing_duration.as_secs_f64());

    Ok((
        server_response_status,
        proxy_response_headers,
        proxy_response_body_stream,
    )
        .into_response())
}

fn relay_headers(server_response_headers: &HeaderMap) -> HeaderMap {
    let mut headers = server_response_headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect::<HeaderMap>();
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_is_permissive() {
        let response = preflight();
        assert_eq!(response.status(), http::StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[http::header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[http::header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(headers[http::header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
    }

    #[test]
    fn relayed_headers_drop_hop_by_hop_and_add_cors() {
        let mut upstream = HeaderMap::new();
        upstream.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert("x-request-id", HeaderValue::from_static("req_123"));
        upstream.insert(
            http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://platform.openai.com"),
        );

        let relayed = relay_headers(&upstream);

        assert_eq!(relayed[http::header::CONTENT_TYPE], "application/json");
        assert_eq!(relayed["x-request-id"], "req_123");
        assert_eq!(relayed[http::header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(!relayed.contains_key(http::header::TRANSFER_ENCODING));
        assert!(!relayed.contains_key(http::header::CONNECTION));
    }
}
