//! Calls an allow-listed API through the proxy service.
//!
//! Every call is a single `POST` to the service endpoint whose JSON body is a
//! [`ProxyEnvelope`]; the method the caller asked for travels inside it.
//! The service's response is handed back untouched.

use std::collections::BTreeMap;

use reqwest::Url;
use tracing::instrument;

use crate::envelope::{EnvelopeMethod, ProxyEnvelope};

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Defaults to `GET`.
    pub method: Option<EnvelopeMethod>,
}

#[derive(Clone)]
pub struct ProxyClient {
    endpoint: Url,
    secret: String,
    http_client: reqwest::Client,
}

impl ProxyClient {
    pub fn new(endpoint: Url, secret: impl Into<String>) -> Self {
        Self::with_http_client(endpoint, secret, reqwest::Client::new())
    }

    pub fn with_http_client(
        endpoint: Url,
        secret: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        ProxyClient {
            endpoint,
            secret: secret.into(),
            http_client,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn envelope(&self, url: &str, options: FetchOptions) -> ProxyEnvelope {
        ProxyEnvelope {
            url: url.to_string(),
            method: options.method.unwrap_or_default(),
            headers: options.headers,
            body: options.body,
            key: self.secret.clone(),
        }
    }

    /// One attempt, no retry. Transport failures surface as the error; any
    /// status the service or destination returns is left for the caller.
    #[instrument(skip_all, level = tracing::Level::DEBUG, fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let envelope = self.envelope(url, options);
        tracing::debug!(method = %envelope.method, endpoint = %self.endpoint, "Sending envelope.");

        self.http_client
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ProxyClient {
        ProxyClient::new(
            Url::parse("https://proxy.example.workers.dev/").unwrap(),
            "2355633",
        )
    }

    #[test]
    fn envelope_defaults_to_get_without_body() {
        let envelope = client().envelope("https://api.openai.com/v1/models", FetchOptions::default());

        assert_eq!(envelope.method, EnvelopeMethod::Get);
        assert_eq!(envelope.body, None);
        assert!(envelope.headers.is_empty());
        assert_eq!(envelope.key, "2355633");
    }

    #[test]
    fn envelope_carries_caller_options() {
        let envelope = client().envelope(
            "https://api.openai.com/v1/chat/completions",
            FetchOptions {
                body: Some("{}".to_string()),
                headers: BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]),
                method: Some(EnvelopeMethod::Post),
            },
        );

        assert_eq!(envelope.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(envelope.method, EnvelopeMethod::Post);
        assert_eq!(envelope.body.as_deref(), Some("{}"));
        assert_eq!(envelope.headers["Content-Type"], "application/json");
    }

    #[test]
    fn debug_hides_the_secret() {
        assert!(!format!("{:?}", client()).contains("2355633"));
    }
}
