use std::fmt;

use anyhow::Context;
use axum::http::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::envelope::ProxyEnvelope;

/// A bearer credential the service attaches when forwarding to `prefix`.
#[derive(Clone)]
pub struct ProviderCredential {
    prefix: String,
    credential: String,
}

impl ProviderCredential {
    pub fn new(prefix: impl Into<String>, credential: impl Into<String>) -> Self {
        ProviderCredential {
            prefix: prefix.into(),
            credential: credential.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// First 12 hex chars of the credential's SHA-256, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut digest = hex::encode(Sha256::digest(self.credential.as_bytes()));
        digest.truncate(12);
        digest
    }

    fn authorization(&self) -> anyhow::Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.credential))
            .context("Provider credential is not a valid header value")?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("prefix", &self.prefix)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// The allow-list and the credential rules are separate tables: a prefix can
/// be reachable without any credential being attached to it.
#[derive(Debug, Clone)]
pub(crate) struct Destinations {
    allowed_prefixes: Vec<String>,
    providers: Vec<ProviderCredential>,
}

impl Destinations {
    pub(crate) fn new(allowed_prefixes: Vec<String>, providers: Vec<ProviderCredential>) -> Self {
        Destinations {
            allowed_prefixes,
            providers,
        }
    }

    pub(crate) fn is_allowed(&self, url: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| matches_prefix(url, prefix))
    }

    pub(crate) fn provider_for(&self, url: &str) -> Option<&ProviderCredential> {
        self.providers
            .iter()
            .find(|provider| matches_prefix(url, &provider.prefix))
    }

    /// Caller headers verbatim, with the provider's `Authorization` taking
    /// precedence over any the caller supplied.
    pub(crate) fn outbound_headers(&self, envelope: &ProxyEnvelope) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(envelope.headers.len() + 1);
        for (name, value) in &envelope.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        if let Some(provider) = self.provider_for(&envelope.url) {
            tracing::debug!(
                prefix = provider.prefix,
                fingerprint = provider.fingerprint(),
                "Attaching provider credential."
            );
            headers.insert(http::header::AUTHORIZATION, provider.authorization()?);
        }

        Ok(headers)
    }
}

/// `url` continues `prefix` at a path boundary, has no userinfo, and
/// resolves to the same origin as `prefix`.
fn matches_prefix(url: &str, prefix: &str) -> bool {
    let Some(rest) = url.strip_prefix(prefix) else {
        return false;
    };
    let at_boundary = rest.is_empty()
        || prefix.ends_with('/')
        || rest.starts_with(|c: char| matches!(c, '/' | '?' | '#'));
    if !at_boundary {
        return false;
    }

    let (Ok(url), Ok(prefix)) = (Url::parse(url), Url::parse(prefix)) else {
        return false;
    };
    url.username().is_empty()
        && url.password().is_none()
        && url.scheme() == prefix.scheme()
        && url.host_str() == prefix.host_str()
        && url.port_or_known_default() == prefix.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeMethod;
    use std::collections::BTreeMap;

    fn destinations() -> Destinations {
        Destinations::new(
            vec![
                "https://api.openai.com".to_string(),
                "https://example.org/public".to_string(),
            ],
            vec![ProviderCredential::new("https://api.openai.com", "sk-provider")],
        )
    }

    fn envelope(url: &str, headers: &[(&str, &str)]) -> ProxyEnvelope {
        ProxyEnvelope {
            url: url.to_string(),
            method: EnvelopeMethod::Get,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            body: None,
            key: "s3cret".to_string(),
        }
    }

    #[test]
    fn allow_list_matches_on_prefix() {
        let destinations = destinations();
        assert!(destinations.is_allowed("https://api.openai.com/v1/models"));
        assert!(destinations.is_allowed("https://example.org/public/feed.json"));
        assert!(!destinations.is_allowed("https://evil.example.com/steal"));
        assert!(!destinations.is_allowed("http://api.openai.com/v1/models"));
        assert!(!destinations.is_allowed("https://example.org/private"));
    }

    #[test]
    fn userinfo_cannot_smuggle_another_host() {
        let destinations = destinations();
        let url = "https://api.openai.com@evil.example.com/steal";
        assert!(!destinations.is_allowed(url));
        assert!(destinations.provider_for(url).is_none());
        assert!(!destinations.is_allowed("https://user:pw@api.openai.com/v1/models"));
    }

    #[test]
    fn prefix_must_end_at_a_boundary() {
        let destinations = destinations();
        let url = "https://api.openai.com.evil.example.com/";
        assert!(!destinations.is_allowed(url));
        assert!(destinations.provider_for(url).is_none());
        assert!(!destinations.is_allowed("https://api.openai.com:8443/v1/models"));
        assert!(!destinations.is_allowed("https://example.org/publicity"));
        assert!(destinations.is_allowed("https://api.openai.com"));
        assert!(destinations.is_allowed("https://api.openai.com?x=1"));
        assert!(destinations.is_allowed("https://example.org/public#top"));
    }

    #[test]
    fn trailing_slash_prefix_allows_any_continuation() {
        assert!(matches_prefix("https://api.openai.com/v1/models", "https://api.openai.com/"));
        assert!(matches_prefix("https://api.openai.com/v1/models", "https://api.openai.com/v1/"));
        assert!(!matches_prefix("https://api.openai.com/v2/models", "https://api.openai.com/v1/"));
    }

    #[test]
    fn provider_credential_overrides_caller_authorization() -> anyhow::Result<()> {
        let headers = destinations().outbound_headers(&envelope(
            "https://api.openai.com/v1/chat/completions",
            &[("Authorization", "Bearer sk-user"), ("Content-Type", "application/json")],
        ))?;

        assert_eq!(headers.get_all(http::header::AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer sk-provider");
        assert!(headers[http::header::AUTHORIZATION].is_sensitive());
        assert_eq!(headers[http::header::CONTENT_TYPE], "application/json");
        Ok(())
    }

    #[test]
    fn provider_credential_added_when_caller_omits_it() -> anyhow::Result<()> {
        let headers = destinations()
            .outbound_headers(&envelope("https://api.openai.com/v1/models", &[]))?;
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer sk-provider");
        Ok(())
    }

    #[test]
    fn non_provider_headers_pass_through_unchanged() -> anyhow::Result<()> {
        let headers = destinations().outbound_headers(&envelope(
            "https://example.org/public/feed.json",
            &[("Authorization", "Token abc"), ("X-Trace", "1")],
        ))?;

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[http::header::AUTHORIZATION], "Token abc");
        assert_eq!(headers["x-trace"], "1");
        Ok(())
    }

    #[test]
    fn debug_output_hides_the_credential() {
        let provider = ProviderCredential::new("https://api.openai.com", "sk-provider");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-provider"));
        assert!(debug.contains(&provider.fingerprint()));
        assert_eq!(provider.fingerprint().len(), 12);
    }
}
