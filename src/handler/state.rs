use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::auth::SharedSecret;
use super::destinations::{Destinations, ProviderCredential};
use crate::config::ProxyConfig;

#[derive(Clone)]
pub struct ProxyState {
    pub(crate) shared_secret: SharedSecret,
    pub(crate) destinations: Arc<Destinations>,
    pub(crate) http_client: reqwest::Client,
    pub(crate) max_envelope_bytes: usize,
}

impl ProxyState {
    pub fn new(
        config: &ProxyConfig,
        shared_secret: SharedSecret,
        providers: Vec<ProviderCredential>,
    ) -> Result<Self> {
        Ok(ProxyState {
            shared_secret,
            destinations: Arc::new(Destinations::new(config.allowed_prefixes.clone(), providers)),
            http_client: http_client(config)?,
            max_envelope_bytes: config.max_envelope_bytes,
        })
    }
}

fn http_client(config: &ProxyConfig) -> Result<reqwest::Client> {
    let http_client = reqwest::Client::builder()
        .https_only(config.https_only)
        .timeout(Duration::from_secs(config.upstream_timeout_secs))
        // Redirects could leave the allow-listed prefix.
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(http_client)
}
