use anyhow::{Context, Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};

use crate::handler::destinations::ProviderCredential;

const fn _default_listen_address() -> IpAddr { IpAddr::V4(Ipv4Addr::LOCALHOST) }
const fn _default_proxy_port() -> u16 { 60061 }
const fn _default_metrics_port() -> u16 { 60062 }
const fn _default_upstream_timeout_secs() -> u64 { 30 }
// Envelopes carry base64-encoded photos inside chat completion bodies.
const fn _default_max_envelope_bytes() -> usize { 32 * 1024 * 1024 }
const fn _default_https_only() -> bool { true }

const OPENAI_PREFIX: &str = "https://api.openai.com";

fn _default_allowed_prefixes() -> Vec<String> {
    vec![OPENAI_PREFIX.to_string()]
}

fn _default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        prefix: OPENAI_PREFIX.to_string(),
        credential_env: "OPENAI_KEY".to_string(),
    }]
}

#[derive(Deserialize, Clone, Debug)]
pub struct ProviderConfig {
    pub prefix: String,
    /// Name of the environment variable holding the bearer credential.
    pub credential_env: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ProxyConfig {
    #[serde(default = "_default_listen_address")]
    pub listen_address: IpAddr,
    #[serde(default = "_default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "_default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "_default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "_default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    #[serde(default = "_default_https_only")]
    pub https_only: bool,
    #[serde(default = "_default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,
    #[serde(default = "_default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_address: _default_listen_address(),
            proxy_port: _default_proxy_port(),
            metrics_port: _default_metrics_port(),
            upstream_timeout_secs: _default_upstream_timeout_secs(),
            max_envelope_bytes: _default_max_envelope_bytes(),
            https_only: _default_https_only(),
            allowed_prefixes: _default_allowed_prefixes(),
            providers: _default_providers(),
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.allowed_prefixes.is_empty(),
            "allowed_prefixes must contain at least one URL prefix."
        );
        for prefix in &self.allowed_prefixes {
            validate_prefix("allowed_prefixes", prefix)?;
        }
        for provider in &self.providers {
            validate_prefix("providers", &provider.prefix)?;
            anyhow::ensure!(
                !provider.credential_env.is_empty(),
                "Provider \"{}\" has an empty credential_env.",
                provider.prefix
            );
            if !self
                .allowed_prefixes
                .iter()
                .any(|allowed| provider.prefix.starts_with(allowed.as_str()))
            {
                tracing::warn!(
                    prefix = provider.prefix,
                    "Provider prefix is not covered by allowed_prefixes and will never be used."
                );
            }
        }
        anyhow::ensure!(self.upstream_timeout_secs > 0, "upstream_timeout_secs must be positive.");
        anyhow::ensure!(self.max_envelope_bytes > 0, "max_envelope_bytes must be positive.");
        Ok(())
    }

    /// Looks up every provider credential once, at startup.
    pub fn resolve_providers<F>(&self, lookup: F) -> Result<Vec<ProviderCredential>>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.providers
            .iter()
            .map(|provider| {
                let credential = lookup(&provider.credential_env)
                    .filter(|credential| !credential.is_empty())
                    .with_context(|| {
                        format!(
                            "Environment variable {} for provider \"{}\" is not set.",
                            provider.credential_env, provider.prefix
                        )
                    })?;
                Ok(ProviderCredential::new(&provider.prefix, credential))
            })
            .collect()
    }
}

fn validate_prefix(table: &str, prefix: &str) -> Result<()> {
    // An empty prefix would match every destination.
    if prefix.is_empty() {
        return Err(Error::msg(format!("{table} contains an empty prefix.")));
    }
    reqwest::Url::parse(prefix)
        .with_context(|| format!("{table} entry \"{prefix}\" is not an absolute URL."))?;
    Ok(())
}
