#[allow(clippy::module_inception)]
mod config;

pub use config::{ProviderConfig, ProxyConfig};
