//! Forwarding proxy that lets a browser-only app call an allow-listed HTTP
//! API without holding the API's credential, plus the client that talks to it.

pub mod client;
pub mod config;
pub mod envelope;
pub mod handler;
pub mod logging;
pub mod metrics;
