use std::{net::SocketAddr, num::NonZero, time::Duration};

use anyhow::Context;
use metrics_exporter_prometheus::{self, PrometheusBuilder};

pub fn init(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_bucket_duration(Duration::from_secs(60))?
        .set_bucket_count(NonZero::new(5).context("Bucket count must be non-zero")?)
        .install()?;
    Ok(())
}
