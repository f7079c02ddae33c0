use std::str::FromStr;
use tracing::{level_filters::LevelFilter, Level};
use tracing_subscriber::{
    fmt::{format::FmtSpan, Layer},
    prelude::*,
};

pub fn init(log_level: &str, json: bool) -> anyhow::Result<()> {
    let log_level_filter = LevelFilter::from_level(Level::from_str(log_level)?);

    let default_fmt_layer = Layer::default().with_writer(std::io::stderr);
    let fmt = match json {
        true => default_fmt_layer
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(log_level_filter)
            .boxed(),
        false => default_fmt_layer
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(log_level_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt).try_init()?;
    Ok(())
}
