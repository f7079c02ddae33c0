use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use api_proxy::client::{FetchOptions, ProxyClient};
use api_proxy::config::ProxyConfig;
use api_proxy::envelope::EnvelopeMethod;
use api_proxy::handler::{self, auth::SharedSecret, state::ProxyState};
use api_proxy::{logging, metrics};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[arg(long, action, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy service.
    Serve {
        #[arg(long, default_value = "config.toml")]
        config_file: String,

        #[arg(long, env = "API_PROXY_SHARED_SECRET", hide_env_values = true)]
        shared_secret: String,
    },
    /// Send one request through a running proxy and print the response body.
    Fetch {
        #[arg(long, env = "API_PROXY_ENDPOINT")]
        endpoint: reqwest::Url,

        #[arg(long, env = "API_PROXY_SHARED_SECRET", hide_env_values = true)]
        secret: String,

        #[arg(long)]
        url: String,

        #[arg(long, value_enum, default_value_t = MethodArg::Get)]
        method: MethodArg,

        #[arg(long)]
        body: Option<String>,

        /// "Name: value", repeatable.
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Get,
    Post,
}

impl From<MethodArg> for EnvelopeMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => EnvelopeMethod::Get,
            MethodArg::Post => EnvelopeMethod::Post,
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got \"{raw}\""))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in \"{raw}\""));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level, args.json)?;

    match args.command {
        Command::Serve {
            config_file,
            shared_secret,
        } => serve(&config_file, &shared_secret).await,
        Command::Fetch {
            endpoint,
            secret,
            url,
            method,
            body,
            headers,
        } => {
            let options = FetchOptions {
                body,
                headers: headers.into_iter().collect::<BTreeMap<_, _>>(),
                method: Some(method.into()),
            };
            fetch(ProxyClient::new(endpoint, secret), &url, options).await
        }
    }
}

async fn serve(config_file: &str, shared_secret: &str) -> Result<()> {
    let config: ProxyConfig = toml::from_str(
        &std::fs::read_to_string(config_file)
            .with_context(|| format!("Couldn't read config file {config_file}"))?,
    )?;

    config.validate()?;

    let shared_secret = SharedSecret::new(shared_secret)?;
    let providers = config.resolve_providers(|name| std::env::var(name).ok())?;
    for provider in &providers {
        tracing::info!(
            prefix = provider.prefix(),
            fingerprint = provider.fingerprint(),
            "Loaded provider credential."
        );
    }

    let loopback_address = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let metrics_socket_addr = SocketAddr::new(loopback_address, config.metrics_port);
    metrics::init(metrics_socket_addr)?;

    let state = ProxyState::new(&config, shared_secret, providers)?;

    let proxy_socket_addr = SocketAddr::new(config.listen_address, config.proxy_port);

    let listener = tokio::net::TcpListener::bind(proxy_socket_addr)
        .await
        .with_context(|| format!("Couldn't bind {proxy_socket_addr}"))?;

    tracing::info!(
        allowed_prefixes = ?config.allowed_prefixes,
        "Starting server on {proxy_socket_addr}..."
    );

    axum::serve(listener, handler::app(state).into_make_service()).await?;

    Ok(())
}

async fn fetch(client: ProxyClient, url: &str, options: FetchOptions) -> Result<()> {
    let response = client.fetch(url, options).await?;
    let status = response.status();
    tracing::info!(%status, endpoint = %client.endpoint(), "Proxy responded.");

    println!("{}", response.text().await?);

    anyhow::ensure!(!status.is_client_error() && !status.is_server_error(), "Request failed with {status}");
    Ok(())
}
