mod config;
mod terminal;

use tokio::sync::mpsc;
use tracing::info;

use teachat_api::RestClient;
use teachat_core::fetch::RestFetcher;
use teachat_core::session::SessionOptions;
use teachat_core::{ChannelSession, Identity, Runtime};
use teachat_gateway::{GatewayClient, GatewayConfig};

use crate::config::Config;
use crate::terminal::TerminalView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging on stderr; stdout belongs to the chat view
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teachat=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    // Event channel
    let (gateway, gateway_events) =
        GatewayClient::connect(GatewayConfig::new(config.ws_url.clone()), config.user_id)?;

    // Session wiring
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let fetcher = RestFetcher::new(RestClient::new(config.api_url.clone()), input_tx.clone());
    let session = ChannelSession::new(
        Identity {
            user_id: config.user_id,
            username: config.username.clone(),
        },
        Box::new(gateway.clone()),
        Box::new(fetcher),
        SessionOptions {
            send_timeout: config.send_timeout,
            ..SessionOptions::default()
        },
    );

    tokio::spawn(terminal::read_input(input_tx));

    info!(
        "teachat started as {} ({}) against {}",
        config.username, config.user_id, config.api_url
    );
    Runtime::new(session, TerminalView).run(input_rx, gateway_events).await;

    gateway.close();
    Ok(())
}
