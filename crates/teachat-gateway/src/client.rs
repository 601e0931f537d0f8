use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use teachat_types::{ClientCommand, UserId};

use crate::connection::{Outbound, run_gateway};
use crate::{GatewayError, GatewayEvent};

/// Heartbeat interval: the client sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// Builds the connect URL carrying the per-connection identity.
    pub fn endpoint(&self, user_id: UserId) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(GatewayError::UnsupportedScheme(other.to_string())),
        }
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string());
        Ok(url)
    }
}

pub struct GatewayClient;

impl GatewayClient {
    /// Opens the event channel for `user_id`. The connection (and every
    /// reconnect) runs on a spawned task; inbound events arrive on the
    /// returned receiver, which ends once the handle is closed.
    pub fn connect(
        config: GatewayConfig,
        user_id: UserId,
    ) -> Result<(GatewayHandle, mpsc::UnboundedReceiver<GatewayEvent>), GatewayError> {
        let endpoint = config.endpoint(user_id)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        info!("Opening gateway for user {} at {}", user_id, config.url);
        tokio::spawn(run_gateway(config, endpoint, cmd_rx, event_tx));

        Ok((GatewayHandle { cmd_tx }, event_rx))
    }
}

/// Cloneable sender side of the event channel.
#[derive(Clone)]
pub struct GatewayHandle {
    cmd_tx: mpsc::UnboundedSender<Outbound>,
}

impl GatewayHandle {
    /// Queues a command for the server. Commands issued while the socket is
    /// down are dropped by the connection task.
    pub fn emit(&self, command: ClientCommand) -> Result<(), GatewayError> {
        self.cmd_tx
            .send(Outbound::Command(command))
            .map_err(|_| GatewayError::Closed)
    }

    /// Closes the socket and stops reconnecting.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
