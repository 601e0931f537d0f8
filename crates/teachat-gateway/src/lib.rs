pub mod client;
pub mod connection;

use thiserror::Error;

use teachat_types::ServerEvent;

pub use client::{GatewayClient, GatewayConfig, GatewayHandle};

/// What the event channel reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// First successful connection.
    Connected,
    /// The connection was lost and has been re-established. Room
    /// subscriptions are NOT restored by the gateway.
    Reconnected,
    /// The connection was lost; a reconnect is pending.
    Disconnected,
    Server(ServerEvent),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported gateway url scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),

    #[error("gateway connection is closed")]
    Closed,
}
