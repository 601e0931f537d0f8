use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use teachat_types::{ClientCommand, ServerEvent};

use crate::GatewayEvent;
use crate::client::GatewayConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) enum Outbound {
    Command(ClientCommand),
    Close,
}

/// Why a single connection ended.
enum ConnectionEnd {
    /// The consumer closed the handle or dropped the event receiver.
    Shutdown,
    /// The socket failed; reconnect.
    Lost,
}

/// Connect, serve, and reconnect with exponential backoff until shut down.
pub(crate) async fn run_gateway(
    config: GatewayConfig,
    endpoint: Url,
    mut cmd_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<GatewayEvent>,
) {
    let mut backoff = config.initial_backoff;
    let mut connected_before = false;

    loop {
        let attempt = match connect_or_close(&endpoint, &mut cmd_rx).await {
            Some(attempt) => attempt,
            None => {
                info!("Gateway closed while connecting");
                return;
            }
        };

        match attempt {
            Ok(socket) => {
                backoff = config.initial_backoff;
                let event = if connected_before {
                    info!("Gateway reconnected");
                    GatewayEvent::Reconnected
                } else {
                    info!("Gateway connected");
                    GatewayEvent::Connected
                };
                connected_before = true;
                if event_tx.send(event).is_err() {
                    return;
                }

                match run_connection(socket, &mut cmd_rx, &event_tx, config.heartbeat_interval)
                    .await
                {
                    ConnectionEnd::Shutdown => {
                        info!("Gateway closed");
                        return;
                    }
                    ConnectionEnd::Lost => {
                        if event_tx.send(GatewayEvent::Disconnected).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Gateway connect failed: {}", e);
            }
        }

        debug!("Reconnecting in {:?}", backoff);
        if !wait_backoff(backoff, &mut cmd_rx).await {
            info!("Gateway closed while disconnected");
            return;
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

/// Attempts one connection, discarding commands issued meanwhile. Returns
/// None if the handle asked to close before the attempt finished.
async fn connect_or_close(
    endpoint: &Url,
    cmd_rx: &mut mpsc::UnboundedReceiver<Outbound>,
) -> Option<Result<Socket, tokio_tungstenite::tungstenite::Error>> {
    let connect = connect_async(endpoint.as_str());
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => return Some(result.map(|(socket, _)| socket)),
            outbound = cmd_rx.recv() => match outbound {
                Some(Outbound::Command(cmd)) => {
                    warn!("Dropping {} command while connecting", cmd.name());
                }
                Some(Outbound::Close) | None => return None,
            },
        }
    }
}

/// Sleeps for `delay`, discarding commands issued meanwhile. Returns false if
/// the handle asked to close.
async fn wait_backoff(delay: Duration, cmd_rx: &mut mpsc::UnboundedReceiver<Outbound>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            outbound = cmd_rx.recv() => match outbound {
                Some(Outbound::Command(cmd)) => {
                    warn!("Dropping {} command while disconnected", cmd.name());
                }
                Some(Outbound::Close) | None => return false,
            },
        }
    }
}

async fn run_connection(
    socket: Socket,
    cmd_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    event_tx: &mpsc::UnboundedSender<GatewayEvent>,
    heartbeat_interval: Duration,
) -> ConnectionEnd {
    let (mut sender, mut receiver) = socket.split();

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("Gateway read failed: {}", e);
                        return ConnectionEnd::Lost;
                    }
                    None => return ConnectionEnd::Lost,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            trace!("<- {}", event.name());
                            if event_tx.send(GatewayEvent::Server(event)).is_err() {
                                let _ = sender.send(Message::Close(None)).await;
                                return ConnectionEnd::Shutdown;
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Bad gateway event: {} -- raw: {}",
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                        }
                    },
                    Message::Pong(_) => pong_received = true,
                    Message::Close(frame) => {
                        debug!("Server closed gateway: {:?}", frame);
                        return ConnectionEnd::Lost;
                    }
                    _ => {}
                }
            }
            outbound = cmd_rx.recv() => {
                let cmd = match outbound {
                    Some(Outbound::Command(cmd)) => cmd,
                    Some(Outbound::Close) | None => {
                        let _ = sender.send(Message::Close(None)).await;
                        return ConnectionEnd::Shutdown;
                    }
                };

                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Could not encode {} command: {}", cmd.name(), e);
                        continue;
                    }
                };
                trace!("-> {}", cmd.name());
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    warn!("Gateway write failed: {}", e);
                    return ConnectionEnd::Lost;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received {
                    pong_received = false;
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        return ConnectionEnd::Lost;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return ConnectionEnd::Lost;
                }
            }
        }
    }
}
