use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::ports::DashboardPort;
use crate::domain::signal::Alert;

/// Realtime fan-out to dashboard clients over a plain WebSocket: every
/// confirmed alert is both kept in a bounded replay buffer (for clients that
/// connect after it fired) and pushed onto a broadcast channel (for clients
/// already connected). Mirrors the Binance websocket manager's
/// broadcast-channel shape, just server-side instead of client-side.
pub struct DashboardBroadcaster {
    sender: broadcast::Sender<Alert>,
    replay: RwLock<VecDeque<Alert>>,
    replay_capacity: usize,
}

impl DashboardBroadcaster {
    pub fn new(replay_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender, replay: RwLock::new(VecDeque::with_capacity(replay_capacity)), replay_capacity }
    }

    /// Accepts WebSocket connections on `addr` until the process shuts down.
    /// Each connection is handled on its own task; one client's failure
    /// never disturbs another's.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await.context("failed to bind dashboard websocket listener")?;
        info!(%addr, "dashboard websocket listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "dashboard listener accept failed");
                    continue;
                }
            };
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.handle_connection(stream).await {
                    debug!(%peer, %err, "dashboard websocket connection ended");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await.context("websocket handshake failed")?;
        let (mut write, mut read) = ws.split();

        let backlog = self.replay.read().await.clone();
        for alert in &backlog {
            let text = serde_json::to_string(alert).context("failed to serialize backlog alert")?;
            write.send(Message::Text(text.into())).await.context("failed to send backlog alert")?;
        }

        let mut rx = self.sender.subscribe();
        loop {
            tokio::select! {
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            debug!(%err, "dashboard client read error");
                            break;
                        }
                    }
                }
                event = rx.recv() => {
                    match event {
                        Ok(alert) => {
                            let text = serde_json::to_string(&alert).context("failed to serialize alert")?;
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "dashboard client lagged behind broadcast");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardPort for DashboardBroadcaster {
    async fn broadcast_alert(&self, alert: &Alert) -> Result<()> {
        {
            let mut replay = self.replay.write().await;
            if replay.len() == self.replay_capacity {
                replay.pop_front();
            }
            replay.push_back(alert.clone());
        }
        // No receivers connected is not an error; the replay buffer still
        // covers anyone who connects later.
        let _ = self.sender.send(alert.clone());
        Ok(())
    }

    async fn replay(&self, limit: usize) -> Result<Vec<Alert>> {
        let replay = self.replay.read().await;
        Ok(replay.iter().rev().take(limit).cloned().collect())
    }
}
