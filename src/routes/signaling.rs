use crate::models::ClientEvent;
use crate::services::{BrokerError, BrokerHandle, ClientSession, DEFAULT_RELAY_BUFFER};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

/// Errors on a single signaling connection
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// WebSocket endpoint participants hold open for the whole visit
///
/// Each accepted socket gets its own task running a [`ClientSession`].
pub struct SignalingListener {
    listener: TcpListener,
    broker: BrokerHandle,
    relay_buffer: usize,
}

impl SignalingListener {
    pub async fn bind(addr: SocketAddr, broker: BrokerHandle) -> Result<Self, SignalingError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            broker,
            relay_buffer: DEFAULT_RELAY_BUFFER,
        })
    }

    /// Relayed frames each connection may have pending before further ones are dropped
    pub fn with_relay_buffer(mut self, relay_buffer: usize) -> Self {
        self.relay_buffer = relay_buffer;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SignalingError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) {
        info!("Signaling listener accepting on {:?}", self.listener.local_addr());

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let broker = self.broker.clone();
            let relay_buffer = self.relay_buffer;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, broker, relay_buffer).await {
                    debug!(%peer, "Connection ended with error: {}", e);
                }
            });
        }
    }
}

/// Drive one participant: socket frames in, mailbox signals out
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broker: BrokerHandle,
    relay_buffer: usize,
) -> Result<(), SignalingError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (mut session, mut signals) = ClientSession::open_with_relay_buffer(broker, relay_buffer).await?;
    let id = session.id();
    info!(connection = %id, %peer, "Participant connected");

    let result: Result<(), SignalingError> = loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if let Err(e) = session.handle_client_event(event).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => debug!(connection = %id, "Ignoring malformed frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
            signal = signals.recv() => {
                let Some(signal) = signal else {
                    break Err(BrokerError::Unavailable.into());
                };
                if let Some(event) = session.handle_signal(signal) {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => break Err(e.into()),
                    };
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        break Err(e.into());
                    }
                }
            }
        }
    };

    if let Err(e) = session.close().await {
        error!(connection = %id, "Failed to unregister connection: {}", e);
    }
    info!(connection = %id, %peer, "Participant disconnected");

    result
}
