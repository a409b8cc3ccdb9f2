//! WebSocket transport server.
//!
//! Accepts observer/participant connections, attaches them to broadcast
//! channels, and feeds participant input into the pipeline. Clients speak
//! the JSON envelope from [`crate::transport::events`]: the first message
//! must be a `join`, then `user_message`/`reset_call`/`end_call`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::schema::GatewayConfig;
use crate::errors::PipelineError;
use crate::pipeline::ConversationPipeline;
use crate::transport::broadcast::Connection;
use crate::transport::events::{ClientEvent, ServerEvent};

/// WebSocket server exposing the conversation pipeline.
pub struct WsServer {
    config: GatewayConfig,
    pipeline: Arc<ConversationPipeline>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl WsServer {
    pub fn new(config: GatewayConfig, pipeline: Arc<ConversationPipeline>) -> Self {
        Self {
            config,
            pipeline,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Bind and start accepting connections in a background task.
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| anyhow!("invalid listen address: {e}"))?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
        let local_addr = listener.local_addr()?;

        info!("Transport listening on ws://{}", local_addr);

        let shutdown = self.shutdown.clone();
        let pipeline = self.pipeline.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer_addr)) => {
                                debug!("Connection from {}", peer_addr);
                                let pipeline = pipeline.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, pipeline).await {
                                        warn!("Connection {} closed with error: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept failed: {}", e);
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        info!("Transport shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Connection handle backed by the outbound write queue of one socket.
struct WsConnection {
    id: String,
    out_tx: UnboundedSender<String>,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, payload: &str) -> Result<()> {
        self.out_tx
            .send(payload.to_string())
            .map_err(|_| PipelineError::TransportDeliveryFailure(self.id.clone()).into())
    }
}

async fn handle_connection(stream: TcpStream, pipeline: Arc<ConversationPipeline>) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| anyhow!("websocket handshake failed: {e}"))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Writer task: the single owner of the sink half.
    let writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let conn_id = uuid::Uuid::new_v4().to_string();
    let conn = Arc::new(WsConnection {
        id: conn_id.clone(),
        out_tx: out_tx.clone(),
    });

    // The call this connection joined, once it has.
    let mut joined_call: Option<String> = None;

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                debug!("Socket error on {}: {}", conn_id, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        let reply = ServerEvent::error(format!("malformed message: {e}"));
                        let _ = out_tx.send(serde_json::to_string(&reply)?);
                        continue;
                    }
                };

                match event {
                    ClientEvent::Join { call_id, participant } => {
                        pipeline
                            .observer_join(&call_id, participant, conn.clone())
                            .await;
                        joined_call = Some(call_id);
                    }
                    ClientEvent::UserMessage { text, confidence } => {
                        let Some(call_id) = joined_call.as_deref() else {
                            let reply = ServerEvent::error("join a call before sending input");
                            let _ = out_tx.send(serde_json::to_string(&reply)?);
                            continue;
                        };
                        // Awaited inline so turns from one socket stay
                        // ordered; distinct calls run on their own sockets.
                        let result = pipeline
                            .handle_participant_input(call_id, &text, confidence.unwrap_or(1.0))
                            .await;
                        if let Err(e) = result {
                            if e.is_client_error() {
                                let reply = ServerEvent::error(e.to_string());
                                let _ = out_tx.send(serde_json::to_string(&reply)?);
                            }
                        }
                    }
                    ClientEvent::ResetCall => {
                        if let Some(call_id) = joined_call.as_deref() {
                            if let Err(e) = pipeline.reset_call(call_id).await {
                                warn!("Reset failed for {}: {}", call_id, e);
                            }
                        }
                    }
                    ClientEvent::EndCall => {
                        if let Some(call_id) = joined_call.as_deref() {
                            pipeline.end_call(call_id).await;
                        }
                        break;
                    }
                }
            }
            Message::Ping(_data) => {
                // tungstenite replies to pings automatically on flush; the
                // writer task flushes on every send.
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(call_id) = joined_call {
        pipeline.observer_leave(&call_id, &conn_id).await;
    }
    drop(out_tx);
    drop(conn);
    let _ = writer.await;
    Ok(())
}
