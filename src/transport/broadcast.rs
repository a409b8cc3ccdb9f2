//! Broadcast channels: call id → live observer connections.
//!
//! The hub owns connection handles per call and fans out ordered events to
//! all of them. Per-connection delivery failures are isolated — one slow or
//! dead observer never blocks the rest — and failing connections are pruned
//! opportunistically. Removing a connection from a channel never destroys
//! it elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::transport::events::ServerEvent;

/// One live transport connection. Implementations: WebSocket observer,
/// in-memory capture (tests, demo CLI).
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> &str;

    /// Deliver one serialized event. Errors mark the connection stale.
    async fn send(&self, payload: &str) -> Result<()>;
}

/// Fan-out hub for all calls.
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, Vec<Arc<dyn Connection>>>>,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Add a connection to a call's channel. Returns the observer count.
    pub async fn join(&self, call_id: &str, conn: Arc<dyn Connection>) -> usize {
        let mut channels = self.channels.lock().await;
        let conns = channels.entry(call_id.to_string()).or_default();
        conns.push(conn);
        debug!("Observer joined call {} ({} total)", call_id, conns.len());
        conns.len()
    }

    /// Remove a connection from a call's channel. Returns how many
    /// observers remain — the caller finalizes the session end time when
    /// this reaches zero.
    pub async fn leave(&self, call_id: &str, conn_id: &str) -> usize {
        let mut channels = self.channels.lock().await;
        let remaining = match channels.get_mut(call_id) {
            Some(conns) => {
                conns.retain(|c| c.id() != conn_id);
                conns.len()
            }
            None => 0,
        };
        if remaining == 0 {
            channels.remove(call_id);
        }
        debug!("Observer left call {} ({} remain)", call_id, remaining);
        remaining
    }

    /// Deliver an event to every live connection for a call, in join
    /// order. Returns the number of successful deliveries.
    ///
    /// Events are serialized once; messages reach each connection in the
    /// order `broadcast` was invoked because turn production is serialized
    /// per call upstream.
    pub async fn broadcast(&self, call_id: &str, event: &ServerEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize event for call {}: {}", call_id, e);
                return 0;
            }
        };

        let conns: Vec<Arc<dyn Connection>> = {
            let channels = self.channels.lock().await;
            match channels.get(call_id) {
                Some(conns) => conns.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut stale: Vec<String> = Vec::new();
        for conn in &conns {
            match conn.send(&payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let err = PipelineError::TransportDeliveryFailure(conn.id().to_string());
                    warn!("{} ({})", err, e);
                    stale.push(conn.id().to_string());
                }
            }
        }

        // Prune connections that failed delivery.
        if !stale.is_empty() {
            let mut channels = self.channels.lock().await;
            if let Some(conns) = channels.get_mut(call_id) {
                conns.retain(|c| !stale.iter().any(|s| s == c.id()));
                if conns.is_empty() {
                    channels.remove(call_id);
                }
            }
        }

        delivered
    }

    /// Deliver an event to a single connection (join acks, client errors).
    pub async fn send_to(&self, call_id: &str, conn_id: &str, event: &ServerEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(_) => return,
        };
        let conn = {
            let channels = self.channels.lock().await;
            channels
                .get(call_id)
                .and_then(|conns| conns.iter().find(|c| c.id() == conn_id).cloned())
        };
        if let Some(conn) = conn {
            if let Err(e) = conn.send(&payload).await {
                warn!("Direct send to {} failed: {}", conn_id, e);
            }
        }
    }

    pub async fn observer_count(&self, call_id: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(call_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// In-memory connection (tests and the demo CLI)
// ---------------------------------------------------------------------------

/// Connection that records every delivered payload in memory.
pub struct MemoryConnection {
    id: String,
    sent: std::sync::Mutex<Vec<String>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryConnection {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            sent: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Make every subsequent send fail (stale-connection tests).
    pub fn set_failing(&self, failing: bool) {
        self.fail
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Raw payloads delivered so far.
    pub fn payloads(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Delivered payloads parsed back into events.
    pub fn events(&self) -> Vec<ServerEvent> {
        self.payloads()
            .iter()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, payload: &str) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PipelineError::TransportDeliveryFailure(self.id.clone()).into());
        }
        self.sent.lock().expect("sent lock").push(payload.to_string());
        Ok(())
    }
}
