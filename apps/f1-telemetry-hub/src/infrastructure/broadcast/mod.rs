//! Broadcast Manager
//!
//! Registry of live subscriber connections with concurrent fan-out.
//!
//! # Architecture
//!
//! Each [`Connection`] owns a bounded outbound queue drained by its
//! WebSocket writer task. A broadcast serializes the envelope once, then
//! pushes the same text to every target concurrently. Each push is bounded
//! by a send timeout; a connection whose queue is closed or stays full is
//! unregistered and told to close, without affecting the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::BroadcastPort;
use crate::domain::streaming::Envelope;
use crate::domain::subscription::{ConnectionId, SubscriptionSet, Topic};
use crate::infrastructure::metrics;

/// Serialized message shared by every recipient of a broadcast.
pub type OutboundMessage = Arc<str>;

// =============================================================================
// Errors
// =============================================================================

/// Failure to deliver to one connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection's outbound queue is gone.
    #[error("connection closed")]
    Closed,

    /// The outbound queue stayed full for the whole send timeout.
    #[error("send timed out")]
    Timeout,

    /// No connection with that id is registered.
    #[error("connection {0} is not registered")]
    NotConnected(ConnectionId),

    /// The envelope could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SendError {
    const fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Timeout => "timeout",
            Self::NotConnected(_) => "not_connected",
            Self::Encode(_) => "encode",
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One registered subscriber.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    subscriptions: RwLock<SubscriptionSet>,
    outbound: mpsc::Sender<OutboundMessage>,
    close: CancellationToken,
}

impl Connection {
    /// Wrap an existing outbound queue.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            subscriptions: RwLock::new(SubscriptionSet::new()),
            outbound,
            close: CancellationToken::new(),
        }
    }

    /// Create a connection together with the receiving end of its queue.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Cancelled when the manager wants this connection to go away.
    #[must_use]
    pub fn close_signal(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Whether `topic` should be delivered to this connection.
    #[must_use]
    pub fn accepts(&self, topic: Topic) -> bool {
        self.subscriptions.read().accepts(topic)
    }

    /// Subscribed topics.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.subscriptions.read().topics()
    }

    async fn send(&self, message: OutboundMessage, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.outbound.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::Timeout),
        }
    }
}

// =============================================================================
// Broadcast Manager
// =============================================================================

/// Registry of connections and fan-out entry point.
#[derive(Debug)]
pub struct BroadcastManager {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    send_timeout: Duration,
}

impl BroadcastManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Add a connection. Returns the new connection count.
    pub fn register(&self, connection: Arc<Connection>) -> usize {
        let count = {
            let mut connections = self.connections.write();
            connections.insert(connection.id(), connection);
            connections.len()
        };
        metrics::set_websocket_clients(count);
        tracing::info!(connections = count, "Subscriber connected");
        count
    }

    /// Remove a connection and signal it to close.
    ///
    /// Returns the removed connection, or `None` if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let (removed, count) = {
            let mut connections = self.connections.write();
            (connections.remove(&id), connections.len())
        };
        if let Some(connection) = &removed {
            connection.close.cancel();
            metrics::set_websocket_clients(count);
            tracing::info!(connection_id = %id, connections = count, "Subscriber removed");
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Add topics to a connection's subscription set.
    ///
    /// Returns the resulting topics, or `None` for an unknown connection.
    pub fn subscribe(&self, id: ConnectionId, topics: &[Topic]) -> Option<Vec<Topic>> {
        let connection = self.get(id)?;
        let mut set = connection.subscriptions.write();
        set.add(topics);
        Some(set.topics())
    }

    /// Remove topics from a connection's subscription set.
    ///
    /// Returns the resulting topics, or `None` for an unknown connection.
    pub fn unsubscribe(&self, id: ConnectionId, topics: &[Topic]) -> Option<Vec<Topic>> {
        let connection = self.get(id)?;
        let mut set = connection.subscriptions.write();
        set.remove(topics);
        Some(set.topics())
    }

    /// Topics a connection is subscribed to.
    #[must_use]
    pub fn subscriptions(&self, id: ConnectionId) -> Option<Vec<Topic>> {
        self.get(id).map(|connection| connection.topics())
    }

    /// Send to every connection. Returns the number of successful sends.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let targets: Vec<_> = self.connections.read().values().cloned().collect();
        self.deliver(envelope, targets).await
    }

    /// Send to connections whose subscriptions accept `topic`.
    pub async fn broadcast_filtered(&self, envelope: &Envelope, topic: Topic) -> usize {
        let targets: Vec<_> = self
            .connections
            .read()
            .values()
            .filter(|connection| connection.accepts(topic))
            .cloned()
            .collect();
        self.deliver(envelope, targets).await
    }

    /// Send to one connection, unregistering it if the send fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown, closed, or too slow.
    pub async fn send_to(&self, id: ConnectionId, envelope: &Envelope) -> Result<(), SendError> {
        let connection = self.get(id).ok_or(SendError::NotConnected(id))?;
        let message: OutboundMessage = envelope.to_json()?.into();

        match connection.send(message, self.send_timeout).await {
            Ok(()) => {
                metrics::record_messages_sent(envelope.kind, 1);
                Ok(())
            }
            Err(error) => {
                metrics::record_send_failure(error.reason());
                tracing::warn!(connection_id = %id, error = %error, "Send failed, dropping subscriber");
                self.unregister(id);
                Err(error)
            }
        }
    }

    /// Current subscriber count as a `CONNECTION_STATS` envelope.
    #[must_use]
    pub fn connection_stats(&self) -> Envelope {
        Envelope::connection_stats(self.count())
    }

    /// Signal every connection to close and clear the registry.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().map(|(_, c)| c).collect();
        for connection in &drained {
            connection.close.cancel();
        }
        metrics::set_websocket_clients(0);
        if !drained.is_empty() {
            tracing::info!(closed = drained.len(), "Closed all subscriber connections");
        }
        drained.len()
    }

    fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    async fn deliver(&self, envelope: &Envelope, targets: Vec<Arc<Connection>>) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let message: OutboundMessage = match envelope.to_json() {
            Ok(json) => json.into(),
            Err(error) => {
                tracing::warn!(error = %error, kind = ?envelope.kind, "Failed to encode broadcast");
                return 0;
            }
        };

        let sends = targets.iter().map(|connection| {
            let message = Arc::clone(&message);
            async move { (connection.id(), connection.send(message, self.send_timeout).await) }
        });
        let results = join_all(sends).await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(error) => {
                    metrics::record_send_failure(error.reason());
                    tracing::warn!(connection_id = %id, error = %error, "Broadcast send failed, dropping subscriber");
                    self.unregister(id);
                }
            }
        }

        metrics::record_messages_sent(envelope.kind, delivered as u64);
        tracing::debug!(kind = ?envelope.kind, delivered, targets = targets.len(), "Broadcast delivered");
        delivered
    }
}

#[async_trait]
impl BroadcastPort for BroadcastManager {
    fn count(&self) -> usize {
        Self::count(self)
    }

    async fn broadcast(&self, envelope: &Envelope) -> usize {
        Self::broadcast(self, envelope).await
    }

    async fn broadcast_filtered(&self, envelope: &Envelope, topic: Topic) -> usize {
        Self::broadcast_filtered(self, envelope, topic).await
    }
}
