//! Server metrics for observability
//!
//! Provides runtime counters for monitoring the relay and its engine link.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::session::LinkState;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Viewer connections
    /// Currently connected viewers
    pub active_connections: AtomicU64,
    /// Total viewer connections since server start
    pub total_connections: AtomicU64,

    // Message flow
    /// Inbound messages written to the ledger
    pub messages_received: AtomicU64,
    /// Outbound messages recorded (relay sends and other-device sends)
    pub messages_sent: AtomicU64,
    /// Inbound deliveries discarded by classification
    pub messages_skipped: AtomicU64,
    /// Viewer events lost to a lagging receiver
    pub messages_dropped: AtomicU64,

    // Engine link
    /// Sessions opened (first pairing included)
    pub link_opens: AtomicU64,
    /// Reconnect attempts after a non-logout close
    pub reconnects: AtomicU64,

    // Errors
    /// Ledger writes that failed on the inbound path
    pub persistence_errors: AtomicU64,
    /// Viewer socket errors
    pub websocket_errors: AtomicU64,

    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_dropped(&self, n: u64) {
        self.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn link_opened(&self) {
        self.link_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_attempted(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_error(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                skipped: self.messages_skipped.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
            link: LinkMetrics {
                opens: self.link_opens.load(Ordering::Relaxed),
                reconnects: self.reconnects.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                persistence: self.persistence_errors.load(Ordering::Relaxed),
                websocket: self.websocket_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub link: LinkMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub skipped: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkMetrics {
    pub opens: u64,
    pub reconnects: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub persistence: u64,
    pub websocket: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub link: LinkState,
    pub connections: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ServerMetrics::new();
        metrics.connection_opened();
        metrics.message_received();
        metrics.message_sent();
        metrics.messages_dropped(3);
        metrics.reconnect_attempted();
        metrics.persistence_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections.active, 1);
        assert_eq!(snapshot.messages.received, 1);
        assert_eq!(snapshot.messages.sent, 1);
        assert_eq!(snapshot.messages.dropped, 3);
        assert_eq!(snapshot.link.reconnects, 1);
        assert_eq!(snapshot.errors.persistence, 1);
    }
}
