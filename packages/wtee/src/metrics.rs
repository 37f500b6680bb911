//! Runtime counters for the bridge and its websocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::bridge::ChunkOutcome;

#[derive(Debug)]
pub struct BridgeMetrics {
    // Connections
    pub active_connections: AtomicU64,
    pub total_connections: AtomicU64,

    // Input
    pub bytes_read: AtomicU64,
    pub lines_broadcast: AtomicU64,

    // Fan-out
    /// Payloads queued to a client outbox
    pub messages_sent: AtomicU64,
    /// Payloads skipped because an outbox was full or closed
    pub messages_dropped: AtomicU64,

    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            lines_broadcast: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, outcome: &ChunkOutcome) {
        self.bytes_read
            .fetch_add(outcome.bytes as u64, Ordering::Relaxed);
        if outcome.delivery.delivered > 0 || outcome.delivery.dropped > 0 {
            self.lines_broadcast
                .fetch_add(outcome.lines as u64, Ordering::Relaxed);
        }
        self.messages_sent
            .fetch_add(outcome.delivery.delivered as u64, Ordering::Relaxed);
        self.messages_dropped
            .fetch_add(outcome.delivery.dropped as u64, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            input: InputMetrics {
                bytes_read: self.bytes_read.load(Ordering::Relaxed),
                lines_broadcast: self.lines_broadcast.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                sent: self.messages_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub input: InputMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMetrics {
    pub bytes_read: u64,
    pub lines_broadcast: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub sent: u64,
    pub dropped: u64,
}
