//! Session counters.
//!
//! Cheap atomic counters exposed passively through snapshots; nothing here
//! is required for correct operation.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    audio_packets: AtomicU64,
    video_packets: AtomicU64,
    resets: AtomicU64,
    teardowns: AtomicU64,
    relaunches: AtomicU64,
    reconnects: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audio_packet(&self) {
        self.audio_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn video_packet(&self) {
        self.video_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relaunch(&self) {
        self.relaunches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            audio_packets: self.audio_packets.load(Ordering::Relaxed),
            video_packets: self.video_packets.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            relaunches: self.relaunches.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub audio_packets: u64,
    pub video_packets: u64,
    pub resets: u64,
    pub teardowns: u64,
    pub relaunches: u64,
    pub reconnects: u64,
}

impl MetricsSnapshot {
    /// Connections currently attached, as far as the counters know.
    pub fn open_connections(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}
