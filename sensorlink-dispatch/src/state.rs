use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use serde::Serialize;

use crate::edge::LinkId;

/// Counters served on `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub subpacket_errors: u64,
    pub measurements_buffered: u64,
    pub measurements_published: u64,
    pub batches_published: u64,
    pub publish_failures: u64,
    pub connected_links: u32,
    pub uptime_seconds: u64,
}

/// Shared state for tracking links and pipeline counters.
pub struct DispatchState {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    connected_links: HashSet<LinkId>,
    stats: DispatchStats,
    startup_time: Instant,
}

impl DispatchState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                connected_links: HashSet::new(),
                stats: DispatchStats::default(),
                startup_time: Instant::now(),
            })),
        }
    }

    /// Record that an edge link has connected.
    pub async fn link_connected(&self, link: LinkId) {
        let mut inner = self.inner.lock().await;
        inner.connected_links.insert(link);
    }

    pub async fn link_disconnected(&self, link: LinkId) {
        let mut inner = self.inner.lock().await;
        inner.connected_links.remove(&link);
    }

    /// Record a decoded frame and how many of its subpackets degraded.
    pub async fn frame_accepted(&self, measurements: usize, subpacket_errors: usize) {
        let mut inner = self.inner.lock().await;
        inner.stats.frames_accepted += 1;
        inner.stats.measurements_buffered += measurements as u64;
        inner.stats.subpacket_errors += subpacket_errors as u64;
    }

    pub async fn frame_rejected(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.frames_rejected += 1;
    }

    pub async fn batch_published(&self, measurements: usize) {
        let mut inner = self.inner.lock().await;
        inner.stats.batches_published += 1;
        inner.stats.measurements_published += measurements as u64;
    }

    pub async fn publish_failed(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.publish_failures += 1;
    }

    /// Get the number of currently connected links.
    pub async fn connected_count(&self) -> u32 {
        let inner = self.inner.lock().await;
        inner.connected_links.len() as u32
    }

    /// Current counters, with link count and uptime filled in.
    pub async fn snapshot(&self) -> DispatchStats {
        let inner = self.inner.lock().await;
        DispatchStats {
            connected_links: inner.connected_links.len() as u32,
            uptime_seconds: inner.startup_time.elapsed().as_secs(),
            ..inner.stats
        }
    }
}

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DispatchState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
