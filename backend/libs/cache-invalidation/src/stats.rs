//! Statistics tracking for cache invalidation operations

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationStats {
    pub messages_published: u64,
    pub messages_delivered: u64,
    /// Signals collapsed because a listener fell behind the channel capacity
    pub messages_lagged: u64,
    pub callback_errors: u64,
}

/// Thread-safe statistics collector shared by every publisher and listener of one bus
#[derive(Clone, Default)]
pub struct StatsCollector {
    messages_published: Arc<AtomicU64>,
    messages_delivered: Arc<AtomicU64>,
    messages_lagged: Arc<AtomicU64>,
    callback_errors: Arc<AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lag(&self, skipped: u64) {
        self.messages_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_callback_error(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics
    pub fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_lagged: self.messages_lagged.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
        }
    }
}
