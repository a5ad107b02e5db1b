//! In-process cache invalidation bus
//!
//! Provides "this cached state is stale" signals between components that own a cache
//! and components that materialize views derived from it.
//!
//! # Architecture
//!
//! ```text
//! Owner (e.g. block list cache):
//!   1. Write succeeds against the document store
//!   2. publisher.publish(Topic::BlockList)
//!      ↓
//! tokio broadcast channel (fan-out to every attached listener)
//!      ↓
//! Listeners (e.g. feed paginator):
//!   3. Receive the signal (no payload beyond the topic)
//!   4. Re-read the owner's state and rebuild the derived view
//! ```
//!
//! Delivery is at-least-once per listener: a listener that falls behind the channel
//! capacity receives one collapsed signal for the topic instead of the skipped ones.
//!
//! # Example
//!
//! ```
//! use cache_invalidation::{InvalidationBus, Topic};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cache_invalidation::InvalidationError> {
//! let bus = InvalidationBus::new(16)?;
//! let subscriber = bus.subscriber(Topic::BlockList);
//! let handle = subscriber.subscribe(|msg| async move {
//!     println!("refetching after {:?}", msg.topic);
//!     Ok(())
//! });
//!
//! bus.publisher("feed").invalidate_block_list();
//! # handle.abort();
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

mod error;
mod stats;

pub use error::InvalidationError;
pub use stats::{InvalidationStats, StatsCollector};

type Result<T> = std::result::Result<T, InvalidationError>;

/// What went stale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Topic {
    BlockList,
    Custom(String),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::BlockList => write!(f, "block_list"),
            Topic::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        match s {
            "block_list" => Topic::BlockList,
            custom => Topic::Custom(custom.to_string()),
        }
    }
}

/// Invalidation signal. Carries no state, only identification for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub message_id: String,
    pub topic: Topic,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_service: String,
}

impl InvalidationMessage {
    pub fn signal(topic: Topic, source_service: String) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic,
            timestamp: chrono::Utc::now(),
            source_service,
        }
    }
}

/// Shared channel; cheap to clone
#[derive(Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationMessage>,
    stats: StatsCollector,
}

impl InvalidationBus {
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Create a bus buffering up to `capacity` undelivered signals per listener
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(InvalidationError::Configuration(
                "invalidation bus capacity must be at least 1".to_string(),
            ));
        }
        let (sender, _) = broadcast::channel(capacity);
        Ok(Self {
            sender,
            stats: StatsCollector::new(),
        })
    }

    pub fn publisher(&self, service_name: impl Into<String>) -> InvalidationPublisher {
        InvalidationPublisher {
            sender: self.sender.clone(),
            service_name: service_name.into(),
            stats: self.stats.clone(),
        }
    }

    /// Attach a listener for `topic`. Signals published after this call are retained
    /// for the listener even before [`InvalidationSubscriber::subscribe`] runs.
    pub fn subscriber(&self, topic: Topic) -> InvalidationSubscriber {
        InvalidationSubscriber {
            receiver: self.sender.subscribe(),
            topic,
            stats: self.stats.clone(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(Self::DEFAULT_CAPACITY);
        Self {
            sender,
            stats: StatsCollector::new(),
        }
    }
}

/// Publisher for invalidation signals
#[derive(Clone)]
pub struct InvalidationPublisher {
    sender: broadcast::Sender<InvalidationMessage>,
    service_name: String,
    stats: StatsCollector,
}

impl InvalidationPublisher {
    /// Publish a signal for `topic`
    ///
    /// Returns the number of listeners attached to the bus. Publishing with no
    /// listeners is not an error.
    pub fn publish(&self, topic: Topic) -> usize {
        let msg = InvalidationMessage::signal(topic, self.service_name.clone());
        debug!(
            message_id = %msg.message_id,
            topic = %msg.topic,
            source = %msg.source_service,
            "Publishing invalidation signal"
        );

        self.stats.record_publish();
        match self.sender.send(msg) {
            Ok(listeners) => {
                info!(listeners, "Invalidation signal published");
                listeners
            }
            Err(_) => {
                debug!("Invalidation signal published with no listeners attached");
                0
            }
        }
    }

    pub fn invalidate_block_list(&self) -> usize {
        self.publish(Topic::BlockList)
    }
}

/// Listener for one topic on the bus
pub struct InvalidationSubscriber {
    receiver: broadcast::Receiver<InvalidationMessage>,
    topic: Topic,
    stats: StatsCollector,
}

impl InvalidationSubscriber {
    /// Run `callback` for every signal on this listener's topic
    ///
    /// Returns the JoinHandle of the background task; aborting it detaches the listener.
    /// Callback errors are logged and do not end the subscription.
    pub fn subscribe<F, Fut>(self, callback: F) -> JoinHandle<()>
    where
        F: Fn(InvalidationMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Self {
            mut receiver,
            topic,
            stats,
        } = self;
        let callback = Arc::new(callback);

        info!(topic = %topic, "Subscribed to invalidation signals");

        tokio::spawn(async move {
            loop {
                let msg = match receiver.recv().await {
                    Ok(msg) if msg.topic == topic => msg,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Invalidation listener lagged; collapsing signals");
                        stats.record_lag(skipped);
                        InvalidationMessage::signal(topic.clone(), "lagged".to_string())
                    }
                    Err(RecvError::Closed) => break,
                };

                stats.record_delivery();
                if let Err(e) = callback(msg.clone()).await {
                    stats.record_callback_error();
                    error!(
                        error = %e,
                        message_id = %msg.message_id,
                        "Invalidation callback failed"
                    );
                }
            }

            warn!(topic = %topic, "Invalidation subscription ended");
        })
    }

    /// Stop subscription
    pub fn unsubscribe(handle: JoinHandle<()>) {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::BlockList.to_string(), "block_list");
        assert_eq!(Topic::Custom("profile".into()).to_string(), "profile");
    }

    #[test]
    fn test_topic_from_str() {
        assert_eq!(Topic::from("block_list"), Topic::BlockList);
        assert_eq!(Topic::from("profile"), Topic::Custom("profile".into()));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            InvalidationBus::new(0),
            Err(InvalidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus = InvalidationBus::default();
        assert_eq!(bus.publisher("test").invalidate_block_list(), 0);
        assert_eq!(bus.stats().messages_published, 1);
    }

    #[test]
    fn test_signal_carries_source() {
        let msg = InvalidationMessage::signal(Topic::BlockList, "feed".to_string());
        assert_eq!(msg.topic, Topic::BlockList);
        assert_eq!(msg.source_service, "feed");
        assert!(!msg.message_id.is_empty());
    }
}
