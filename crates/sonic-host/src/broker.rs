//! In-process message broker.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sonic_core::{BoxedSubscription, Broker, BusError, BusMessage, BusResult, Subscription};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default number of messages buffered per channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broker keeping channels and stored hashes in memory.
///
/// A subscriber that falls more than the channel capacity behind loses the
/// oldest messages.
pub struct MemoryBroker {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<BusMessage>>>,
    hashes: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broker buffering up to `capacity` messages per channel.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
            hashes: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<BusMessage> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct MemorySubscription {
    channel: String,
    rx: broadcast::Receiver<BusMessage>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Option<BusMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(channel = %self.channel, skipped, "Subscriber lagged, messages dropped");
                Ok(None)
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => Err(BusError::SubscriptionClosed {
                channel: self.channel.clone(),
            }),
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> BusResult<()> {
        Ok(())
    }

    async fn flush(&self) -> BusResult<()> {
        self.hashes.write().clear();
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<BoxedSubscription> {
        let rx = self.sender(channel).subscribe();
        trace!(channel, "Subscribed");
        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            rx,
        }))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<usize> {
        let sender = self.channels.lock().get(channel).cloned();
        let Some(sender) = sender else {
            return Ok(0);
        };
        Ok(sender
            .send(BusMessage::new(channel, payload))
            .unwrap_or_default())
    }

    async fn store(&self, name: &str, key: &str, value: Vec<u8>) -> BusResult<bool> {
        Ok(self
            .hashes
            .write()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value)
            .is_none())
    }

    async fn retrieve(&self, name: &str, key: &str) -> BusResult<Option<Vec<u8>>> {
        Ok(self
            .hashes
            .read()
            .get(name)
            .and_then(|hash| hash.get(key))
            .cloned())
    }

    async fn delete(&self, name: &str, key: &str) -> BusResult<bool> {
        let mut hashes = self.hashes.write();
        let Some(hash) = hashes.get_mut(name) else {
            return Ok(false);
        };
        let removed = hash.remove(key).is_some();
        if hash.is_empty() {
            hashes.remove(name);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let broker = MemoryBroker::new();
        let mut first = broker.subscribe("features").await.unwrap();
        let mut second = broker.subscribe("features").await.unwrap();

        assert_eq!(broker.publish("features", b"x".to_vec()).await.unwrap(), 2);
        assert_eq!(first.poll(WAIT).await.unwrap().unwrap().payload, b"x");
        assert_eq!(second.poll(WAIT).await.unwrap().unwrap().channel, "features");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.publish("nobody", b"x".to_vec()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("quiet").await.unwrap();
        assert!(sub.poll(Duration::from_millis(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_recovers() {
        let broker = MemoryBroker::with_capacity(2);
        let mut sub = broker.subscribe("burst").await.unwrap();
        for i in 0..5u8 {
            broker.publish("burst", vec![i]).await.unwrap();
        }

        assert!(sub.poll(WAIT).await.unwrap().is_none());
        assert_eq!(sub.poll(WAIT).await.unwrap().unwrap().payload, [3]);
        assert_eq!(sub.poll(WAIT).await.unwrap().unwrap().payload, [4]);
    }

    #[tokio::test]
    async fn test_hash_store() {
        let broker = MemoryBroker::new();
        assert!(broker.store("state", "a", b"1".to_vec()).await.unwrap());
        assert!(!broker.store("state", "a", b"2".to_vec()).await.unwrap());
        assert_eq!(
            broker.retrieve("state", "a").await.unwrap(),
            Some(b"2".to_vec())
        );
        assert_eq!(broker.retrieve("state", "b").await.unwrap(), None);

        assert!(broker.delete("state", "a").await.unwrap());
        assert!(!broker.delete("state", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_clears_store() {
        let broker = MemoryBroker::new();
        broker.store("state", "a", b"1".to_vec()).await.unwrap();
        broker.flush().await.unwrap();
        assert_eq!(broker.retrieve("state", "a").await.unwrap(), None);
    }
}
