//! Message bus client.
//!
//! Fans the subscribed channels of one extension into a single ordered
//! stream. Every subscription is drained by its own task; all tasks share the
//! process [`Lifecycle`] and exit at their next poll once it is stopped.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sonic_core::{Broker, BusError, BusMessage, BusResult, ChannelsPipeline, Lifecycle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default time a listener waits on its subscription before re-checking the
/// lifecycle flag.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(300);

/// A received message and the number of messages still queued behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: BusMessage,
    pub queue_length: usize,
}

/// The receiving end of [`BusClient::listen`].
pub struct Deliveries {
    rx: mpsc::UnboundedReceiver<BusMessage>,
    listeners: Vec<JoinHandle<()>>,
}

impl Deliveries {
    /// Waits for the next message.
    ///
    /// Returns `None` once every listener has exited and the queue is empty.
    pub async fn next(&mut self) -> Option<Delivery> {
        let message = self.rx.recv().await?;
        Some(Delivery {
            message,
            queue_length: self.rx.len(),
        })
    }

    /// Returns the number of listener tasks that are still running.
    pub fn active_listeners(&self) -> usize {
        self.listeners.iter().filter(|h| !h.is_finished()).count()
    }
}

/// Client of the shared message broker.
pub struct BusClient {
    broker: Arc<dyn Broker>,
    lifecycle: Lifecycle,
    poll_timeout: Duration,
    channels: Vec<String>,
}

impl BusClient {
    /// Connects to the broker and clears its stored data.
    pub async fn connect(broker: Arc<dyn Broker>, lifecycle: Lifecycle) -> BusResult<Self> {
        broker.ping().await?;
        broker.flush().await?;
        info!("Message broker is running");
        Ok(Self {
            broker,
            lifecycle,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            channels: Vec::new(),
        })
    }

    /// Sets how long each listener waits per poll.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Registers the channels an extension subscribes to.
    pub fn register(&mut self, channels: &ChannelsPipeline) {
        self.channels = channels.subscriptions().to_vec();
        debug!(channels = ?self.channels, "Registered subscriptions");
    }

    /// Returns the registered channels.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Returns the shared lifecycle flag.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Subscribes to every registered channel and starts one listener per
    /// subscription.
    pub async fn listen(&self) -> BusResult<Deliveries> {
        let subscriptions = try_join_all(
            self.channels
                .iter()
                .map(|channel| self.broker.subscribe(channel)),
        )
        .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = subscriptions
            .into_iter()
            .map(|mut subscription| {
                let tx = tx.clone();
                let lifecycle = self.lifecycle.clone();
                let timeout = self.poll_timeout;
                tokio::spawn(async move {
                    let channel = subscription.channel().to_string();
                    while lifecycle.is_running() {
                        match subscription.poll(timeout).await {
                            Ok(Some(message)) => {
                                if tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(channel = %channel, error = %e, "Subscription ended");
                                break;
                            }
                        }
                    }
                    debug!(channel = %channel, "Listener stopped");
                })
            })
            .collect();

        Ok(Deliveries { rx, listeners })
    }

    /// Stops every listener at its next poll.
    pub fn stop_listening(&self) {
        self.lifecycle.stop();
    }

    /// Publishes a payload and returns the number of receivers.
    pub async fn publish(&self, channel: &str, payload: impl Into<Vec<u8>>) -> BusResult<usize> {
        self.broker.publish(channel, payload.into()).await
    }

    pub async fn store(&self, name: &str, key: &str, value: impl Into<Vec<u8>>) -> BusResult<bool> {
        self.broker.store(name, key, value.into()).await
    }

    pub async fn retrieve(&self, name: &str, key: &str) -> BusResult<Option<Vec<u8>>> {
        self.broker.retrieve(name, key).await
    }

    pub async fn delete(&self, name: &str, key: &str) -> BusResult<bool> {
        self.broker.delete(name, key).await
    }

    /// Stores a value serialized as JSON.
    pub async fn store_json<T: Serialize>(&self, name: &str, key: &str, value: &T) -> BusResult<bool> {
        let bytes = serde_json::to_vec(value).map_err(|e| BusError::Other(e.to_string()))?;
        self.store(name, key, bytes).await
    }

    /// Retrieves a value stored with [`BusClient::store_json`].
    pub async fn retrieve_json<T: DeserializeOwned>(
        &self,
        name: &str,
        key: &str,
    ) -> BusResult<Option<T>> {
        match self.retrieve(name, key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BusError::Other(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBroker;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    fn pipeline(channels: &[&str]) -> ChannelsPipeline {
        ChannelsPipeline {
            subscribe: Some(channels.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        }
    }

    async fn client(broker: &Arc<MockBroker>) -> BusClient {
        BusClient::connect(broker.clone(), Lifecycle::new())
            .await
            .unwrap()
            .with_poll_timeout(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_connect_fails_when_down() {
        let broker = Arc::new(MockBroker::default());
        broker.down.store(true, Ordering::SeqCst);
        let result = BusClient::connect(broker, Lifecycle::new()).await;
        assert!(matches!(result, Err(BusError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fan_in_preserves_order_per_channel() {
        let broker = Arc::new(MockBroker::default());
        let mut client = client(&broker).await;
        client.register(&pipeline(&["features", "alerts"]));
        let mut deliveries = client.listen().await.unwrap();

        assert_eq!(client.publish("features", b"1".to_vec()).await.unwrap(), 1);
        client.publish("features", b"2".to_vec()).await.unwrap();
        client.publish("alerts", b"a".to_vec()).await.unwrap();

        let mut received: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for _ in 0..3 {
            let delivery = deliveries.next().await.unwrap();
            received
                .entry(delivery.message.channel)
                .or_default()
                .push(delivery.message.payload);
        }
        assert_eq!(received["features"], [b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(received["alerts"], [b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_queue_length_counts_backlog() {
        let broker = Arc::new(MockBroker::default());
        let mut client = client(&broker).await;
        client.register(&pipeline(&["features"]));
        let mut deliveries = client.listen().await.unwrap();

        for payload in [b"1", b"2", b"3"] {
            client.publish("features", payload.to_vec()).await.unwrap();
        }
        while deliveries.rx.len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(deliveries.next().await.unwrap().queue_length, 2);
        assert_eq!(deliveries.next().await.unwrap().queue_length, 1);
        assert_eq!(deliveries.next().await.unwrap().queue_length, 0);
    }

    #[tokio::test]
    async fn test_stop_listening_ends_stream() {
        let broker = Arc::new(MockBroker::default());
        let mut client = client(&broker).await;
        client.register(&pipeline(&["features", "alerts"]));
        let mut deliveries = client.listen().await.unwrap();

        client.stop_listening();
        assert!(deliveries.next().await.is_none());
        assert!(!client.lifecycle().is_running());
    }

    #[tokio::test]
    async fn test_no_subscriptions() {
        let broker = Arc::new(MockBroker::default());
        let client = client(&broker).await;
        let mut deliveries = client.listen().await.unwrap();
        assert!(deliveries.next().await.is_none());
    }

    #[tokio::test]
    async fn test_json_store_roundtrip() {
        let broker = Arc::new(MockBroker::default());
        let client = client(&broker).await;

        assert!(client.store_json("state", "count", &vec![1, 2, 3]).await.unwrap());
        assert!(!client.store_json("state", "count", &vec![4]).await.unwrap());
        let value: Option<Vec<i32>> = client.retrieve_json("state", "count").await.unwrap();
        assert_eq!(value, Some(vec![4]));

        assert!(client.delete("state", "count").await.unwrap());
        assert!(!client.delete("state", "count").await.unwrap());
        let gone: Option<Vec<i32>> = client.retrieve_json("state", "count").await.unwrap();
        assert_eq!(gone, None);
    }
}
