//! Publish/subscribe broker contract.
//!
//! Payloads are opaque bytes. The broker also offers a small hash-style
//! key-value store that extensions use to share state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BusResult;

/// A message received from a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The channel the message was published on.
    pub channel: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Creates a new message.
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// A live subscription to one channel.
#[async_trait]
pub trait Subscription: Send {
    /// The subscribed channel.
    fn channel(&self) -> &str;

    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn poll(&mut self, timeout: Duration) -> BusResult<Option<BusMessage>>;
}

/// Boxed subscription.
pub type BoxedSubscription = Box<dyn Subscription>;

/// A publish/subscribe broker with a hash key-value store.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Checks that the broker is reachable.
    async fn ping(&self) -> BusResult<()>;

    /// Clears all stored data.
    async fn flush(&self) -> BusResult<()>;

    /// Subscribes to a channel.
    async fn subscribe(&self, channel: &str) -> BusResult<BoxedSubscription>;

    /// Publishes a payload, returning the number of receivers.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<usize>;

    /// Stores `value` under field `key` of hash `name`.
    ///
    /// Returns `true` if the field was newly created.
    async fn store(&self, name: &str, key: &str, value: Vec<u8>) -> BusResult<bool>;

    /// Reads field `key` of hash `name`.
    async fn retrieve(&self, name: &str, key: &str) -> BusResult<Option<Vec<u8>>>;

    /// Removes field `key` of hash `name`, returning whether it existed.
    async fn delete(&self, name: &str, key: &str) -> BusResult<bool>;
}
