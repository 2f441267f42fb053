//! Redis-backed message broker.
//!
//! Channels map to redis pub/sub channels and the key-value store maps to
//! redis hashes, so extensions running as separate processes share both
//! with the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Msg, RedisError};
use sonic_core::{BoxedSubscription, Broker, BusError, BusMessage, BusResult, Subscription};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// How long to wait for the server when opening a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker talking to a redis server.
///
/// The command connection is opened on first use and shared afterwards;
/// every subscription holds its own pub/sub connection.
pub struct RedisBroker {
    client: Client,
    conn: OnceCell<MultiplexedConnection>,
    connect_timeout: Duration,
}

impl RedisBroker {
    /// Creates a broker for `url` without connecting.
    pub fn open(url: &str) -> BusResult<Self> {
        let client = Client::open(url).map_err(|e| BusError::Other(e.to_string()))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connection(&self) -> BusResult<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let addr = self.client.get_connection_info().addr.to_string();
                debug!(%addr, "Connecting to redis");
                tokio::time::timeout(
                    self.connect_timeout,
                    self.client.get_multiplexed_async_connection(),
                )
                .await
                .map_err(|_| BusError::Unavailable(format!("timed out connecting to {addr}")))?
                .map_err(bus_error)
            })
            .await?;
        Ok(conn.clone())
    }
}

fn bus_error(err: RedisError) -> BusError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        BusError::Unavailable(err.to_string())
    } else {
        BusError::Other(err.to_string())
    }
}

struct RedisSubscription {
    channel: String,
    messages: BoxStream<'static, Msg>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Option<BusMessage>> {
        match tokio::time::timeout(timeout, self.messages.next()).await {
            Err(_) => Ok(None),
            Ok(Some(msg)) => Ok(Some(BusMessage::new(
                msg.get_channel_name(),
                msg.get_payload_bytes(),
            ))),
            Ok(None) => Err(BusError::SubscriptionClosed {
                channel: self.channel.clone(),
            }),
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> BusResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(bus_error)?;
        Ok(())
    }

    async fn flush(&self) -> BusResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(bus_error)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<BoxedSubscription> {
        let mut pubsub = tokio::time::timeout(self.connect_timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| BusError::Unavailable("timed out opening subscription".to_string()))?
            .map_err(bus_error)?;
        pubsub.subscribe(channel).await.map_err(bus_error)?;
        trace!(channel, "Subscribed");
        Ok(Box::new(RedisSubscription {
            channel: channel.to_string(),
            messages: pubsub.into_on_message().boxed(),
        }))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<usize> {
        let mut conn = self.connection().await?;
        conn.publish(channel, payload).await.map_err(bus_error)
    }

    async fn store(&self, name: &str, key: &str, value: Vec<u8>) -> BusResult<bool> {
        let mut conn = self.connection().await?;
        let added: usize = conn.hset(name, key, value).await.map_err(bus_error)?;
        Ok(added > 0)
    }

    async fn retrieve(&self, name: &str, key: &str) -> BusResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.hget(name, key).await.map_err(bus_error)
    }

    async fn delete(&self, name: &str, key: &str) -> BusResult<bool> {
        let mut conn = self.connection().await?;
        let removed: usize = conn.hdel(name, key).await.map_err(bus_error)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_malformed_url() {
        assert!(matches!(
            RedisBroker::open("not a url"),
            Err(BusError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let broker = RedisBroker::open("redis://127.0.0.1:1/")
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));
        assert!(matches!(broker.ping().await, Err(BusError::Unavailable(_))));
        assert!(matches!(
            broker.store("state", "a", b"1".to_vec()).await,
            Err(BusError::Unavailable(_))
        ));
    }
}
