//! In-process transport over a tokio channel.
//!
//! [`ChannelTransport`] behaves like a topic exchange living inside the
//! process: a [`Publisher`] pushes messages in, only messages covered by a
//! binding are delivered, and every settlement is recorded. Dropping every
//! publisher shuts the transport down in an orderly way.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use node_domain::{
    ContentEncoding, Delivery, DeliveryTag, Disposition, ExchangeName, Transport, TransportError,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::BindingTable;

/// A message as published, before routing.
#[derive(Debug, Clone)]
struct Published {
    exchange: String,
    routing_key: String,
    content_encoding: Option<String>,
    body: Vec<u8>,
}

/// Sending half of a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: mpsc::UnboundedSender<Published>,
}

impl Publisher {
    /// Publishes raw bytes.
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_encoding: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.sender
            .send(Published {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                content_encoding: content_encoding.map(str::to_string),
                body,
            })
            .map_err(|_| TransportError::Closed)
    }

    /// Serialises `body` as JSON and publishes it with a JSON encoding hint.
    pub fn publish_json<B: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|err| TransportError::Io(std::io::Error::other(err)))?;
        self.publish(
            exchange,
            routing_key,
            Some(ContentEncoding::Json.mime_type()),
            bytes,
        )
    }
}

/// Receiving half: the [`Transport`] handed to a consumer.
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: Mutex<mpsc::UnboundedReceiver<Published>>,
    bindings: Mutex<BindingTable>,
    settlements: Mutex<Vec<(DeliveryTag, Disposition)>>,
    next_tag: AtomicU64,
}

impl ChannelTransport {
    /// Creates a transport and the publisher feeding it.
    pub fn new() -> (Self, Publisher) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let transport = Self {
            receiver: Mutex::new(receiver),
            bindings: Mutex::new(BindingTable::default()),
            settlements: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(1),
        };
        (transport, Publisher { sender })
    }

    /// Every settlement received so far, in order.
    pub async fn settlements(&self) -> Vec<(DeliveryTag, Disposition)> {
        self.settlements.lock().await.clone()
    }

    /// Number of distinct bindings registered.
    pub async fn binding_count(&self) -> usize {
        self.bindings.lock().await.len()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn bind_routing_key(
        &self,
        exchange: &ExchangeName,
        pattern: &str,
    ) -> Result<(), TransportError> {
        self.bindings.lock().await.bind(exchange, pattern)
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
        let mut receiver = self.receiver.lock().await;
        while let Some(published) = receiver.recv().await {
            // bind_routing_key never takes the receiver lock, so nesting is safe.
            let routed = match ExchangeName::new(published.exchange.as_str()) {
                Ok(exchange) => self
                    .bindings
                    .lock()
                    .await
                    .routes(&exchange, &published.routing_key),
                Err(_) => false,
            };

            if !routed {
                debug!(
                    exchange = %published.exchange,
                    routing_key = %published.routing_key,
                    "no binding covers message; dropped"
                );
                continue;
            }

            let tag = DeliveryTag::new(self.next_tag.fetch_add(1, Ordering::Relaxed));
            return Ok(Some(Delivery {
                tag,
                routing_key: published.routing_key,
                content_encoding: published.content_encoding,
                body: published.body,
            }));
        }
        Ok(None)
    }

    async fn settle(
        &self,
        tag: DeliveryTag,
        disposition: Disposition,
    ) -> Result<(), TransportError> {
        self.settlements.lock().await.push((tag, disposition));
        Ok(())
    }
}
