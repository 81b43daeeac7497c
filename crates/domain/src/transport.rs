//! Port for the external publish/subscribe transport.
//!
//! Connection management, channel lifecycle, acknowledgement mechanics and
//! reconnection all live behind this trait. The consumer only binds routing
//! keys, pulls deliveries one at a time, and reports how each one ended.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Delivery, DeliveryTag, ExchangeName};

/// How a delivery should be settled with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The delivery is finished with, successfully or not.
    Ack,
    /// Processing failed in a way the transport should know about; the
    /// transport decides whether to requeue or dead-letter.
    Reject,
}

/// Failure reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A routing-key binding was refused.
    #[error("failed to bind '{pattern}': {reason}")]
    Binding {
        /// The binding pattern.
        pattern: String,
        /// Why the transport refused it.
        reason: String,
    },

    /// The transport is closed and can deliver nothing further.
    #[error("transport closed")]
    Closed,

    /// Low-level I/O failure.
    #[error("transport I/O failure")]
    Io(#[from] std::io::Error),
}

/// The publish/subscribe capability consumed by an alert consumer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registers `pattern` on `exchange` so matching messages are delivered.
    async fn bind_routing_key(
        &self,
        exchange: &ExchangeName,
        pattern: &str,
    ) -> Result<(), TransportError>;

    /// Waits for the next delivery.
    ///
    /// `Ok(None)` signals orderly shutdown; `Err` is a fatal transport failure.
    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError>;

    /// Settles a delivery previously returned by [`Self::next_delivery`].
    async fn settle(&self, tag: DeliveryTag, disposition: Disposition)
        -> Result<(), TransportError>;
}
