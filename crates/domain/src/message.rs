//! Deliveries and decoded alert messages.
//!
//! A [`Delivery`] is what the transport hands over: routing key, encoding hint
//! and opaque body bytes. [`AlertMessage::decode`] turns it into a detached
//! value that is consumed once by the dispatcher and then dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ContentEncoding, Timestamp};

/// Transport-assigned identifier of one delivery, used to settle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    /// Creates a tag from the transport's raw counter value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message as delivered by the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag used to acknowledge or reject the delivery.
    pub tag: DeliveryTag,
    /// Hierarchical, period-delimited routing key.
    pub routing_key: String,
    /// Content-encoding hint from the message properties.
    pub content_encoding: Option<String>,
    /// Encoded message body.
    pub body: Vec<u8>,
}

/// Why a delivery could not be decoded. The message is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The delivery carried no content-encoding hint.
    #[error("delivery has no content encoding")]
    MissingEncoding,

    /// The content-encoding hint names an encoding this node cannot decode.
    #[error("unsupported content encoding '{0}'")]
    UnsupportedEncoding(String),

    /// The body is not a well-formed alert message.
    #[error("malformed message body")]
    Body(#[from] serde_json::Error),
}

/// Wire shape of an alert body; unknown fields are ignored.
#[derive(Deserialize)]
struct AlertBody {
    timestamp: Timestamp,
    payload: serde_json::Value,
}

/// A decoded alert, detached from the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Structured payload, interpreted only by the processing step.
    pub payload: serde_json::Value,
    /// Sender-assigned timestamp, passed through untouched.
    pub timestamp: Timestamp,
}

impl AlertMessage {
    /// Decodes a delivery using its content-encoding hint.
    pub fn decode(delivery: &Delivery) -> Result<Self, DecodeError> {
        let hint = delivery
            .content_encoding
            .as_deref()
            .ok_or(DecodeError::MissingEncoding)?;
        let encoding = ContentEncoding::from_hint(hint)
            .ok_or_else(|| DecodeError::UnsupportedEncoding(hint.to_string()))?;

        let body: AlertBody = match encoding {
            ContentEncoding::Json => serde_json::from_slice(&delivery.body)?,
        };

        Ok(Self {
            routing_key: delivery.routing_key.clone(),
            payload: body.payload,
            timestamp: body.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery(encoding: Option<&str>, body: &[u8]) -> Delivery {
        Delivery {
            tag: DeliveryTag::new(1),
            routing_key: "pump1.status".to_string(),
            content_encoding: encoding.map(str::to_string),
            body: body.to_vec(),
        }
    }

    #[test]
    fn decodes_json_body() {
        let body = br#"{"timestamp":"2024-05-01T12:00:00Z","payload":{"from":"pump1"},"msgop":5}"#;
        let message = AlertMessage::decode(&delivery(Some("application/json"), body)).unwrap();

        assert_eq!(message.routing_key, "pump1.status");
        assert_eq!(message.payload, json!({"from": "pump1"}));
        assert_eq!(message.timestamp.to_string(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn missing_encoding_is_rejected() {
        let err = AlertMessage::decode(&delivery(None, b"{}")).unwrap_err();
        assert!(matches!(err, DecodeError::MissingEncoding));
    }

    #[test]
    fn unsupported_encoding_is_rejected() {
        let err = AlertMessage::decode(&delivery(Some("application/msgpack"), b"\x80")).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedEncoding(ref e) if e == "application/msgpack"));
    }

    #[test]
    fn body_without_timestamp_is_malformed() {
        let err = AlertMessage::decode(&delivery(Some("application/json"), br#"{"payload":1}"#))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Body(_)));
    }
}
