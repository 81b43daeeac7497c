//! Persistence-sink port and the sink-backed processing step.
//!
//! The sink is an external destination for alert values (typically a table
//! keyed by endpoint name). This module defines the port, the record written
//! through it, and how backend failures are classified.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{AlertProcessor, KeyMatch, ProcessError, Timestamp};

/// Text a backend uses when the referenced endpoint has no registration.
pub const UNKNOWN_ENDPOINT_MARKER: &str = "no known endpoint with name";

/// Value keys copied from the payload's `values` object when present.
const VALUE_KEYS: [&str; 3] = ["value_raw", "value_cal", "memo"];

/// Failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink does not know the referenced endpoint. Expected and
    /// recoverable: the endpoint simply has not been registered sink-side.
    #[error("sink has no registration for endpoint '{endpoint}'")]
    KnownConflict {
        /// Endpoint name as reported by the backend.
        endpoint: String,
    },

    /// Any other sink failure.
    #[error("sink failure: {message}")]
    Unknown {
        /// Backend error text.
        message: String,
    },
}

impl SinkError {
    /// Classifies a backend error message.
    pub fn from_backend_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match message.split_once(UNKNOWN_ENDPOINT_MARKER) {
            Some((_, rest)) => Self::KnownConflict {
                endpoint: rest
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>')
                    .to_string(),
            },
            None => Self::Unknown { message },
        }
    }
}

/// One row written to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    /// Endpoint that published the value (payload `from`).
    pub endpoint_name: String,
    /// Message timestamp, unchanged.
    pub timestamp: Timestamp,
    /// Raw reading, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_raw: Option<Value>,
    /// Calibrated reading, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_cal: Option<Value>,
    /// Free-text note, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<Value>,
}

impl AlertRecord {
    /// Builds a record from an alert payload.
    ///
    /// Returns `None` if the payload has no string `from` field.
    pub fn from_payload(payload: &Value, timestamp: Timestamp) -> Option<Self> {
        let endpoint_name = payload.get("from")?.as_str()?.to_string();
        let values = payload.get("values");
        let [value_raw, value_cal, memo] =
            VALUE_KEYS.map(|key| values.and_then(|values| values.get(key)).cloned());

        Some(Self {
            endpoint_name,
            timestamp,
            value_raw,
            value_cal,
            memo,
        })
    }
}

/// Port for the external persistence sink.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Writes one record.
    async fn insert(&self, record: &AlertRecord) -> Result<(), SinkError>;
}

/// Processing step that writes every alert into an [`AlertSink`].
#[derive(Debug)]
pub struct SinkProcessor<S> {
    sink: S,
}

impl<S: AlertSink> SinkProcessor<S> {
    /// Wraps a sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[async_trait]
impl<S: AlertSink> AlertProcessor for SinkProcessor<S> {
    async fn process(
        &self,
        payload: &Value,
        _key_match: &KeyMatch,
        timestamp: Timestamp,
    ) -> Result<(), ProcessError> {
        let record =
            AlertRecord::from_payload(payload, timestamp).ok_or_else(|| ProcessError::Rejected {
                reason: "payload has no string 'from' field".to_string(),
            })?;
        self.sink.insert(&record).await?;
        Ok(())
    }
}
