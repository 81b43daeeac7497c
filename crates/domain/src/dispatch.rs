//! Per-message alert dispatch.
//!
//! Every delivery goes through the same fixed lifecycle:
//!
//! ```text
//! RECEIVED -> DECODED -> ROUTED -> PROCESSED -> { ACKED | REPORTED_FAILURE }
//! ```
//!
//! The dispatcher holds no per-message state: a failure is contained within
//! its own pass and the next delivery starts from a clean slate. Only an
//! unclassified sink failure escapes as [`DispatchError`], so the transport
//! can apply its own requeue policy. The dispatcher never retries.

use std::backtrace::Backtrace;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    AlertMessage, DecodeError, Delivery, KeyMatch, RoutingKeyParser, SinkError, Timestamp,
};

// ---------------------------------------------------------------------------
// Processing step
// ---------------------------------------------------------------------------

/// Failure signalled by a processing step.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The step's sink reported a failure.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The step could not interpret the payload.
    #[error("payload rejected: {reason}")]
    Rejected {
        /// What was wrong with the payload.
        reason: String,
    },
}

/// Extension point where domain-specific handling of an alert lives.
///
/// Receives exactly the structured payload, the routing-key match and the
/// message timestamp.
#[async_trait]
pub trait AlertProcessor: Send + Sync {
    /// Handles one decoded alert.
    async fn process(
        &self,
        payload: &Value,
        key_match: &KeyMatch,
        timestamp: Timestamp,
    ) -> Result<(), ProcessError>;
}

/// Default processing step: logs the alert and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl AlertProcessor for LoggingProcessor {
    async fn process(
        &self,
        payload: &Value,
        key_match: &KeyMatch,
        timestamp: Timestamp,
    ) -> Result<(), ProcessError> {
        debug!("using default message consumption");
        info!(%timestamp, %payload, ?key_match, "alert received");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a single delivery ended, short of an escalated failure.
///
/// Every variant means the delivery may be acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The processing step completed.
    Processed {
        /// Routing-key match that was handed to the step.
        key_match: KeyMatch,
    },
    /// The delivery could not be decoded and was dropped.
    Discarded {
        /// Decode failure, rendered for reporting.
        reason: String,
    },
    /// The processing step rejected the payload.
    Rejected {
        /// Why the step rejected it.
        reason: String,
    },
    /// The sink has no registration for the sending endpoint.
    SinkConflict {
        /// Endpoint the sink did not know.
        endpoint: String,
    },
}

/// A per-message failure that must be surfaced to the transport.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The sink failed in a way that is not a known, recoverable condition.
    #[error("unrecoverable sink failure for '{routing_key}'")]
    Sink {
        /// Routing key of the failed delivery.
        routing_key: String,
        /// The sink failure.
        #[source]
        source: SinkError,
    },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs the per-message lifecycle for one consumer.
#[derive(Clone)]
pub struct AlertDispatcher {
    parser: RoutingKeyParser,
    processor: Arc<dyn AlertProcessor>,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("parser", &self.parser.pattern())
            .finish_non_exhaustive()
    }
}

impl AlertDispatcher {
    /// Creates a dispatcher using `parser` for every routing key.
    pub fn new(parser: RoutingKeyParser, processor: Arc<dyn AlertProcessor>) -> Self {
        Self { parser, processor }
    }

    /// The routing-key parser in use.
    pub fn parser(&self) -> &RoutingKeyParser {
        &self.parser
    }

    /// Runs one delivery through decode, routing and processing.
    ///
    /// # Errors
    ///
    /// Only [`DispatchError::Sink`], for sink failures other than a missing
    /// endpoint registration. Everything else is reported and folded into a
    /// [`DispatchOutcome`].
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<DispatchOutcome, DispatchError> {
        debug!(routing_key = %delivery.routing_key, tag = %delivery.tag, "in process_message callback");

        let message = match AlertMessage::decode(delivery) {
            Ok(message) => message,
            Err(err) => return Ok(Self::discard(delivery, &err)),
        };

        let key_match = self.parser.match_key(&message.routing_key);

        let result = self
            .processor
            .process(&message.payload, &key_match, message.timestamp)
            .await;

        match result {
            Ok(()) => {
                debug!(routing_key = %message.routing_key, "alert processed");
                Ok(DispatchOutcome::Processed { key_match })
            }
            Err(ProcessError::Rejected { reason }) => {
                warn!(
                    routing_key = %message.routing_key,
                    %reason,
                    "processing step rejected payload (trying to continue running)"
                );
                Ok(DispatchOutcome::Rejected { reason })
            }
            Err(ProcessError::Sink(SinkError::KnownConflict { endpoint })) => {
                error!(
                    routing_key = %message.routing_key,
                    %endpoint,
                    "unable to log for endpoint, not registered with sink"
                );
                Ok(DispatchOutcome::SinkConflict { endpoint })
            }
            Err(ProcessError::Sink(source)) => {
                warn!(
                    routing_key = %message.routing_key,
                    error = %source,
                    "unknown error during sink insert"
                );
                debug!("backtrace follows:\n{}", Backtrace::force_capture());
                Err(DispatchError::Sink {
                    routing_key: message.routing_key,
                    source,
                })
            }
        }
    }

    fn discard(delivery: &Delivery, err: &DecodeError) -> DispatchOutcome {
        warn!(
            routing_key = %delivery.routing_key,
            tag = %delivery.tag,
            error = %err,
            "dropping undecodable delivery (trying to continue running)"
        );
        DispatchOutcome::Discarded {
            reason: err.to_string(),
        }
    }
}
