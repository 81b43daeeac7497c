//! Core domain for an instrument-monitoring node.
//!
//! This crate contains the node's configuration graph, the routing-key parser,
//! alert decoding and dispatch, and the port traits that infrastructure crates
//! implement (transport, processing step, persistence sink).
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate opens no connections.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype names (`NodeName`, `InstrumentName`, `ExchangeName`, etc.) |
//! | [`types`] | Shared value types (`InstrumentData`, `ContentEncoding`, `Timestamp`) |
//! | [`errors`] | Construction and lookup errors |
//! | [`config`] | [`ConfigGraph`] built from a YAML document |
//! | [`routing`] | [`RoutingKeyParser`] and its [`KeyMatch`] outcomes |
//! | [`message`] | [`Delivery`] and [`AlertMessage`] decoding |
//! | [`dispatch`] | [`AlertDispatcher`] and the [`AlertProcessor`] extension point |
//! | [`sink`] | [`AlertSink`] port and the sink-backed processor |
//! | [`transport`] | [`Transport`] port |

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod identifiers;
pub mod message;
pub mod routing;
pub mod sink;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::ConfigGraph;
pub use dispatch::{
    AlertDispatcher, AlertProcessor, DispatchError, DispatchOutcome, LoggingProcessor,
    ProcessError,
};
pub use errors::{ConstructionError, EntityKind, LookupError};
pub use identifiers::{
    BrokerAddress, ConsumerName, EndpointName, ExchangeName, InstrumentName, NameError, NodeName,
    SEGMENT_SEPARATOR,
};
pub use message::{AlertMessage, DecodeError, Delivery, DeliveryTag};
pub use routing::{CaptureMap, KeyMatch, RoutingKeyParser, RoutingPatternError};
pub use sink::{AlertRecord, AlertSink, SinkError, SinkProcessor, UNKNOWN_ENDPOINT_MARKER};
pub use transport::{Disposition, Transport, TransportError};
pub use types::{ContentEncoding, InstrumentData, Timestamp};
