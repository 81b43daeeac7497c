//! Alert consumer infrastructure.
//!
//! Implements the composition root of the dispatch pipeline on top of the
//! [`node_domain::Transport`] port, plus two transports:
//!
//! - [`ChannelTransport`]: an in-process topic exchange fed by a
//!   [`Publisher`]. Used by tests and by embedders that publish alerts from
//!   the same process.
//! - [`LineTransport`]: reads newline-delimited JSON deliveries from any
//!   buffered reader. The `alert-node` binary feeds it from stdin.
//!
//! Both honour topic-exchange binding semantics (see [`topic`]): a message is
//! delivered only if a bound pattern on its exchange covers its routing key.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Binding, delivery and settlement details live here.
//! The [`node_domain`] crate sees only [`node_domain::Transport`] and
//! [`node_domain::Delivery`].

pub mod consumer;
pub mod lines;
pub mod memory;
pub mod topic;

pub use consumer::{
    generated_name, AlertConsumer, ConsumerConfig, ConsumerError, DEFAULT_BINDING,
    DEFAULT_EXCHANGE,
};
pub use lines::LineTransport;
pub use memory::{ChannelTransport, Publisher};
pub use topic::{BindingTable, TopicPattern};
