//! The alert consumer: composition root of the dispatch pipeline.
//!
//! An [`AlertConsumer`] binds a set of routing-key patterns on the alerts
//! exchange, then pulls deliveries from its [`Transport`] one at a time and
//! feeds each through an [`AlertDispatcher`]. A delivery is fully processed
//! and settled before the next one is requested, so messages are handled in
//! delivery order.

use std::collections::BTreeSet;
use std::sync::Arc;

use node_domain::{
    AlertDispatcher, AlertProcessor, ConsumerName, Delivery, DispatchError, DispatchOutcome,
    Disposition, ExchangeName, NameError, RoutingKeyParser, RoutingPatternError, Transport,
    TransportError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Exchange alerts are published on unless configured otherwise.
pub const DEFAULT_EXCHANGE: &str = "alerts";

/// Binding that receives every alert.
pub const DEFAULT_BINDING: &str = "#";

const DEFAULT_NAME_PREFIX: &str = "alert-consumer";

/// Errors raised while configuring or running a consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The parser pattern does not compile.
    #[error(transparent)]
    Parser(#[from] RoutingPatternError),

    /// A configured name is not a valid identifier.
    #[error("invalid consumer {field}")]
    InvalidName {
        /// Which setting was invalid.
        field: &'static str,
        /// Why it was rejected.
        #[source]
        source: NameError,
    },

    /// The transport failed fatally while consuming.
    #[error("transport failure while consuming")]
    Transport(#[from] TransportError),
}

/// Consumer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Exchange the binding patterns are registered on.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Binding patterns; each is registered once.
    #[serde(default = "default_keys")]
    pub keys: BTreeSet<String>,

    /// Regular expression applied to every delivered routing key.
    pub parser_pattern: String,

    /// Consumer name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_exchange() -> String {
    DEFAULT_EXCHANGE.to_string()
}

fn default_keys() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_BINDING.to_string()])
}

impl ConsumerConfig {
    /// Settings with the default exchange and catch-all binding.
    pub fn new(parser_pattern: impl Into<String>) -> Self {
        Self {
            exchange: default_exchange(),
            keys: default_keys(),
            parser_pattern: parser_pattern.into(),
            name: None,
        }
    }

    /// Replaces the binding patterns.
    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the exchange.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Sets an explicit consumer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Generates `"<prefix>-<12 hex chars>"`.
pub fn generated_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..12])
}

/// Binds routing keys and runs the consumption loop.
pub struct AlertConsumer {
    name: ConsumerName,
    exchange: ExchangeName,
    keys: BTreeSet<String>,
    transport: Arc<dyn Transport>,
    dispatcher: AlertDispatcher,
    span: Span,
}

impl std::fmt::Debug for AlertConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertConsumer")
            .field("name", &self.name)
            .field("exchange", &self.exchange)
            .field("keys", &self.keys)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl AlertConsumer {
    /// Validates `config`, compiles the parser pattern once, and wires the
    /// consumer to its transport and processing step.
    pub fn configure(
        config: ConsumerConfig,
        transport: Arc<dyn Transport>,
        processor: Arc<dyn AlertProcessor>,
    ) -> Result<Self, ConsumerError> {
        debug!("AlertConsumer initializing");

        let name = config
            .name
            .unwrap_or_else(|| generated_name(DEFAULT_NAME_PREFIX));
        let name = ConsumerName::new(name).map_err(|source| ConsumerError::InvalidName {
            field: "name",
            source,
        })?;
        let exchange =
            ExchangeName::new(config.exchange).map_err(|source| ConsumerError::InvalidName {
                field: "exchange",
                source,
            })?;
        let parser = RoutingKeyParser::new(config.parser_pattern)?;

        let span = info_span!("alert_consumer", consumer = %name, exchange = %exchange);

        Ok(Self {
            name,
            exchange,
            keys: config.keys,
            transport,
            dispatcher: AlertDispatcher::new(parser, processor),
            span,
        })
    }

    /// The consumer's name.
    pub fn name(&self) -> &ConsumerName {
        &self.name
    }

    /// The exchange keys are bound on.
    pub fn exchange(&self) -> &ExchangeName {
        &self.exchange
    }

    /// The configured binding patterns.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Registers every binding pattern with the transport.
    ///
    /// Every pattern is attempted even after a failure; returns `true` only
    /// if all of them were accepted.
    pub async fn bind_keys(&self) -> bool {
        let mut all_bound = true;
        for key in &self.keys {
            match self.transport.bind_routing_key(&self.exchange, key).await {
                Ok(()) => debug!(parent: &self.span, key = %key, "routing key bound"),
                Err(err) => {
                    error!(parent: &self.span, key = %key, error = %err, "failed to bind routing key");
                    all_bound = false;
                }
            }
        }
        all_bound
    }

    /// Runs one delivery through the dispatcher.
    ///
    /// Only an unrecoverable sink failure is returned as an error; every other
    /// outcome has already been reported.
    pub async fn on_message(&self, delivery: &Delivery) -> Result<DispatchOutcome, DispatchError> {
        let result = self
            .dispatcher
            .dispatch(delivery)
            .instrument(self.span.clone())
            .await;
        if let Err(err) = &result {
            warn!(
                parent: &self.span,
                error = %err,
                tag = %delivery.tag,
                "got an exception (trying to continue running)"
            );
        }
        result
    }

    /// Consumes until the transport shuts down.
    ///
    /// Each delivery is settled with [`Disposition::Ack`] unless dispatch
    /// returned an error, in which case it is settled with
    /// [`Disposition::Reject`] and the loop moves on.
    ///
    /// # Errors
    ///
    /// [`ConsumerError::Transport`] if receiving or settling fails.
    pub async fn start(&self) -> Result<(), ConsumerError> {
        info!(parent: &self.span, keys = ?self.keys, "AlertConsumer consume starting");

        while let Some(delivery) = self.transport.next_delivery().await? {
            let disposition = match self.on_message(&delivery).await {
                Ok(_) => Disposition::Ack,
                Err(_) => Disposition::Reject,
            };
            self.transport.settle(delivery.tag, disposition).await?;
        }

        info!(parent: &self.span, "transport closed; AlertConsumer stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use node_domain::{DeliveryTag, LoggingProcessor};
    use tracing_test::traced_test;

    use super::*;

    /// Refuses every pattern listed in `refuse`, records every attempt.
    struct ScriptedTransport {
        refuse: Vec<&'static str>,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn bind_routing_key(
            &self,
            _exchange: &ExchangeName,
            pattern: &str,
        ) -> Result<(), TransportError> {
            self.attempts.lock().unwrap().push(pattern.to_string());
            if self.refuse.iter().any(|refused| *refused == pattern) {
                return Err(TransportError::Binding {
                    pattern: pattern.to_string(),
                    reason: "refused".to_string(),
                });
            }
            Ok(())
        }

        async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
            Err(TransportError::Closed)
        }

        async fn settle(
            &self,
            _tag: DeliveryTag,
            _disposition: Disposition,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn scripted(refuse: Vec<&'static str>) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            refuse,
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn consumer(config: ConsumerConfig, transport: Arc<ScriptedTransport>) -> AlertConsumer {
        AlertConsumer::configure(config, transport, Arc::new(LoggingProcessor)).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn bind_keys_attempts_every_pattern_after_a_failure() {
        let transport = scripted(vec!["a.*"]);
        let config = ConsumerConfig::new(".*").with_keys(["a.*", "b.*", "c.#"]);

        let bound = consumer(config, transport.clone()).bind_keys().await;

        assert!(!bound);
        assert_eq!(
            *transport.attempts.lock().unwrap(),
            vec!["a.*".to_string(), "b.*".to_string(), "c.#".to_string()]
        );
        assert!(logs_contain("failed to bind routing key"));
    }

    #[tokio::test]
    async fn bind_keys_succeeds_when_every_pattern_is_accepted() {
        let transport = scripted(Vec::new());
        let config = ConsumerConfig::new(".*").with_keys(["a.*", "b.*"]);

        assert!(consumer(config, transport).bind_keys().await);
    }

    #[tokio::test]
    async fn fatal_transport_failure_ends_start() {
        let transport = scripted(Vec::new());
        let err = consumer(ConsumerConfig::new(".*"), transport)
            .start()
            .await
            .unwrap_err();

        assert!(matches!(err, ConsumerError::Transport(TransportError::Closed)));
    }

    #[test]
    fn defaults_bind_everything_on_alerts() {
        let consumer = consumer(ConsumerConfig::new(".*"), scripted(Vec::new()));

        assert_eq!(consumer.exchange().as_str(), DEFAULT_EXCHANGE);
        assert_eq!(
            consumer.keys().iter().collect::<Vec<_>>(),
            vec![DEFAULT_BINDING]
        );
        let name = consumer.name().as_str();
        assert!(name.starts_with("alert-consumer-"));
        assert_eq!(name.len(), "alert-consumer-".len() + 12);
    }

    #[test]
    fn config_deserialises_with_defaults() {
        let config: ConsumerConfig =
            serde_json::from_str(r#"{"parser_pattern": "(?P<endpoint>[^.]+)"}"#).unwrap();

        assert_eq!(config, ConsumerConfig::new("(?P<endpoint>[^.]+)"));
    }

    #[test]
    fn invalid_parser_pattern_is_rejected() {
        let err = AlertConsumer::configure(
            ConsumerConfig::new("(unclosed"),
            scripted(Vec::new()),
            Arc::new(LoggingProcessor),
        )
        .unwrap_err();

        assert!(matches!(err, ConsumerError::Parser(_)));
    }

    #[test]
    fn empty_exchange_is_rejected() {
        let err = AlertConsumer::configure(
            ConsumerConfig::new(".*").with_exchange(""),
            scripted(Vec::new()),
            Arc::new(LoggingProcessor),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConsumerError::InvalidName {
                field: "exchange",
                source: NameError::Empty
            }
        ));
    }
}
