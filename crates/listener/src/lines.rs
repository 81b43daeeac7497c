//! Transport reading newline-delimited JSON deliveries from a byte stream.
//!
//! Each line is one published message:
//!
//! ```json
//! {"exchange": "alerts", "routing_key": "pump1.status", "content_encoding": "application/json",
//!  "body": {"timestamp": "2024-05-01T12:00:00Z", "payload": {"from": "pump1"}}}
//! ```
//!
//! `exchange` defaults to `alerts`. A JSON-string `body` is taken as raw bytes;
//! any other JSON value is re-encoded. Lines that cannot be parsed, including
//! lines that are not UTF-8, are logged and skipped. End of stream is an
//! orderly shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use node_domain::{Delivery, DeliveryTag, Disposition, ExchangeName, Transport, TransportError};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Split};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{BindingTable, DEFAULT_EXCHANGE};

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default = "default_exchange")]
    exchange: String,
    routing_key: String,
    #[serde(default)]
    content_encoding: Option<String>,
    body: serde_json::Value,
}

fn default_exchange() -> String {
    DEFAULT_EXCHANGE.to_string()
}

impl LineMessage {
    fn body_bytes(self) -> Result<Vec<u8>, serde_json::Error> {
        match self.body {
            serde_json::Value::String(raw) => Ok(raw.into_bytes()),
            other => serde_json::to_vec(&other),
        }
    }
}

/// A [`Transport`] over any buffered async reader (stdin, a file, a socket).
pub struct LineTransport<R> {
    lines: Mutex<Split<R>>,
    bindings: Mutex<BindingTable>,
    next_tag: AtomicU64,
}

impl<R> std::fmt::Debug for LineTransport<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport").finish_non_exhaustive()
    }
}

impl<R: AsyncBufRead + Unpin> LineTransport<R> {
    /// Wraps a reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.split(b'\n')),
            bindings: Mutex::new(BindingTable::default()),
            next_tag: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Transport for LineTransport<R> {
    async fn bind_routing_key(
        &self,
        exchange: &ExchangeName,
        pattern: &str,
    ) -> Result<(), TransportError> {
        self.bindings.lock().await.bind(exchange, pattern)
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
        let mut lines = self.lines.lock().await;
        while let Some(line) = lines.next_segment().await? {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            let message: LineMessage = match serde_json::from_slice(line) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "skipping unparseable delivery line");
                    continue;
                }
            };

            let routed = match ExchangeName::new(message.exchange.as_str()) {
                Ok(exchange) => self
                    .bindings
                    .lock()
                    .await
                    .routes(&exchange, &message.routing_key),
                Err(_) => false,
            };
            if !routed {
                debug!(
                    exchange = %message.exchange,
                    routing_key = %message.routing_key,
                    "no binding covers message; dropped"
                );
                continue;
            }

            let routing_key = message.routing_key.clone();
            let content_encoding = message.content_encoding.clone();
            let body = match message.body_bytes() {
                Ok(body) => body,
                Err(err) => {
                    warn!(error = %err, %routing_key, "skipping delivery with unencodable body");
                    continue;
                }
            };

            let tag = DeliveryTag::new(self.next_tag.fetch_add(1, Ordering::Relaxed));
            return Ok(Some(Delivery {
                tag,
                routing_key,
                content_encoding,
                body,
            }));
        }
        Ok(None)
    }

    async fn settle(
        &self,
        tag: DeliveryTag,
        disposition: Disposition,
    ) -> Result<(), TransportError> {
        debug!(%tag, ?disposition, "delivery settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn transport(input: &'static str) -> LineTransport<&'static [u8]> {
        LineTransport::new(input.as_bytes())
    }

    #[tokio::test]
    #[traced_test]
    async fn reads_bound_deliveries_and_skips_the_rest() {
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"routing_key":"heater.status","content_encoding":"application/json","body":{"a":1}}"#,
            "\n",
            r#"{"routing_key":"pump1.status","content_encoding":"application/json","body":{"a":2}}"#,
            "\n",
            r#"{"exchange":"requests","routing_key":"pump2.status","body":"raw"}"#,
            "\n",
        );
        let transport = transport(input);
        let alerts = ExchangeName::new("alerts").unwrap();
        transport.bind_routing_key(&alerts, "pump1.#").await.unwrap();

        let delivery = transport.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "pump1.status");
        assert_eq!(delivery.body, br#"{"a":2}"#.to_vec());
        assert_eq!(delivery.tag, DeliveryTag::new(1));

        assert!(transport.next_delivery().await.unwrap().is_none());
        assert!(logs_contain("skipping unparseable delivery line"));
    }

    #[tokio::test]
    #[traced_test]
    async fn invalid_utf8_line_is_skipped() {
        let input: &'static [u8] = b"\xff\xfe garbage\n{\"routing_key\":\"pump1.status\",\"body\":{\"a\":1}}\n";
        let transport = LineTransport::new(input);
        let alerts = ExchangeName::new(DEFAULT_EXCHANGE).unwrap();
        transport.bind_routing_key(&alerts, "#").await.unwrap();

        let delivery = transport.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "pump1.status");
        assert_eq!(delivery.tag, DeliveryTag::new(1));
        assert!(transport.next_delivery().await.unwrap().is_none());
        assert!(logs_contain("skipping unparseable delivery line"));
    }

    #[tokio::test]
    async fn string_body_is_passed_through_raw() {
        let transport = transport(
            r#"{"routing_key":"pump1.status","content_encoding":"text/plain","body":"hello"}"#,
        );
        let alerts = ExchangeName::new(DEFAULT_EXCHANGE).unwrap();
        transport.bind_routing_key(&alerts, "#").await.unwrap();

        let delivery = transport.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.body, b"hello".to_vec());
        assert_eq!(delivery.content_encoding.as_deref(), Some("text/plain"));
    }
}
