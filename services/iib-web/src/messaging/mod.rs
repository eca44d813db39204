//! Notification bus delivery (C5, SPEC_FULL.md §4.5): multi-URL failover,
//! one sender per address per connection, strictly best-effort. Grounded in
//! the pre-distillation source's AMQP/Proton messaging helper: reconnect is
//! enabled specifically when more than one URL is configured, and the loop
//! tracks whether it has cycled back to the first URL it ever connected to
//! rather than counting a fixed number of retries.

mod stomp;

pub use stomp::StompConnector;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use iib_events::{Envelope, MessagingError};
use tokio::sync::Mutex;
use tracing::{error, warn};

/// A single outbound connection capable of sending to an address, reusing
/// one sender per address for its lifetime.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn connected_url(&self) -> &str;
    async fn send(&self, address: &str, envelope: &Envelope) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, MessagingError>;
}

/// Best-effort sender: every failure is logged and swallowed, per
/// SPEC_FULL.md §4.5 "messaging is strictly best-effort".
pub struct NotificationSender {
    connector: Arc<dyn BrokerConnector>,
    urls: Vec<String>,
    connection: Mutex<Option<Box<dyn BrokerConnection>>>,
}

impl NotificationSender {
    pub fn new(connector: Arc<dyn BrokerConnector>, urls: Vec<String>) -> Self {
        Self {
            connector,
            urls,
            connection: Mutex::new(None),
        }
    }

    /// Send one envelope, opening a connection if needed and failing over
    /// across configured URLs. Reconnect-on-exhaustion only applies when
    /// more than one URL is configured (a single-URL deployment gives up
    /// after one failed attempt rather than spinning).
    pub async fn send(&self, envelope: &Envelope) {
        if self.urls.is_empty() {
            warn!("no broker URLs configured, dropping notification");
            return;
        }

        let mut conn_guard = self.connection.lock().await;

        if conn_guard.is_none() {
            *conn_guard = self.connect_any().await;
        }

        let Some(conn) = conn_guard.as_ref() else {
            error!("failed to reach any configured broker URL, dropping notification");
            return;
        };

        if let Err(e) = conn.send(&envelope.address, envelope).await {
            warn!(error = %e, "send failed, will reconnect on next attempt");
            *conn_guard = self.connect_any().await;
            if let Some(conn) = conn_guard.as_ref() {
                if let Err(e) = conn.send(&envelope.address, envelope).await {
                    error!(error = %e, "send failed again after reconnect, dropping notification");
                }
            } else {
                error!("all configured broker URLs were exhausted, dropping notification");
            }
        }
    }

    /// Try every configured URL starting from whichever one we last
    /// connected to (or the first, if we have never connected), stopping
    /// once we have cycled back to our starting point.
    async fn connect_any(&self) -> Option<Box<dyn BrokerConnection>> {
        let start_url = self.urls.first().cloned()?;
        let mut url = start_url.clone();
        let multi_url = self.urls.len() > 1;

        loop {
            match self.connector.connect(&url).await {
                Ok(conn) => return Some(conn),
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to connect to broker");
                }
            }

            if !multi_url {
                return None;
            }

            let idx = self.urls.iter().position(|u| u == &url).unwrap_or(0);
            let next = self.urls[(idx + 1) % self.urls.len()].clone();
            if next == start_url {
                return None;
            }
            url = next;
        }
    }
}

/// Per-request notification body = the request's non-verbose public JSON
/// (§4.5). This crate composes it at the API/serialization layer and hands
/// the already-built `serde_json::Value` here.
pub fn per_request_envelope(
    destination: &str,
    public_json: serde_json::Value,
    durable: bool,
) -> Envelope {
    Envelope::new(destination.to_string(), public_json, durable)
}

pub fn per_batch_envelope(
    destination: &str,
    body: &iib_events::BatchStateBody,
    durable: bool,
) -> Envelope {
    Envelope::new(destination.to_string(), body, durable)
}

/// Properties can be attached to a message after construction for broker
/// features (partitioning keys, etc.) that don't belong in the body.
pub fn with_properties(mut envelope: Envelope, properties: HashMap<String, String>) -> Envelope {
    envelope.message.properties = properties;
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingConnector {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrokerConnector for FailingConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn BrokerConnection>, MessagingError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(MessagingError::ConnectionFailed {
                url: "unreachable".to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_single_url_gives_up_after_one_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = NotificationSender::new(
            Arc::new(FailingConnector { attempts: attempts.clone() }),
            vec!["amqps://broker-a".to_string()],
        );
        let envelope = Envelope::new("topic://x", serde_json::json!({}), false);
        sender.send(&envelope).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multi_url_cycles_through_every_url_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = NotificationSender::new(
            Arc::new(FailingConnector { attempts: attempts.clone() }),
            vec![
                "amqps://broker-a".to_string(),
                "amqps://broker-b".to_string(),
                "amqps://broker-c".to_string(),
            ],
        );
        let envelope = Envelope::new("topic://x", serde_json::json!({}), false);
        sender.send(&envelope).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_urls_configured_never_panics() {
        let sender = NotificationSender::new(
            Arc::new(FailingConnector { attempts: Arc::new(AtomicUsize::new(0)) }),
            vec![],
        );
        let envelope = Envelope::new("topic://x", serde_json::json!({}), false);
        sender.send(&envelope).await;
    }
}
