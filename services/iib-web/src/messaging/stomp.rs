//! Concrete `BrokerConnector`/`BrokerConnection`: a minimal STOMP client
//! over a raw TCP socket, the same process-driven-boundary pattern as
//! `git::ProcessGitDriver` and `transport::ProcessArtifactTransport` —
//! SPEC_FULL.md treats the broker wire protocol as an external collaborator,
//! not something the core dictates. STOMP's `SEND`/`CONNECT` frames are
//! simple enough to not need a dedicated crate, and its `/topic/` addressing
//! matches the `topic://` URIs this crate already works with.

use std::time::Duration;

use async_trait::async_trait;
use iib_events::{Envelope, MessagingError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{BrokerConnection, BrokerConnector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Render a STOMP frame: `COMMAND\nheader:value\n...\n\nbody\0`.
fn frame(command: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(command);
    out.push('\n');
    for (k, v) in headers {
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(body);
    out.push('\0');
    out.into_bytes()
}

/// `topic://VirtualTopic.eng.iib.build.state` -> `/topic/VirtualTopic.eng.iib.build.state`.
fn stomp_destination(address: &str) -> String {
    match address.strip_prefix("topic://") {
        Some(rest) => format!("/topic/{rest}"),
        None => address.to_string(),
    }
}

pub struct StompConnection {
    stream: Mutex<TcpStream>,
}

#[async_trait]
impl BrokerConnection for StompConnection {
    fn connected_url(&self) -> &str {
        "stomp"
    }

    async fn send(&self, address: &str, envelope: &Envelope) -> Result<(), MessagingError> {
        let body = serde_json::to_string(&envelope.message.body).unwrap_or_default();
        let mut headers = vec![
            ("destination", stomp_destination(address)),
            ("content-type", envelope.message.content_type.clone()),
            ("content-encoding", envelope.message.content_encoding.clone()),
            ("persistent", envelope.message.durable.to_string()),
        ];
        for (k, v) in &envelope.message.properties {
            headers.push((k.as_str(), v.clone()));
        }
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let payload = frame("SEND", &header_refs, &body);
        let mut stream = self.stream.lock().await;
        stream.write_all(&payload).await.map_err(|e| MessagingError::SendFailed {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct StompConnector;

impl StompConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StompConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for StompConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, MessagingError> {
        let addr = url
            .trim_start_matches("stomp://")
            .trim_start_matches("stomp+ssl://")
            .to_string();

        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| MessagingError::ConnectionFailed {
                url: url.to_string(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| MessagingError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let connect_frame = frame("CONNECT", &[("accept-version", "1.2"), ("host", &addr)], "");
        stream.write_all(&connect_frame).await.map_err(|e| MessagingError::ConnectionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        // A real broker replies with a CONNECTED or ERROR frame; we only
        // need enough of it to distinguish success from a refused handshake.
        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(CONNECT_TIMEOUT, stream.read(&mut buf))
            .await
            .map_err(|_| MessagingError::ConnectionFailed {
                url: url.to_string(),
                reason: "CONNECTED frame timed out".to_string(),
            })?
            .map_err(|e| MessagingError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = String::from_utf8_lossy(&buf[..n]);
        if response.starts_with("ERROR") {
            return Err(MessagingError::ConnectionFailed {
                url: url.to_string(),
                reason: response.trim().to_string(),
            });
        }

        Ok(Box::new(StompConnection { stream: Mutex::new(stream) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stomp_destination_from_topic_uri() {
        assert_eq!(
            stomp_destination("topic://VirtualTopic.eng.iib.build.state"),
            "/topic/VirtualTopic.eng.iib.build.state"
        );
    }

    #[test]
    fn test_frame_terminates_with_null_byte() {
        let f = frame("SEND", &[("destination", "/topic/x")], "body");
        assert_eq!(*f.last().unwrap(), 0u8);
        assert!(String::from_utf8_lossy(&f).starts_with("SEND\n"));
    }
}
