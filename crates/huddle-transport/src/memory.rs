//! In-process loopback connection.
//!
//! [`pair`] returns the server half, which implements [`Connection`], and a
//! client half that pushes frames in and observes what the server sends back,
//! including the close code.

use async_trait::async_trait;
use huddle_protocol::{decode, CloseCode, ProtocolError, ServerEvent};
use tokio::sync::mpsc;
use tracing::debug;

use crate::traits::{Connection, Frame, TransportError};

/// What the client half observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(Frame),
    Close { code: CloseCode, reason: String },
}

/// Create a connected pair. `capacity` bounds each direction.
#[must_use]
pub fn pair(capacity: usize) -> (MemoryConnection, MemoryClient) {
    let (client_tx, server_rx) = mpsc::channel(capacity);
    let (server_tx, client_rx) = mpsc::channel(capacity);
    (
        MemoryConnection {
            inbound: server_rx,
            outbound: server_tx,
            is_open: true,
        },
        MemoryClient {
            outbound: Some(client_tx),
            inbound: client_rx,
        },
    )
}

/// Server half of a loopback pair.
#[derive(Debug)]
pub struct MemoryConnection {
    inbound: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Received>,
    is_open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.inbound.recv().await {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Received::Frame(frame))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        debug!(code = code.as_u16(), "Loopback closed");

        // The client may already be gone.
        let _ = self
            .outbound
            .send(Received::Close {
                code,
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

/// Client half of a loopback pair.
#[derive(Debug)]
pub struct MemoryClient {
    outbound: Option<mpsc::Sender<Frame>>,
    inbound: mpsc::Receiver<Received>,
}

impl MemoryClient {
    /// Push a frame to the server.
    ///
    /// # Errors
    ///
    /// Fails once the server half is gone or the client hung up.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Push a JSON text frame.
    ///
    /// # Errors
    ///
    /// Fails once the server half is gone or the client hung up.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::Text(text.into())).await
    }

    /// Next frame or close from the server. `None` once the server half is
    /// dropped.
    pub async fn recv(&mut self) -> Option<Received> {
        self.inbound.recv().await
    }

    /// Next server event decoded from its frame. `Ok(None)` on close.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame does not decode as a server event.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ProtocolError> {
        match self.recv().await {
            Some(Received::Frame(frame)) => {
                let (data, encoding) = frame.payload();
                decode(data, encoding).map(Some)
            }
            Some(Received::Close { .. }) | None => Ok(None),
        }
    }

    /// Close the client side. The server sees end of stream.
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let (mut server, mut client) = pair(4);

        client.send_text(r#"{"action":"typing"}"#).await.unwrap();
        let frame = server.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Text(r#"{"action":"typing"}"#.into()));

        let event = ServerEvent::MessageDeleted {
            message_id: "m".into(),
        };
        server
            .send(Frame::encode(&event, huddle_protocol::Encoding::Json).unwrap())
            .await
            .unwrap();
        assert_eq!(client.next_event().await.unwrap(), Some(event));
    }

    #[tokio::test]
    async fn test_close_is_observed_once() {
        let (mut server, mut client) = pair(4);

        server.close(CloseCode::Policy, "not a member").await.unwrap();
        server.close(CloseCode::Normal, "again").await.unwrap();
        assert!(!server.is_open());
        assert!(server.send(Frame::Text("x".into())).await.is_err());

        assert_eq!(
            client.recv().await,
            Some(Received::Close {
                code: CloseCode::Policy,
                reason: "not a member".into()
            })
        );
        drop(server);
        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (mut server, mut client) = pair(4);
        client.hang_up();
        assert!(server.recv().await.unwrap().is_none());
        assert!(!server.is_open());
        assert!(client.send_text("late").await.is_err());
    }
}
