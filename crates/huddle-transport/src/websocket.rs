//! WebSocket connection over axum's upgraded socket.
//!
//! Ping/pong is answered by the underlying tungstenite stream; this adapter
//! only surfaces data frames and closes.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use huddle_protocol::CloseCode;
use std::borrow::Cow;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::traits::{Connection, Frame, TransportError};

/// A WebSocket connection.
pub struct WebSocketConnection {
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    is_open: bool,
}

impl WebSocketConnection {
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            remote_addr: None,
            is_open: true,
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(Bytes::from(data)))),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(code = ?frame.as_ref().map(|f| f.code), "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.socket.send(message).await.map_err(|e| {
            self.is_open = false;
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.socket
            .send(Message::Close(Some(CloseFrame {
                code: code.as_u16(),
                reason: Cow::Owned(reason.to_string()),
            })))
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
