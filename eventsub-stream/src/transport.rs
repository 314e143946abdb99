//! Websocket transport seam.
//!
//! The session manager talks to the provider through [`Connector`] and
//! [`Transport`]; [`WsConnector`] is the tokio-tungstenite implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Result, SessionError};

/// Close code sent on a clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// A websocket frame as seen by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close frame with its status code, if one was sent
    Close(Option<u16>),
}

/// One open connection to the provider.
#[async_trait]
pub trait Transport: Send {
    /// Next inbound frame, or `None` once the connection is gone.
    ///
    /// Must be cancel safe: dropping the future before it completes loses no frame.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Start a clean close handshake with the given status code.
    async fn close(&mut self, code: u16) -> Result<()>;

    /// Drop the connection without a close handshake.
    async fn terminate(&mut self);
}

/// Opens new provider connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// Connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = connect_async(url).await?;
        tracing::debug!(status = response.status().as_u16(), "websocket handshake complete");
        Ok(Box::new(WsTransport {
            stream: Some(stream),
        }))
    }
}

/// A tokio-tungstenite websocket connection.
pub struct WsTransport {
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTransport {
    fn stream(&mut self) -> Result<&mut WebSocketStream<MaybeTlsStream<TcpStream>>> {
        self.stream
            .as_mut()
            .ok_or_else(|| SessionError::Transport("connection already terminated".to_string()))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        let stream = self.stream.as_mut()?;
        loop {
            let frame = match stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Ping(data)) => Frame::Ping(data),
                Ok(Message::Pong(data)) => Frame::Pong(data),
                Ok(Message::Close(frame)) => Frame::Close(frame.map(|f| u16::from(f.code))),
                Ok(Message::Binary(data)) => {
                    tracing::debug!(len = data.len(), "ignoring binary frame");
                    continue;
                }
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Ok(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        let stream = self.stream()?;
        match frame {
            Frame::Text(text) => stream.send(Message::Text(text)).await?,
            Frame::Ping(data) => stream.send(Message::Ping(data)).await?,
            // tungstenite queues the pong reply itself when the ping is read
            Frame::Pong(_) => stream.flush().await?,
            Frame::Close(code) => {
                stream
                    .send(Message::Close(code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    })))
                    .await?
            }
        }
        Ok(())
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        self.stream()?
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await?;
        Ok(())
    }

    async fn terminate(&mut self) {
        self.stream = None;
    }
}
