//! Message manager over one connection
//!
//! A single connection may interleave unrelated traffic, so the [`Manager`]
//! lets its owner wait for the shape it needs (something to serve, or an
//! answer) while draining and discarding frames of the other shape instead of
//! stalling behind them.

use std::time::Duration;
use tokio::time::timeout;
use tracing::{ debug, warn };

use crate::errors::{ Error, Result };
use crate::protocol::Message;
use crate::transport::{ BoxedConnection, Connection };

/// Reads, classifies and writes JSON-RPC messages on exactly one connection
pub struct Manager {
    connection: BoxedConnection,
}

impl Manager {
    /// Wrap a boxed connection
    pub fn new(connection: BoxedConnection) -> Self {
        Self { connection }
    }

    /// Wrap any concrete connection
    pub fn from_connection<C: Connection + 'static>(connection: C) -> Self {
        Self::new(Box::new(connection))
    }

    /// Give the connection back, e.g. to hand it to a new manager
    pub fn into_connection(self) -> BoxedConnection {
        self.connection
    }

    /// Wait for a request, notification or batch request.
    ///
    /// Responses read in the meantime are consumed and dropped. A frame that
    /// is not JSON-RPC at all is consumed and reported once as
    /// [`Error::Parse`].
    pub async fn listen_request(&mut self) -> Result<Message> {
        self.listen_for(Message::is_request_shaped, "request").await
    }

    /// Wait for a response or batch response, dropping request-shaped frames
    pub async fn listen_response(&mut self) -> Result<Message> {
        self.listen_for(Message::is_response_shaped, "response").await
    }

    /// [`listen_response`](Self::listen_response) bounded by `wait`
    pub async fn listen_response_timeout(&mut self, wait: Duration) -> Result<Message> {
        match timeout(wait, self.listen_response()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(wait)),
        }
    }

    /// Serialize a message and write it as one frame
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.to_string();
        debug!(frame = %frame, "Sending frame");
        self.connection.send(&frame).await
    }

    async fn listen_for(&mut self, wanted: fn(&Message) -> bool, kind: &'static str) -> Result<Message> {
        loop {
            let message = self.listen().await?;
            self.connection.consume().await;
            if wanted(&message) {
                return Ok(message);
            }
            debug!(waiting_for = kind, discarded = %message, "Discarding frame of the other shape");
        }
    }

    async fn listen(&mut self) -> Result<Message> {
        let frame = self.connection.read_frame().await?;
        match Message::parse(&frame) {
            Ok(message) => Ok(message),
            Err(e) => {
                // Consume the bad frame so the next read moves past it
                self.connection.consume().await;
                warn!("Dropping unparseable frame: {}", e);
                Err(e)
            }
        }
    }
}
