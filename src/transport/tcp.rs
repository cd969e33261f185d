//! Newline-delimited JSON over TCP

use async_trait::async_trait;
use futures::{ SinkExt, StreamExt };
use tokio::net::TcpStream;
use tokio_util::codec::{ Framed, LinesCodec, LinesCodecError };
use tracing::{ debug, info };

use crate::errors::Error;
use crate::transport::{ BoxedConnection, Connection, ConnectionFactory };

/// One TCP stream carrying one JSON document per line
pub struct TcpConnection {
    framed: Framed<TcpStream, LinesCodec>,
    current: Option<String>,
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
            current: None,
        }
    }

    pub async fn connect(address: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(address).await?;
        debug!("Connected to {}", address);
        Ok(Self::from_stream(stream))
    }
}

fn codec_error(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::Io(e) => Error::Io(e),
        other => Error::Transport(other.to_string()),
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn read_frame(&mut self) -> Result<String, Error> {
        if let Some(frame) = &self.current {
            return Ok(frame.clone());
        }
        loop {
            match self.framed.next().await {
                Some(Ok(line)) => {
                    // Blank keep-alive lines are not frames
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.current = Some(line.clone());
                    return Ok(line);
                }
                Some(Err(e)) => {
                    return Err(codec_error(e));
                }
                None => {
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    async fn consume(&mut self) {
        self.current = None;
    }

    async fn send(&mut self, frame: &str) -> Result<(), Error> {
        self.framed.send(frame).await.map_err(codec_error)
    }
}

/// Opens a fresh TCP connection to the broker for every request
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    address: String,
}

impl TcpConnectionFactory {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        info!("Using broker at {}", address);
        Self { address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    async fn create_connection(&self) -> Result<BoxedConnection, Error> {
        Ok(Box::new(TcpConnection::connect(&self.address).await?))
    }
}
