//! Transport module for node communication
//!
//! This module defines the [`Connection`] abstraction every message travels
//! over, the [`ConnectionFactory`] a node uses to open fresh connections, and
//! the [`Manager`] that turns raw frames into typed messages. Two concrete
//! connections are provided: an in-process bus and newline-delimited TCP.

use async_trait::async_trait;

use crate::errors::Error;

pub mod connection_manager;
pub mod memory;
pub mod tcp;

pub use connection_manager::Manager;
pub use memory::{ ConnectionId, Envelope, MemoryConnection, MemoryNetwork };
pub use tcp::{ TcpConnection, TcpConnectionFactory };

/// A message-oriented, bidirectional connection
///
/// Reads are two-phase: [`read_frame`](Connection::read_frame) returns the
/// frame at the head of the connection without removing it, and
/// [`consume`](Connection::consume) commits it so the next read yields the
/// following frame. Implementations must make `read_frame` cancel-safe: a
/// read abandoned part way must not lose a frame.
#[async_trait]
pub trait Connection: Send {
    /// Return the current frame, waiting for one if none is pending
    ///
    /// Fails with [`Error::ConnectionClosed`] once no further frame can arrive.
    async fn read_frame(&mut self) -> Result<String, Error>;

    /// Commit the current frame
    async fn consume(&mut self);

    /// Write one frame
    async fn send(&mut self, frame: &str) -> Result<(), Error>;
}

/// Boxed connection as handed out by factories
pub type BoxedConnection = Box<dyn Connection>;

/// Capability to open fresh connections to the broker
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> Result<BoxedConnection, Error>;
}
