//! In-process transport
//!
//! [`MemoryNetwork`] is a small message bus: every connection it hands out
//! writes into one shared stream of [`Envelope`]s (the broker side), and the
//! broker answers a particular connection with [`MemoryNetwork::deliver`].
//! [`MemoryConnection::pair`] gives two directly linked ends for tests that do
//! not need a broker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{ mpsc, RwLock };
use tracing::debug;
use uuid::Uuid;

use crate::errors::Error;
use crate::transport::{ BoxedConnection, Connection, ConnectionFactory };

/// Identity of a connection on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frame written by a bus connection, tagged with its sender
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: ConnectionId,
    pub frame: String,
}

enum Outbox {
    Peer(mpsc::UnboundedSender<String>),
    Bus {
        tx: mpsc::UnboundedSender<Envelope>,
    },
}

/// One end of an in-process connection
pub struct MemoryConnection {
    id: ConnectionId,
    inbox: mpsc::UnboundedReceiver<String>,
    outbox: Outbox,
    /// Frame returned by `read_frame` and not yet consumed
    current: Option<String>,
}

impl MemoryConnection {
    /// Two connections wired to each other
    pub fn pair() -> (MemoryConnection, MemoryConnection) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = MemoryConnection {
            id: ConnectionId::new(),
            inbox: a_rx,
            outbox: Outbox::Peer(b_tx),
            current: None,
        };
        let b = MemoryConnection {
            id: ConnectionId::new(),
            inbox: b_rx,
            outbox: Outbox::Peer(a_tx),
            current: None,
        };
        (a, b)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read_frame(&mut self) -> Result<String, Error> {
        if let Some(frame) = &self.current {
            return Ok(frame.clone());
        }
        match self.inbox.recv().await {
            Some(frame) => {
                self.current = Some(frame.clone());
                Ok(frame)
            }
            None => Err(Error::ConnectionClosed),
        }
    }

    async fn consume(&mut self) {
        self.current = None;
    }

    async fn send(&mut self, frame: &str) -> Result<(), Error> {
        match &self.outbox {
            Outbox::Peer(tx) => tx.send(frame.to_string()).map_err(|_| Error::ConnectionClosed),
            Outbox::Bus { tx } =>
                tx
                    .send(Envelope {
                        from: self.id,
                        frame: frame.to_string(),
                    })
                    .map_err(|_| Error::ConnectionClosed),
        }
    }
}

/// Bus of in-process connections; also their [`ConnectionFactory`]
#[derive(Clone)]
pub struct MemoryNetwork {
    routes: Arc<RwLock<Routes>>,
    bus: mpsc::UnboundedSender<Envelope>,
}

type Routes = HashMap<ConnectionId, mpsc::UnboundedSender<String>>;

/// Forget routes whose connection has been dropped
fn prune(routes: &mut Routes) {
    let before = routes.len();
    routes.retain(|_, tx| !tx.is_closed());
    let pruned = before - routes.len();
    if pruned > 0 {
        debug!(pruned, "Dropped routes of closed memory connections");
    }
}

impl MemoryNetwork {
    /// Create a bus together with the receiver that sees every frame any of
    /// its connections sends
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (bus, bus_rx) = mpsc::unbounded_channel();
        let network = Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            bus,
        };
        (network, bus_rx)
    }

    /// Open a new connection on the bus
    pub async fn connect(&self) -> MemoryConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        let mut routes = self.routes.write().await;
        prune(&mut routes);
        routes.insert(id, tx);
        drop(routes);
        debug!(connection = %id, "Memory connection opened");
        MemoryConnection {
            id,
            inbox: rx,
            outbox: Outbox::Bus {
                tx: self.bus.clone(),
            },
            current: None,
        }
    }

    /// Deliver a frame to one connection.
    ///
    /// Returns `false` when that connection no longer exists; its route is
    /// forgotten.
    pub async fn deliver(&self, to: ConnectionId, frame: impl Into<String>) -> bool {
        let mut routes = self.routes.write().await;
        let delivered = match routes.get(&to) {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        };
        if !delivered && routes.remove(&to).is_some() {
            debug!(connection = %to, "Memory connection gone, route dropped");
        }
        delivered
    }

    /// Close a connection from the bus side; its reads fail once drained
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        self.routes.write().await.remove(&id).is_some()
    }

    /// Number of connections still open
    pub async fn connection_count(&self) -> usize {
        let mut routes = self.routes.write().await;
        prune(&mut routes);
        routes.len()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryNetwork {
    async fn create_connection(&self) -> Result<BoxedConnection, Error> {
        Ok(Box::new(self.connect().await))
    }
}
