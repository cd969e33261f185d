//! JSON-RPC Node Library
//!
//! This crate provides a peer node for a broker-mediated service network. A
//! node publishes callable services to a shared broker and invokes services
//! published by other nodes, speaking strict JSON-RPC 2.0 over any
//! message-oriented connection. It includes the protocol model and its
//! validation rules, a connection manager, per-service executor tasks, and
//! the node façade with its periodic re-registration pass.

pub mod errors;
pub mod node;
pub mod protocol;
pub mod service;
pub mod transport;

// Re-export commonly used items
pub use errors::{ Error, Result };
pub use node::{ Node, NodeBuilder, NodeConfig };
pub use protocol::{
    error_codes,
    BatchRequest,
    BatchResponse,
    Call,
    Id,
    Message,
    Notification,
    Request,
    Response,
    RpcError,
};
pub use service::{ SearchStrategy, ServiceError, ServiceMetadata, ServiceMethod };
pub use transport::{ Connection, ConnectionFactory, Manager, MemoryNetwork, TcpConnectionFactory };
