//! JSON-RPC 2.0 protocol model
//!
//! This module contains the typed representation of every message shape that
//! can travel over a connection, the correlation identifier, the error object
//! and its code catalogue, and the strict validation rules that turn raw
//! frames into typed messages.

pub mod error;
pub mod id;
pub mod messages;
pub mod validation;

pub use error::{ error_codes, RpcError };
pub use id::Id;
pub use messages::{
    BatchRequest,
    BatchResponse,
    Call,
    Message,
    Notification,
    Outcome,
    Request,
    Response,
    JSONRPC_VERSION,
};
