//! JSON-RPC error objects
//!
//! This module defines the structured error carried by error responses and the
//! fixed catalogue of codes used by the node. Reserved protocol codes live in
//! `[-32768, -32000]`; application codes sit in the `-33000` block below it.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

/// Standard JSON-RPC 2.0 error codes and node-specific application codes
pub mod error_codes {
    /// Parse error
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Lowest code of the reserved range
    pub const RESERVED_START: i32 = -32768;
    /// Highest code of the reserved range
    pub const RESERVED_END: i32 = -32000;
    /// The requested service is not registered
    pub const SERVICE_NOT_FOUND: i32 = -33000;
    /// A handler rejected the parameters it was given
    pub const WRONG_PARAMETERS_RECEIVED: i32 = -33001;
    /// A handler failed unexpectedly
    pub const INTERNAL_SERVICE_ERROR: i32 = -33002;
    /// The requester could not parse what it received (never sent)
    pub const LOCAL_PARSE_ERROR: i32 = -33003;
    /// The requester gave up waiting for a response (never sent)
    pub const CONNECTION_TIMEOUT: i32 = -33004;
    /// The requester could not reach the peer at all (never sent)
    pub const TRANSPORT_ERROR: i32 = -33005;
}

use error_codes::*;

/// Error object of a JSON-RPC error response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional data to the error
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether the code falls in the range reserved by JSON-RPC 2.0
    pub fn is_reserved(&self) -> bool {
        (RESERVED_START..=RESERVED_END).contains(&self.code)
    }

    /// Invalid JSON was received
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// The JSON sent is not a valid request object
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    /// The method does not exist or is not available
    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: &str) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    pub fn service_not_found() -> Self {
        Self::new(SERVICE_NOT_FOUND, "Service not found")
    }

    pub fn wrong_parameters_received() -> Self {
        Self::new(WRONG_PARAMETERS_RECEIVED, "Wrong parameters received")
    }

    pub fn internal_service_error() -> Self {
        Self::new(INTERNAL_SERVICE_ERROR, "Internal service error")
    }

    pub fn local_parse_error() -> Self {
        Self::new(LOCAL_PARSE_ERROR, "Local parse error")
    }

    pub fn connection_timeout() -> Self {
        Self::new(CONNECTION_TIMEOUT, "Connection timeout")
    }

    pub fn transport_error(msg: &str) -> Self {
        Self::new(TRANSPORT_ERROR, msg)
    }

    /// Strictly read an error object: `code` and `message` are required,
    /// `data` is optional, and no other member may be present
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.keys().any(|k| !matches!(k.as_str(), "code" | "message" | "data")) {
            return None;
        }
        let code = i32::try_from(obj.get("code")?.as_i64()?).ok()?;
        let message = obj.get("message")?.as_str()?.to_string();
        Some(Self {
            code,
            message,
            data: obj.get("data").cloned(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("code".into(), Value::from(self.code));
        obj.insert("message".into(), Value::String(self.message.clone()));
        if let Some(data) = &self.data {
            obj.insert("data".into(), data.clone());
        }
        Value::Object(obj)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}
