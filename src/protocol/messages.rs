//! Typed JSON-RPC messages
//!
//! Every frame that crosses a connection is one variant of [`Message`]. The
//! variants form a closed set, so consumers match exhaustively instead of
//! probing the JSON for members.

use serde::{ Deserialize, Deserializer, Serialize, Serializer };
use serde_json::{ Map, Value };
use std::fmt;

use crate::protocol::{ Id, RpcError };

/// The only protocol version this crate speaks
pub const JSONRPC_VERSION: &str = "2.0";

/// A call that expects a response
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Option<Value>,
    pub id: Id,
}

/// A call without an `id` member; it is never answered
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// Either kind of call, as found inside a batch or handed to a service
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Request(Request),
    Notification(Notification),
}

/// Exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

/// A response to a single request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Id,
    pub outcome: Outcome,
}

/// A non-empty, ordered group of calls sent as one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchRequest {
    pub items: Vec<Call>,
}

/// Responses to the requests of a batch. Entries are matched to requests by
/// id; their order carries no meaning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse {
    pub items: Vec<Response>,
}

/// Any JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
    BatchRequest(BatchRequest),
    BatchResponse(BatchResponse),
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Id) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = call_object(&self.method, &self.params);
        obj.insert("id".into(), self.id.to_value());
        Value::Object(obj)
    }
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(call_object(&self.method, &self.params))
    }
}

fn call_object(method: &str, params: &Option<Value>) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
    obj.insert("method".into(), Value::String(method.to_string()));
    if let Some(params) = params {
        obj.insert("params".into(), params.clone());
    }
    obj
}

impl Call {
    pub fn method(&self) -> &str {
        match self {
            Call::Request(req) => &req.method,
            Call::Notification(notif) => &notif.method,
        }
    }

    pub fn params(&self) -> Option<&Value> {
        match self {
            Call::Request(req) => req.params.as_ref(),
            Call::Notification(notif) => notif.params.as_ref(),
        }
    }

    /// The id to answer with, or `None` for a notification
    pub fn id(&self) -> Option<&Id> {
        match self {
            Call::Request(req) => Some(&req.id),
            Call::Notification(_) => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Call::Notification(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Call::Request(req) => req.to_value(),
            Call::Notification(notif) => notif.to_value(),
        }
    }
}

impl From<Request> for Call {
    fn from(req: Request) -> Self {
        Call::Request(req)
    }
}

impl From<Notification> for Call {
    fn from(notif: Notification) -> Self {
        Call::Notification(notif)
    }
}

impl Response {
    /// Create a success response
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Create an error response
    pub fn error(id: Id, error: RpcError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// The result, or `None` when this is an error response
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// The error, or `None` when this is a success response
    pub fn error_object(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(err) => Some(err),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
        obj.insert("id".into(), self.id.to_value());
        match &self.outcome {
            Outcome::Result(value) => obj.insert("result".into(), value.clone()),
            Outcome::Error(err) => obj.insert("error".into(), err.to_value()),
        };
        Value::Object(obj)
    }
}

impl BatchRequest {
    pub fn new(items: Vec<Call>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, call: impl Into<Call>) {
        self.items.push(call.into());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of the members that expect a response, in request order
    pub fn ids(&self) -> Vec<&Id> {
        self.items.iter().filter_map(Call::id).collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(Call::to_value).collect())
    }
}

impl BatchResponse {
    pub fn new(items: Vec<Response>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, response: Response) {
        self.items.push(response);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the entry answering the request with the given id
    pub fn find(&self, id: &Id) -> Option<&Response> {
        self.items.iter().find(|response| &response.id == id)
    }

    /// Pair each member of `request` with its response, in request order.
    ///
    /// Notifications pair with `None`, as does any request the peer left
    /// unanswered.
    pub fn correlate<'a>(&'a self, request: &'a BatchRequest) -> Vec<(&'a Call, Option<&'a Response>)> {
        request.items
            .iter()
            .map(|call| (call, call.id().and_then(|id| self.find(id))))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(Response::to_value).collect())
    }
}

impl Message {
    pub fn to_value(&self) -> Value {
        match self {
            Message::Request(req) => req.to_value(),
            Message::Notification(notif) => notif.to_value(),
            Message::Response(resp) => resp.to_value(),
            Message::BatchRequest(batch) => batch.to_value(),
            Message::BatchResponse(batch) => batch.to_value(),
        }
    }

    /// Whether a server loop should pick this message up
    pub fn is_request_shaped(&self) -> bool {
        matches!(self, Message::Request(_) | Message::Notification(_) | Message::BatchRequest(_))
    }

    /// Whether a waiting requester should pick this message up
    pub fn is_response_shaped(&self) -> bool {
        matches!(self, Message::Response(_) | Message::BatchResponse(_))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Message::BatchRequest(_) | Message::BatchResponse(_))
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        match call {
            Call::Request(req) => Message::Request(req),
            Call::Notification(notif) => Message::Notification(notif),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom("not a valid JSON-RPC 2.0 message")
        })
    }
}
