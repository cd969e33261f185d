//! Strict message validation
//!
//! Each message shape has a `from_value` constructor that accepts only the
//! exact member set and member types JSON-RPC 2.0 prescribes and returns
//! `None` on any deviation. [`Message::parse`] chains those attempts in a
//! fixed order: array input tries a batch request, then a batch response;
//! object input tries a request or notification, then a response.

use serde_json::{ Map, Value };

use crate::errors::{ Error, Result };
use crate::protocol::{
    BatchRequest,
    BatchResponse,
    Call,
    Id,
    Message,
    Notification,
    Outcome,
    Request,
    Response,
    RpcError,
    JSONRPC_VERSION,
};

fn has_version(obj: &Map<String, Value>) -> bool {
    obj.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
}

fn only_members(obj: &Map<String, Value>, allowed: &[&str]) -> bool {
    obj.keys().all(|key| allowed.contains(&key.as_str()))
}

/// `params` may hold any value; an explicit `null` stays distinct from an
/// absent member
fn read_params(obj: &Map<String, Value>) -> Option<Value> {
    obj.get("params").cloned()
}

impl Call {
    /// Read a request or a notification; the presence of the `id` member is
    /// the only thing that tells them apart
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !has_version(obj) || !only_members(obj, &["jsonrpc", "method", "params", "id"]) {
            return None;
        }
        let method = obj.get("method")?.as_str()?.to_string();
        let params = read_params(obj);
        match obj.get("id") {
            Some(id) => Some(Call::Request(Request { method, params, id: Id::from_value(id)? })),
            None => Some(Call::Notification(Notification { method, params })),
        }
    }
}

impl Request {
    pub fn from_value(value: &Value) -> Option<Self> {
        match Call::from_value(value)? {
            Call::Request(req) => Some(req),
            Call::Notification(_) => None,
        }
    }
}

impl Notification {
    pub fn from_value(value: &Value) -> Option<Self> {
        match Call::from_value(value)? {
            Call::Notification(notif) => Some(notif),
            Call::Request(_) => None,
        }
    }
}

impl Response {
    /// Read a response: exactly `jsonrpc`, `id` and one of `result`/`error`
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 3 || !has_version(obj) {
            return None;
        }
        let id = Id::from_value(obj.get("id")?)?;
        let outcome = match (obj.get("result"), obj.get("error")) {
            (Some(result), None) => Outcome::Result(result.clone()),
            (None, Some(error)) => Outcome::Error(RpcError::from_value(error)?),
            _ => {
                return None;
            }
        };
        Some(Response { id, outcome })
    }
}

impl BatchRequest {
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.is_empty() {
            return None;
        }
        items
            .iter()
            .map(Call::from_value)
            .collect::<Option<Vec<_>>>()
            .map(BatchRequest::new)
    }
}

impl BatchResponse {
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.is_empty() {
            return None;
        }
        items
            .iter()
            .map(Response::from_value)
            .collect::<Option<Vec<_>>>()
            .map(BatchResponse::new)
    }
}

impl Message {
    /// Classify an already-decoded JSON value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(_) =>
                BatchRequest::from_value(value)
                    .map(Message::BatchRequest)
                    .or_else(|| BatchResponse::from_value(value).map(Message::BatchResponse)),
            Value::Object(_) =>
                Call::from_value(value)
                    .map(Message::from)
                    .or_else(|| Response::from_value(value).map(Message::Response)),
            _ => None,
        }
    }

    /// Parse one raw frame.
    ///
    /// Anything that is not valid JSON, or valid JSON matching none of the
    /// shapes, yields [`Error::Parse`].
    pub fn parse(raw: &str) -> Result<Self> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(Error::Parse("empty frame".to_string()));
        }
        let value: Value = serde_json
            ::from_str(input)
            .map_err(|e| Error::Parse(format!("\"{}\" is not valid JSON: {}", input, e)))?;
        Message::from_value(&value).ok_or_else(|| {
            Error::Parse(format!("\"{}\" is not a valid json-rpc message", input))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> Option<Message> {
        Message::parse(raw).ok()
    }

    #[test]
    fn test_roundtrip_every_shape() {
        let messages = vec![
            Message::Request(Request::new("sum", Some(json!([1, 2, 3])), Id::Number(1))),
            Message::Request(Request::new("echo", None, Id::String("abc".into()))),
            Message::Request(Request::new("echo", Some(json!({ "a": 1 })), Id::Null)),
            Message::Notification(Notification::new("log", Some(json!({ "level": "info" })))),
            Message::Response(Response::success(Id::Number(1), json!(6))),
            Message::Response(
                Response::error(
                    Id::String("x".into()),
                    RpcError::method_not_found().with_data(json!({ "method": "doesNotExist" }))
                )
            ),
            Message::BatchRequest(
                BatchRequest::new(
                    vec![
                        Request::new("a", Some(json!([])), Id::Number(2)).into(),
                        Notification::new("b", None).into()
                    ]
                )
            ),
            Message::BatchResponse(
                BatchResponse::new(
                    vec![
                        Response::success(Id::Number(2), json!(null)),
                        Response::error(Id::Number(3), RpcError::internal_service_error())
                    ]
                )
            )
        ];

        for msg in messages {
            let text = msg.to_string();
            assert_eq!(Message::parse(&text).unwrap(), msg, "round trip of {}", text);
        }
    }

    #[test]
    fn test_scalar_and_null_params_survive() {
        let messages = vec![
            Message::Request(Request::new("sum", Some(json!(5)), Id::Number(1))),
            Message::Request(Request::new("sum", Some(Value::Null), Id::Number(2))),
            Message::Notification(Notification::new("log", Some(json!("line")))),
            Message::BatchRequest(
                BatchRequest::new(
                    vec![
                        Request::new("a", Some(json!(true)), Id::Number(3)).into(),
                        Notification::new("b", Some(Value::Null)).into()
                    ]
                )
            )
        ];
        for msg in messages {
            let text = msg.to_string();
            assert_eq!(Message::parse(&text).unwrap(), msg, "round trip of {}", text);
        }

        let absent = parse(r#"{"jsonrpc":"2.0","method":"m","id":1}"#).unwrap();
        let null = parse(r#"{"jsonrpc":"2.0","method":"m","params":null,"id":1}"#).unwrap();
        assert_ne!(absent, null);
        match null {
            Message::Request(req) => assert_eq!(req.params, Some(Value::Null)),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_notification_differs_from_null_id() {
        let notif = parse(r#"{"jsonrpc":"2.0","method":"m","params":[1]}"#).unwrap();
        assert!(matches!(notif, Message::Notification(_)));

        let req = parse(r#"{"jsonrpc":"2.0","method":"m","params":[1],"id":null}"#).unwrap();
        match req {
            Message::Request(req) => assert_eq!(req.id, Id::Null),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_response_member_rules() {
        // both result and error
        assert!(
            parse(
                r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"m"}}"#
            ).is_none()
        );
        // neither
        assert!(parse(r#"{"jsonrpc":"2.0","id":1}"#).is_none());
        // four members
        assert!(parse(r#"{"jsonrpc":"2.0","id":1,"result":1,"extra":true}"#).is_none());
        // missing id
        assert!(parse(r#"{"jsonrpc":"2.0","result":1,"extra":true}"#).is_none());
        // malformed error object
        assert!(parse(r#"{"jsonrpc":"2.0","id":1,"error":{"code":"x","message":"m"}}"#).is_none());
    }

    #[test]
    fn test_request_member_rules() {
        // missing jsonrpc
        assert!(parse(r#"{"method":"m","id":1}"#).is_none());
        // wrong version
        assert!(parse(r#"{"jsonrpc":"1.0","method":"m","id":1}"#).is_none());
        // method must be a string
        assert!(parse(r#"{"jsonrpc":"2.0","method":5,"id":1}"#).is_none());
        // fractional ids are not identifiers
        assert!(parse(r#"{"jsonrpc":"2.0","method":"m","id":1.5}"#).is_none());
        // unknown members
        assert!(parse(r#"{"jsonrpc":"2.0","method":"m","id":1,"x":0}"#).is_none());
    }

    #[test]
    fn test_batch_rules() {
        assert!(parse("[]").is_none());
        // mixed requests and responses match neither batch shape
        assert!(
            parse(r#"[{"jsonrpc":"2.0","method":"m","id":1},{"jsonrpc":"2.0","id":1,"result":0}]"#)
                .is_none()
        );
        let batch = parse(r#"[{"jsonrpc":"2.0","id":1,"result":0}]"#).unwrap();
        assert!(matches!(batch, Message::BatchResponse(ref b) if b.len() == 1));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        for raw in ["", "   ", "not json", "42", "\"str\"", "{\"jsonrpc\":\"2.0\"}"] {
            match Message::parse(raw) {
                Err(Error::Parse(_)) => {}
                other => panic!("{:?} should not parse, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_variant_constructors_are_strict() {
        let notif = json!({ "jsonrpc": "2.0", "method": "m" });
        assert!(Request::from_value(&notif).is_none());
        assert!(Notification::from_value(&notif).is_some());

        let req = json!({ "jsonrpc": "2.0", "method": "m", "id": 3 });
        assert!(Notification::from_value(&req).is_none());
        assert_eq!(Request::from_value(&req).unwrap().id, Id::Number(3));
    }
}
