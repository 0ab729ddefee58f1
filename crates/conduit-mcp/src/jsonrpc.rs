//! JSON-RPC 2.0 message model for MCP communication.
//!
//! Outbound traffic is built from [`JsonRpcRequest`] and
//! [`JsonRpcNotification`]. Inbound lines are classified into a
//! [`JsonRpcMessage`]; responses always carry exactly one of `result` or
//! `error`, enforced at decode time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// The JSON-RPC version tag. Always "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

/// Marker for the `jsonrpc` field. Serializes as "2.0" and refuses anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag == JSONRPC_VERSION {
            Ok(Version)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version '{tag}'"
            )))
        }
    }
}

/// Request identifier. JSON-RPC allows strings and integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => f.write_str(s),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        RequestId::Number(n.into())
    }
}

/// The fixed MCP method vocabulary used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Initialized,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    PromptsList,
    PromptsGet,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Initialized => "notifications/initialized",
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead => "resources/read",
            Method::PromptsList => "prompts/list",
            Method::PromptsGet => "prompts/get",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Version,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: Version,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Classify the numeric code.
    pub fn kind(&self) -> ErrorCode {
        ErrorCode::from(self.code)
    }
}

/// Standard JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Implementation-defined server error, -32099 through -32000.
    ServerError(i64),
    /// Any code outside the reserved ranges.
    Other(i64),
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) | ErrorCode::Other(code) => code,
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32099..=-32000 => ErrorCode::ServerError(code),
            other => ErrorCode::Other(other),
        }
    }
}

/// Outcome carried by a response: a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(JsonRpcError),
}

/// A JSON-RPC 2.0 response.
///
/// `id` is `None` when the peer answers with `"id": null`, which it does for
/// requests it could not parse. Such responses correlate with nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct JsonRpcResponse {
    pub jsonrpc: Version,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn result(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: Version,
            id: Some(id.into()),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Create an error response.
    pub fn error(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Version,
            id: Some(id.into()),
            payload: ResponsePayload::Error(error),
        }
    }

    /// Create an error response for a request whose id could not be read.
    pub fn error_without_id(error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Version,
            id: None,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Split into the result value or the peer's error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(error) => Err(error),
        }
    }
}

/// Wire shape of a response before the result/error exclusivity check.
#[derive(Deserialize)]
struct RawResponse {
    jsonrpc: Version,
    // Required, but may be null.
    #[serde(deserialize_with = "nullable_id")]
    id: Option<RequestId>,
    // `present` keeps an explicit `"result": null` distinct from a missing field.
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn nullable_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RequestId>, D::Error> {
    Option::<RequestId>::deserialize(deserializer)
}

impl TryFrom<RawResponse> for JsonRpcResponse {
    type Error = String;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let id = match &raw.id {
            Some(id) => id.to_string(),
            None => "null".to_string(),
        };
        let payload = match (raw.result, raw.error) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => ResponsePayload::Error(error),
            (Some(_), Some(_)) => {
                return Err(format!("response {id} has both result and error"));
            }
            (None, None) => {
                return Err(format!("response {id} has neither result nor error"));
            }
        };
        Ok(Self {
            jsonrpc: raw.jsonrpc,
            id: raw.id,
            payload,
        })
    }
}

/// Any inbound message, classified by shape.
///
/// Requests are tried before responses and notifications: a request has both
/// `id` and `method`, a response has `id` and no `method`, a notification has
/// `method` and no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Parse one line of wire traffic.
    pub fn parse(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_request_with_params() {
        let req = JsonRpcRequest::new(
            "1",
            Method::ToolsCall.as_str(),
            Some(json!({"name": "read", "arguments": {}})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], "1");
        assert_eq!(json["method"], "tools/call");
        assert!(json["params"].is_object());
    }

    #[test]
    fn serialize_request_without_params() {
        let req = JsonRpcRequest::new(2, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 2);
        assert!(json.get("params").is_none());
    }

    #[test]
    fn serialized_request_is_single_line() {
        let req = JsonRpcRequest::new("7", "tools/call", Some(json!({"text": "a\nb"})));
        let line = serde_json::to_string(&req).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn serialize_notification_has_no_id() {
        let notif = JsonRpcNotification::new(Method::Initialized.as_str(), None);
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }

    #[test]
    fn deserialize_response_with_result() {
        let json = r#"{"jsonrpc":"2.0","id":"1","result":{"tools":[]}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, Some(RequestId::from("1")));
        assert_eq!(resp.payload, ResponsePayload::Result(json!({"tools": []})));
    }

    #[test]
    fn deserialize_response_with_null_result() {
        let json = r#"{"jsonrpc":"2.0","id":3,"result":null}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.payload, ResponsePayload::Result(Value::Null));
    }

    #[test]
    fn deserialize_response_with_error() {
        let json =
            r#"{"jsonrpc":"2.0","id":"2","error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.kind(), ErrorCode::MethodNotFound);
        assert_eq!(err.message, "Method not found");
        assert!(err.data.is_none());
    }

    #[test]
    fn deserialize_response_with_error_data() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32001,"message":"Busy","data":{"retry":true}}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorCode::ServerError(-32001));
        assert_eq!(err.data.unwrap()["retry"], true);
    }

    #[test]
    fn response_with_both_result_and_error_is_rejected() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":-32603,"message":"x"}}"#;
        assert!(serde_json::from_str::<JsonRpcResponse>(json).is_err());
    }

    #[test]
    fn response_with_neither_result_nor_error_is_rejected() {
        let json = r#"{"jsonrpc":"2.0","id":1}"#;
        assert!(serde_json::from_str::<JsonRpcResponse>(json).is_err());
    }

    #[test]
    fn null_id_error_response_is_accepted() {
        let line = br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        match JsonRpcMessage::parse(line).unwrap() {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.id, None);
                assert_eq!(resp.into_result().unwrap_err().kind(), ErrorCode::ParseError);
            }
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn response_without_id_field_is_rejected() {
        let json = r#"{"jsonrpc":"2.0","result":{}}"#;
        assert!(serde_json::from_str::<JsonRpcResponse>(json).is_err());
    }

    #[test]
    fn serialize_response_without_id_writes_null() {
        let resp =
            JsonRpcResponse::error_without_id(JsonRpcError::new(ErrorCode::ParseError, "bad"));
        let json = serde_json::to_value(resp).unwrap();
        assert!(json["id"].is_null());
        assert!(json.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let json = r#"{"jsonrpc":"1.0","id":1,"result":{}}"#;
        assert!(serde_json::from_str::<JsonRpcResponse>(json).is_err());
    }

    #[test]
    fn serialize_response_flattens_payload() {
        let ok = serde_json::to_value(JsonRpcResponse::result("4", json!({"ok": true}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": "4", "result": {"ok": true}}));

        let err = JsonRpcResponse::error(5, JsonRpcError::new(ErrorCode::InvalidParams, "bad"));
        let err = serde_json::to_value(err).unwrap();
        assert_eq!(err["error"]["code"], -32602);
        assert!(err.get("result").is_none());
    }

    #[test]
    fn classify_inbound_messages() {
        let req = JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#).unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(_)));

        let resp = JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","id":9,"result":{}}"#).unwrap();
        assert!(matches!(resp, JsonRpcMessage::Response(_)));

        let notif = JsonRpcMessage::parse(
            br#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#,
        )
        .unwrap();
        assert!(matches!(notif, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn classify_rejects_garbage() {
        assert!(JsonRpcMessage::parse(b"not json").is_err());
        assert!(JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","id":1}"#).is_err());
        assert!(JsonRpcMessage::parse(br#"{"hello":"world"}"#).is_err());
    }

    #[test]
    fn error_code_classification() {
        assert_eq!(ErrorCode::from(-32700), ErrorCode::ParseError);
        assert_eq!(ErrorCode::from(-32600), ErrorCode::InvalidRequest);
        assert_eq!(ErrorCode::from(-32602), ErrorCode::InvalidParams);
        assert_eq!(ErrorCode::from(-32603), ErrorCode::InternalError);
        assert_eq!(ErrorCode::from(-32050), ErrorCode::ServerError(-32050));
        assert_eq!(ErrorCode::from(42), ErrorCode::Other(42));
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Initialize.as_str(), "initialize");
        assert_eq!(Method::ResourcesRead.to_string(), "resources/read");
        assert_eq!(Method::PromptsGet.as_str(), "prompts/get");
    }
}
