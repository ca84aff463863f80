//! Wire envelope and classification of untrusted payloads.
//!
//! Every message on the channel is a JSON object with a `type` discriminant:
//!
//! ```text
//! { "type": "request",  "id": "rpc-1", "method": "add", "params": {..}, "channel": "rpc" }
//! { "type": "response", "id": "rpc-1", "result": 5, "channel": "rpc" }
//! { "type": "response", "id": "rpc-1", "error": { "code": -32000, "message": ".." } }
//! ```
//!
//! The guard functions (`is_rpc_*`, [`classify`]) run on data from another
//! process. They are total: malformed input yields `false` / `None`.

use crate::config::RpcConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A request or notification. Both share this shape; only the sender knows
/// whether a response is awaited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A response correlated to a request by `id`.
///
/// Success responses built by this crate always carry `result` (possibly
/// `null`) so that the receiving guard recognises them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Error payload of a failed response.
///
/// Decoding is lenient: a missing, `null` or out-of-range `code` becomes
/// [`RpcConfig::HANDLER_ERROR_CODE`], and a non-string `message` becomes its
/// JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default = "handler_error_code", deserialize_with = "lenient_code")]
    pub code: i32,
    #[serde(default, deserialize_with = "lenient_message")]
    pub message: String,
}

fn handler_error_code() -> i32 {
    RpcConfig::HANDLER_ERROR_CODE
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(RpcConfig::HANDLER_ERROR_CODE))
}

fn lenient_message<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(message) => message,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Any message that travels over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl RpcMessage {
    pub fn id(&self) -> &str {
        match self {
            RpcMessage::Request(request) => &request.id,
            RpcMessage::Response(response) => &response.id,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            RpcMessage::Request(request) => request.channel.as_deref(),
            RpcMessage::Response(response) => response.channel.as_deref(),
        }
    }

    /// `"request"` or `"response"`, matching the wire discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcMessage::Request(_) => "request",
            RpcMessage::Response(_) => "response",
        }
    }

    /// Serialize into a JSON value with the `type` discriminant.
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl From<RpcRequest> for RpcMessage {
    fn from(request: RpcRequest) -> Self {
        RpcMessage::Request(request)
    }
}

impl From<RpcResponse> for RpcMessage {
    fn from(response: RpcResponse) -> Self {
        RpcMessage::Response(response)
    }
}

impl RpcResponse {
    /// Whether this response reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the settled value or the remote error.
    ///
    /// A response carrying neither `result` nor `error` is a successful
    /// `null`.
    pub fn into_outcome(self) -> std::result::Result<Value, RpcErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Build a request, generating an id when none is given.
pub fn create_rpc_request(
    method: impl Into<String>,
    params: Option<Value>,
    id: Option<String>,
    channel: Option<String>,
) -> RpcRequest {
    RpcRequest {
        id: id.unwrap_or_else(generate_message_id),
        method: method.into(),
        params,
        channel,
    }
}

/// Build a success response.
pub fn create_rpc_response(
    id: impl Into<String>,
    result: Option<Value>,
    channel: Option<String>,
) -> RpcResponse {
    RpcResponse {
        id: id.into(),
        result: Some(result.unwrap_or(Value::Null)),
        error: None,
        channel,
    }
}

/// Build an error response.
pub fn create_rpc_error_response(
    id: impl Into<String>,
    code: i32,
    message: impl Into<String>,
    channel: Option<String>,
) -> RpcResponse {
    RpcResponse {
        id: id.into(),
        result: None,
        error: Some(RpcErrorObject {
            code,
            message: message.into(),
        }),
        channel,
    }
}

/// Generate a message id: base-36 millisecond timestamp followed by a
/// base-36 random suffix.
pub fn generate_message_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let suffix: u64 = rand::random();
    format!("{}{}", to_base36(millis), to_base36(suffix))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

// ============================================================================
// Guards
// ============================================================================

/// Object with a string `id`.
pub fn is_rpc_message(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("id"))
        .is_some_and(Value::is_string)
}

/// Request-shaped: `type == "request"` and a string `method`.
pub fn is_rpc_request(value: &Value) -> bool {
    is_rpc_message(value)
        && value.get("type").and_then(Value::as_str) == Some("request")
        && value.get("method").is_some_and(Value::is_string)
}

/// Response-shaped: `type == "response"` with a `result` key, an object or
/// `null` `error`, or neither. A `null` error is a successful `null` result.
pub fn is_rpc_response(value: &Value) -> bool {
    if !is_rpc_message(value) || value.get("type").and_then(Value::as_str) != Some("response") {
        return false;
    }
    let has_result = value.get("result").is_some();
    match value.get("error") {
        Some(error) => has_result || error.is_object() || error.is_null(),
        None => true,
    }
}

/// Decode an untrusted payload into a message, or `None` if it is not ours.
pub fn classify(value: &Value) -> Option<RpcMessage> {
    if is_rpc_request(value) {
        serde_json::from_value::<RpcRequest>(value.clone())
            .ok()
            .map(RpcMessage::Request)
    } else if is_rpc_response(value) {
        serde_json::from_value::<RpcResponse>(strip_non_object_error(value))
            .ok()
            .map(RpcMessage::Response)
    } else {
        None
    }
}

/// A response whose `error` is not an object is a success; drop the junk
/// `error` before decoding.
fn strip_non_object_error(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(obj) = value.as_object_mut() {
        if obj.get("error").is_some_and(|e| !e.is_object()) {
            obj.remove("error");
        }
    }
    value
}
