//! JSON-RPC 2.0 envelopes and error codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Lists the capability catalog.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Invokes one capability.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Error codes returned in [`ErrorObject::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The body is not valid JSON.
    ParseError = -32700,
    /// The body is JSON but not a valid request object.
    InvalidRequest = -32600,
    /// The method is not served.
    MethodNotFound = -32601,
    /// Missing or malformed parameters, or an unknown tool.
    InvalidParams = -32602,
    /// The server failed while handling the request.
    InternalError = -32603,
    /// The capability ran and reported a failure.
    CapabilityError = -32000,
}

impl ErrorCode {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Message used when no more specific one is available.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::CapabilityError => "Capability error",
        }
    }

    /// Maps a raw code back onto a known variant.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32603 => Some(Self::InternalError),
            -32000 => Some(Self::CapabilityError),
            _ => None,
        }
    }
}

/// Request identifier, echoed unchanged in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, kept as the exact JSON number.
    Number(Number),
    /// String id.
    String(String),
    /// Explicit or missing id.
    #[default]
    Null,
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id.into())
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::String(id) => write!(f, "{id:?}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// A validated request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Caller-chosen id.
    #[serde(default)]
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds a request.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Error member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error with a specific message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Creates an error carrying the code's default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Returns the known code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Response envelope. Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id copied from the request.
    #[serde(default)]
    pub id: RequestId,
    /// Successful outcome. A `null` result is serialised explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Splits the response into its outcome. A missing `result` on a
    /// successful response reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns the error object of a failed response.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Validates a raw body as a request envelope.
///
/// # Errors
///
/// Returns a ready-to-send failure response: `-32700` when the body is not
/// JSON, `-32600` when it is not a JSON-RPC 2.0 request object. The id is
/// echoed when it could be recovered.
pub fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        JsonRpcResponse::failure(
            RequestId::Null,
            ErrorObject::new(ErrorCode::ParseError, format!("Parse error: {err}")),
        )
    })?;

    let Value::Object(mut object) = value else {
        return Err(invalid_request(RequestId::Null, "request must be a JSON object"));
    };

    let id = match object.remove("id") {
        None => RequestId::Null,
        Some(raw) => serde_json::from_value(raw).map_err(|_| {
            invalid_request(RequestId::Null, "`id` must be a number, a string or null")
        })?,
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(invalid_request(id, "`jsonrpc` must be \"2.0\""));
    }
    let Some(Value::String(method)) = object.remove("method") else {
        return Err(invalid_request(id, "`method` must be a string"));
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_owned(),
        id,
        method,
        params: object.remove("params"),
    })
}

fn invalid_request(id: RequestId, reason: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, ErrorObject::new(ErrorCode::InvalidRequest, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_of(body: &str) -> i32 {
        parse_request(body.as_bytes())
            .expect_err("rejected")
            .error
            .unwrap()
            .code
    }

    #[test]
    fn accepts_all_id_forms() {
        for (raw, id) in [
            (r#"{"jsonrpc":"2.0","id":7,"method":"m"}"#, RequestId::from(7_i64)),
            (r#"{"jsonrpc":"2.0","id":"a","method":"m"}"#, RequestId::from("a")),
            (r#"{"jsonrpc":"2.0","id":null,"method":"m"}"#, RequestId::Null),
            (r#"{"jsonrpc":"2.0","method":"m"}"#, RequestId::Null),
        ] {
            assert_eq!(parse_request(raw.as_bytes()).unwrap().id, id);
        }
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert_eq!(code_of("{not json"), -32700);
        assert_eq!(code_of("[1, 2]"), -32600);
        assert_eq!(code_of(r#"{"jsonrpc":"1.0","id":1,"method":"m"}"#), -32600);
        assert_eq!(code_of(r#"{"jsonrpc":"2.0","id":1}"#), -32600);
        assert_eq!(code_of(r#"{"jsonrpc":"2.0","id":{},"method":"m"}"#), -32600);
    }

    #[test]
    fn integer_ids_beyond_i64_are_echoed_exactly() {
        let request =
            parse_request(br#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"tools/list"}"#)
                .unwrap();
        assert_eq!(request.id, RequestId::from(u64::MAX));

        let response = JsonRpcResponse::success(request.id, json!([]));
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(encoded.contains(r#""id":18446744073709551615"#));

        let negative = parse_request(br#"{"jsonrpc":"2.0","id":-3,"method":"m"}"#).unwrap();
        assert_eq!(negative.id, RequestId::from(-3_i64));
    }

    #[test]
    fn invalid_request_echoes_recoverable_id() {
        let response = parse_request(br#"{"jsonrpc":"2.0","id":"abc","method":5}"#)
            .expect_err("bad method");
        assert_eq!(response.id, RequestId::from("abc"));
    }

    #[test]
    fn null_results_are_serialised() {
        let response = JsonRpcResponse::success(RequestId::from(1_i64), Value::Null);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 1, "result": null })
        );

        let decoded: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(decoded.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_codes_round_trip() {
        for code in [
            ErrorCode::ParseError,
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParams,
            ErrorCode::InternalError,
            ErrorCode::CapabilityError,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
    }
}
