//! Routes validated requests into the capability registry.

use std::sync::Arc;
use std::time::Instant;

use bridge_tools::{CapabilityError, CapabilityRegistry};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::protocol::{
    ErrorCode, ErrorObject, JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};

/// Context captured when a request enters the dispatcher.
#[derive(Debug, Clone, Copy)]
struct CallContext {
    received_at: Instant,
}

/// Answers `tools/list` and `tools/call` from a shared registry.
#[derive(Debug, Clone)]
pub struct ToolCallHandler {
    registry: Arc<CapabilityRegistry>,
}

impl ToolCallHandler {
    /// Creates a handler serving `registry`.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry being served.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Handles one request. Never fails: every outcome is a response carrying
    /// the request's id.
    ///
    /// Capabilities run on the calling thread; async callers should use
    /// [`tokio::task::spawn_blocking`].
    #[must_use]
    pub fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let ctx = CallContext {
            received_at: Instant::now(),
        };
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let outcome = match method.as_str() {
            METHOD_TOOLS_LIST => self.list(),
            METHOD_TOOLS_CALL => self.call(params),
            other => Err(ErrorObject::new(
                ErrorCode::MethodNotFound,
                format!("method `{other}` not found"),
            )),
        };

        let elapsed = ctx.received_at.elapsed();
        match outcome {
            Ok(result) => {
                debug!(%id, method = %method, ?elapsed, "request handled");
                JsonRpcResponse::success(id, result)
            }
            Err(err) => {
                debug!(
                    %id,
                    method = %method,
                    ?elapsed,
                    code = err.code,
                    error = %err.message,
                    "request failed"
                );
                JsonRpcResponse::failure(id, err)
            }
        }
    }

    fn list(&self) -> Result<Value, ErrorObject> {
        serde_json::to_value(self.registry.catalog()).map_err(|err| {
            error!(error = %err, "catalog serialisation failed");
            ErrorObject::from_code(ErrorCode::InternalError)
        })
    }

    fn call(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
        let Some(Value::Object(mut params)) = params else {
            return Err(invalid_params("params must be an object with a string `name`"));
        };
        let Some(Value::String(name)) = params.remove("name") else {
            return Err(invalid_params("`name` must be a string"));
        };
        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(arguments @ Value::Object(_)) => arguments,
            Some(_) => return Err(invalid_params("`arguments` must be an object")),
        };

        self.registry
            .call(&name, arguments)
            .map_err(|err| error_object(&name, err))
    }
}

fn invalid_params(message: impl Into<String>) -> ErrorObject {
    ErrorObject::new(ErrorCode::InvalidParams, message)
}

fn error_object(name: &str, err: CapabilityError) -> ErrorObject {
    match err {
        CapabilityError::Unknown { .. } => invalid_params(format!("unknown tool `{name}`")),
        CapabilityError::InvalidArguments { reason } => invalid_params(reason),
        CapabilityError::Execution { reason } => {
            ErrorObject::new(ErrorCode::CapabilityError, reason)
        }
        other => {
            error!(tool = name, error = %other, "unexpected registry failure");
            ErrorObject::new(ErrorCode::InternalError, other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bridge_primitives::{CapabilityDescriptor, CapabilityName, ParamKind, ParamSpec};
    use bridge_tools::CapabilityResult;
    use serde_json::json;

    use crate::protocol::{RequestId, parse_request};

    fn handler() -> ToolCallHandler {
        let registry = Arc::new(CapabilityRegistry::new());
        bridge_tools::echo::register(&registry).unwrap();
        let failing = CapabilityDescriptor::builder(CapabilityName::new("fail").unwrap())
            .description("Always fails")
            .unwrap()
            .param(ParamSpec::optional("why", ParamKind::String).unwrap())
            .unwrap()
            .build()
            .unwrap();
        registry
            .register(failing, |_: Value| -> CapabilityResult<Value> {
                Err(CapabilityError::execution("inbox is on fire"))
            })
            .unwrap();
        ToolCallHandler::new(registry)
    }

    fn handle(handler: &ToolCallHandler, body: Value) -> JsonRpcResponse {
        let request = parse_request(body.to_string().as_bytes()).unwrap();
        handler.handle(request)
    }

    #[test]
    fn call_echo_returns_text() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                    "params": { "name": "echo", "arguments": { "text": "hi" } } }),
        );
        assert_eq!(response.id, RequestId::from(1_i64));
        assert_eq!(response.into_result().unwrap(), json!("hi"));
    }

    #[test]
    fn missing_name_is_invalid_params() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {} }),
        );
        assert_eq!(response.into_result().unwrap_err().code, -32602);
    }

    #[test]
    fn unknown_tool_is_invalid_params() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": "x", "method": "tools/call",
                    "params": { "name": "nonexistent" } }),
        );
        assert_eq!(response.id, RequestId::from("x"));
        let err = response.into_result().unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidParams));
        assert!(err.message.contains("nonexistent"));
    }

    #[test]
    fn capability_failures_keep_their_message() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                    "params": { "name": "fail", "arguments": null } }),
        );
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "inbox is on fire");
    }

    #[test]
    fn bad_arguments_are_invalid_params() {
        let handler = handler();
        for params in [
            json!({ "name": "echo", "arguments": [1] }),
            json!({ "name": "echo", "arguments": { "text": 5 } }),
            json!({ "name": 5 }),
        ] {
            let response = handle(
                &handler,
                json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": params }),
            );
            assert_eq!(response.into_result().unwrap_err().code, -32602);
        }
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/delete" }),
        );
        assert_eq!(response.into_result().unwrap_err().code, -32601);
    }

    #[test]
    fn list_returns_the_catalog() {
        let response = handle(
            &handler(),
            json!({ "jsonrpc": "2.0", "id": 6, "method": "tools/list" }),
        );
        let result = response.into_result().unwrap();
        let names: Vec<_> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["echo", "fail"]);
        assert_eq!(result["tools"][0]["inputSchema"]["required"], json!(["text"]));
    }
}
