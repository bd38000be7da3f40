//! HTTP front end for the tool-call protocol.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bridge_telemetry::CallTimer;
use bridge_telemetry::timing::format_millis;
use bytes::BytesMut;
use hyper::body::HttpBody;
use hyper::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::ToolCallHandler;
use crate::limiter::ConcurrencyLimit;
use crate::protocol::{ErrorCode, ErrorObject, JsonRpcResponse, RequestId, parse_request};

/// Response header carrying the wall-clock handling time in milliseconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time-ms";

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; port `0` picks an ephemeral port.
    pub listen: SocketAddr,
    /// Path serving JSON-RPC. `/` is always accepted as well.
    pub path: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Requests dispatched at once.
    pub max_concurrency: NonZeroUsize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            path: "/rpc".to_owned(),
            max_body_bytes: 1024 * 1024,
            max_concurrency: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Errors raised while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: hyper::Error,
    },

    /// The server stopped with an error.
    #[error("server failed: {0}")]
    Serve(#[from] hyper::Error),

    /// The server task panicked or was cancelled.
    #[error("server task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Tool-call server bound to a [`ToolCallHandler`].
#[derive(Debug)]
pub struct ToolCallServer {
    handler: ToolCallHandler,
    config: ServerConfig,
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    path: String,
    limit: ConcurrencyLimit,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), hyper::Error>>,
}

impl ServerHandle {
    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full URL of the JSON-RPC endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Stops admitting requests, stops accepting connections, lets dispatched
    /// requests finish and waits for the server to exit.
    ///
    /// # Errors
    ///
    /// Returns the error the server stopped with.
    pub async fn shutdown(mut self) -> ServerResult<()> {
        // Requests still waiting for a slot are answered with 503 while the
        // ones already dispatched drain.
        self.limit.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let result = (&mut self.task).await;
        info!(addr = %self.local_addr, "tool-call server stopped");
        result?.map_err(ServerError::from)
    }

    /// Waits until the server exits on its own.
    ///
    /// # Errors
    ///
    /// Returns the error the server stopped with.
    pub async fn wait(mut self) -> ServerResult<()> {
        (&mut self.task).await?.map_err(ServerError::from)
    }
}

struct Shared {
    handler: ToolCallHandler,
    path: String,
    max_body_bytes: usize,
    limit: ConcurrencyLimit,
}

impl ToolCallServer {
    /// Creates a server; nothing is bound until [`ToolCallServer::start`].
    #[must_use]
    pub fn new(handler: ToolCallHandler, config: ServerConfig) -> Self {
        Self { handler, config }
    }

    /// Binds the listener and serves on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address is unavailable.
    pub fn start(self) -> ServerResult<ServerHandle> {
        let addr = self.config.listen;
        let builder =
            Server::try_bind(&addr).map_err(|source| ServerError::Bind { addr, source })?;

        let limit = ConcurrencyLimit::new(self.config.max_concurrency);
        let shared = Arc::new(Shared {
            handler: self.handler,
            path: self.config.path.clone(),
            max_body_bytes: self.config.max_body_bytes,
            limit: limit.clone(),
        });

        let make_service = make_service_fn(move |conn: &AddrStream| {
            let shared = Arc::clone(&shared);
            let peer = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let shared = Arc::clone(&shared);
                    async move { Ok::<_, Infallible>(shared.serve(peer, request).await) }
                }))
            }
        });

        let server = builder.serve(make_service);
        let local_addr = server.local_addr();
        let (shutdown, signal) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            let _ = signal.await;
        });
        let task = tokio::spawn(graceful);

        info!(addr = %local_addr, path = %self.config.path, "tool-call server listening");
        Ok(ServerHandle {
            local_addr,
            path: self.config.path,
            limit,
            shutdown: Some(shutdown),
            task,
        })
    }
}

impl Shared {
    async fn serve(&self, peer: SocketAddr, request: Request<Body>) -> Response<Body> {
        let timer = CallTimer::start("tools-http");
        let method = request.method().clone();
        let path = request.uri().path().to_owned();

        let mut response = self.route(request).await;

        let elapsed = timer.finish();
        if let Ok(value) = HeaderValue::from_str(&format_millis(elapsed)) {
            response.headers_mut().insert(PROCESS_TIME_HEADER, value);
        }
        debug!(
            %peer,
            %method,
            path = %path,
            status = response.status().as_u16(),
            ?elapsed,
            "http request"
        );
        response
    }

    async fn route(&self, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path();
        if path != self.path && path != "/" {
            return status_response(StatusCode::NOT_FOUND);
        }
        if request.method() != Method::POST {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let body = match self.read_body(request).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let Ok(_permit) = self.limit.acquire().await else {
            return status_response(StatusCode::SERVICE_UNAVAILABLE);
        };

        let request = match parse_request(&body) {
            Ok(request) => request,
            Err(rejection) => return json_response(StatusCode::BAD_REQUEST, &rejection),
        };

        let id = request.id.clone();
        let handler = self.handler.clone();
        match tokio::task::spawn_blocking(move || handler.handle(request)).await {
            Ok(response) => json_response(StatusCode::OK, &response),
            Err(err) => {
                error!(error = %err, "dispatch task failed");
                let response =
                    JsonRpcResponse::failure(id, ErrorObject::from_code(ErrorCode::InternalError));
                json_response(StatusCode::OK, &response)
            }
        }
    }

    async fn read_body(&self, request: Request<Body>) -> Result<BytesMut, Response<Body>> {
        let declared = request
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(status_response(StatusCode::PAYLOAD_TOO_LARGE));
        }

        let mut body = request.into_body();
        let mut buffer = BytesMut::with_capacity(declared.unwrap_or(0));
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|err| {
                warn!(error = %err, "failed to read request body");
                status_response(StatusCode::BAD_REQUEST)
            })?;
            if buffer.len() + chunk.len() > self.max_body_bytes {
                return Err(status_response(StatusCode::PAYLOAD_TOO_LARGE));
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer)
    }
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, payload: &JsonRpcResponse) -> Response<Body> {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "response serialisation failed");
            let fallback = JsonRpcResponse::failure(
                RequestId::Null,
                ErrorObject::from_code(ErrorCode::InternalError),
            );
            serde_json::to_vec(&fallback).unwrap_or_default()
        }
    };
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    use bridge_tools::CapabilityRegistry;
    use hyper::Client;
    use serde_json::{Value, json};

    async fn start() -> ServerHandle {
        let registry = Arc::new(CapabilityRegistry::new());
        bridge_tools::echo::register(&registry).unwrap();
        let config = ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_body_bytes: 256,
            ..ServerConfig::default()
        };
        ToolCallServer::new(ToolCallHandler::new(registry), config)
            .start()
            .unwrap()
    }

    async fn post(url: &str, body: impl Into<Body>) -> (StatusCode, Option<HeaderValue>, Value) {
        let request = Request::post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap();
        let response = Client::new().request(request).await.unwrap();
        let status = response.status();
        let timing = response.headers().get(PROCESS_TIME_HEADER).cloned();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, timing, value)
    }

    #[tokio::test]
    async fn serves_tool_calls_with_timing_header() {
        let handle = start().await;
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                           "params": { "name": "echo", "arguments": { "text": "hi" } } });

        let (status, timing, value) = post(&handle.endpoint(), body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(timing.is_some());
        assert_eq!(value, json!({ "jsonrpc": "2.0", "id": 1, "result": "hi" }));

        let root = format!("http://{}/", handle.local_addr());
        let (status, _, value) = post(&root, body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["result"], "hi");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rpc_errors_are_200_and_envelope_errors_are_400() {
        let handle = start().await;
        let (status, _, value) = post(
            &handle.endpoint(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {} }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["error"]["code"], -32602);

        let (status, _, value) = post(&handle.endpoint(), "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"]["code"], -32700);
        assert_eq!(value["id"], Value::Null);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_routes_methods_and_sizes() {
        let handle = start().await;
        let client = Client::new();

        let wrong_path = format!("http://{}/other", handle.local_addr());
        let (status, _, _) = post(&wrong_path, "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let get = Request::get(handle.endpoint()).body(Body::empty()).unwrap();
        let response = client.request(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");

        let (status, _, _) = post(&handle.endpoint(), "x".repeat(1024)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_turns_away_queued_requests_and_drains_running_ones() {
        use std::sync::Mutex;
        use std::sync::mpsc;
        use std::time::Duration;

        use bridge_primitives::{CapabilityDescriptor, CapabilityName};
        use bridge_tools::CapabilityResult;

        let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let registry = Arc::new(CapabilityRegistry::new());
        let descriptor = CapabilityDescriptor::builder(CapabilityName::new("hold").unwrap())
            .description("Blocks until released")
            .unwrap()
            .build()
            .unwrap();
        registry
            .register(descriptor, move |_: Value| -> CapabilityResult<Value> {
                let _ = entered_tx.send(());
                let _ = release_rx.lock().unwrap().recv();
                Ok(json!("done"))
            })
            .unwrap();

        let handle = ToolCallServer::new(
            ToolCallHandler::new(registry),
            ServerConfig {
                listen: SocketAddr::from(([127, 0, 0, 1], 0)),
                max_concurrency: NonZeroUsize::new(1).unwrap(),
                ..ServerConfig::default()
            },
        )
        .start()
        .unwrap();
        let endpoint = handle.endpoint();
        let call = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                           "params": { "name": "hold" } })
        .to_string();

        let running = tokio::spawn({
            let (endpoint, call) = (endpoint.clone(), call.clone());
            async move { post(&endpoint, call).await }
        });
        entered_rx.recv().await.unwrap();

        let queued = tokio::spawn({
            let (endpoint, call) = (endpoint.clone(), call.clone());
            async move { post(&endpoint, call).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stopping = tokio::spawn(handle.shutdown());
        let (status, _, _) = queued.await.unwrap();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        release_tx.send(()).unwrap();
        let (status, _, value) = running.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["result"], "done");
        stopping.await.unwrap().unwrap();
    }
}
