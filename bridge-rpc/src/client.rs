//! Tool-call client over HTTP or HTTPS.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bridge_primitives::Catalog;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_IDLE_PER_HOST: usize = 8;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by [`ToolCallClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint is not a usable URL.
    #[error("invalid endpoint: {reason}")]
    Configuration {
        /// Why the endpoint was rejected.
        reason: String,
    },

    /// The request could not be sent or timed out.
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying failure.
        reason: String,
    },

    /// The server answered with a non-JSON-RPC HTTP error.
    #[error("server returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The response body is not a JSON-RPC response.
    #[error("cannot decode response: {reason}")]
    Decode {
        /// Decoder diagnostic.
        reason: String,
    },

    /// The server returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
    },
}

impl ClientError {
    fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Calls `tools/list` and `tools/call` on a remote server.
pub struct ToolCallClient {
    client: HyperClient,
    endpoint: Uri,
    next_id: AtomicI64,
    timeout: Duration,
}

impl fmt::Debug for ToolCallClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCallClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ToolCallClient {
    /// Creates a client for `endpoint`, e.g. `http://127.0.0.1:8787/rpc`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] unless the endpoint is an
    /// `http://` or `https://` URL.
    pub fn new(endpoint: &str) -> ClientResult<Self> {
        let endpoint = endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ClientError::Configuration {
                reason: "endpoint must start with http:// or https://".to_owned(),
            });
        }
        let endpoint = endpoint
            .parse::<Uri>()
            .map_err(|err| ClientError::Configuration {
                reason: err.to_string(),
            })?;

        Ok(Self {
            client: build_client(),
            endpoint,
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Fetches the remote catalog.
    ///
    /// # Errors
    ///
    /// Propagates transport, decoding and JSON-RPC errors.
    pub async fn list_tools(&self) -> ClientResult<Catalog> {
        let result = self.request(METHOD_TOOLS_LIST, None).await?;
        serde_json::from_value(result).map_err(|err| ClientError::Decode {
            reason: format!("invalid catalog: {err}"),
        })
    }

    /// Invokes a remote capability.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] when the server reports an error, or a
    /// transport/decoding error.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<Value> {
        self.request(
            METHOD_TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_vec(&payload).map_err(|err| ClientError::Decode {
            reason: format!("cannot encode request: {err}"),
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|err| ClientError::transport(format!("cannot build request: {err}")))?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ClientError::transport("request timed out"))?
            .map_err(|err| ClientError::transport(err.to_string()))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| ClientError::transport(format!("cannot read response: {err}")))?;

        // Envelope rejections arrive as HTTP 400 with a JSON-RPC error body.
        let decoded = serde_json::from_slice::<JsonRpcResponse>(&bytes);
        let response = match decoded {
            Ok(response) => response,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Http {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Err(err) => {
                return Err(ClientError::Decode {
                    reason: err.to_string(),
                });
            }
        };

        response.into_result().map_err(|error| ClientError::Rpc {
            code: error.code,
            message: error.message,
        })
    }
}

fn build_client() -> HyperClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth();

    let mut tcp = HttpConnector::new();
    tcp.enforce_http(false);
    tcp.set_nodelay(true);
    tcp.set_connect_timeout(Some(CONNECT_TIMEOUT));

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(tcp);
    Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build::<_, Body>(connector)
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::sync::Arc;

    use bridge_tools::CapabilityRegistry;

    use crate::dispatch::ToolCallHandler;
    use crate::server::{ServerConfig, ToolCallServer};

    #[test]
    fn rejects_endpoints_without_scheme() {
        let err = ToolCallClient::new("localhost:8787/rpc").expect_err("missing scheme");
        assert!(matches!(err, ClientError::Configuration { .. }));
    }

    #[test]
    fn accepts_https_endpoints_with_default_timeout() {
        let client = ToolCallClient::new(" https://tools.example.com/rpc ").unwrap();
        assert_eq!(client.endpoint().scheme_str(), Some("https"));
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = client.with_timeout(Duration::from_millis(250));
        assert_eq!(client.timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn lists_and_calls_over_http() {
        let registry = Arc::new(CapabilityRegistry::new());
        bridge_tools::echo::register(&registry).unwrap();
        let handle = ToolCallServer::new(
            ToolCallHandler::new(registry),
            ServerConfig {
                listen: SocketAddr::from(([127, 0, 0, 1], 0)),
                ..ServerConfig::default()
            },
        )
        .start()
        .unwrap();

        let client = ToolCallClient::new(&handle.endpoint()).unwrap();
        let catalog = client.list_tools().await.unwrap();
        assert!(catalog.find("echo").is_some());

        let value = client
            .call_tool("echo", json!({ "text": "over the wire" }))
            .await
            .unwrap();
        assert_eq!(value, json!("over the wire"));

        let err = client
            .call_tool("nonexistent", json!({}))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, ClientError::Rpc { code: -32602, .. }));

        handle.shutdown().await.unwrap();
    }
}
