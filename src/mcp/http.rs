//! HTTP transport for the MCP server
//!
//! Accepts one JSON-RPC message per HTTP POST body and answers with the
//! JSON-RPC reply.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::{JSONRPC_VERSION, error_codes};
use crate::mcp::server::McpServer;

/// Largest request body accepted, in bytes
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP server forwarding POSTed JSON-RPC messages to an [`McpServer`]
pub struct HttpMcpServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HttpMcpServer {
    /// Bind `bind_address` (`host:port`, port 0 for an OS-assigned one) and
    /// start accepting connections in a background task.
    #[inline]
    pub async fn start(server: Arc<McpServer>, bind_address: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("Failed to bind MCP HTTP server to {}", bind_address))?;
        let local_addr = listener.local_addr()?;

        info!("MCP HTTP server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, server, shutdown_rx).await;
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The full URL of the running server (e.g. `http://127.0.0.1:8081`)
    #[inline]
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit
    #[inline]
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("MCP HTTP accept loop ended abnormally: {}", e);
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        server: Arc<McpServer>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("MCP HTTP connection from {}", addr);
                            let server = Arc::clone(&server);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let server = Arc::clone(&server);
                                    handle_mcp_request(server, req)
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    error!("MCP HTTP connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("MCP HTTP accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("MCP HTTP server shutting down");
                    break;
                }
            }
        }
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn jsonrpc_error_response(status: StatusCode, code: i32, message: &str) -> Response<Full<Bytes>> {
    let body = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": null,
        "error": {
            "code": code,
            "message": message
        }
    });
    json_response(status, body.to_string().into_bytes())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            warn!("Failed to build HTTP response, returning empty 500");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        })
}

async fn handle_mcp_request<B>(
    server: Arc<McpServer>,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    if req.method() != Method::POST {
        return Ok(jsonrpc_error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            error_codes::INVALID_REQUEST,
            "Method not allowed, use POST",
        ));
    }

    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!("Rejecting MCP HTTP request over {} bytes", MAX_BODY_BYTES);
            return Ok(jsonrpc_error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                error_codes::INVALID_REQUEST,
                "Request body too large",
            ));
        }
        Err(e) => {
            error!("Failed to read MCP HTTP request body: {}", e);
            return Ok(empty_response(StatusCode::BAD_REQUEST));
        }
    };
    let text = String::from_utf8_lossy(&body);

    let Some(reply) = server.handle_line(text.trim()).await else {
        return Ok(empty_response(StatusCode::ACCEPTED));
    };

    match serde_json::to_vec(&reply) {
        Ok(bytes) => Ok(json_response(StatusCode::OK, bytes)),
        Err(e) => {
            error!("Failed to serialize MCP reply: {}", e);
            Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::Implementation;
    use crate::mcp::tools::ToolRegistry;

    fn empty_server() -> Arc<McpServer> {
        let info = Implementation {
            name: "test".to_string(),
            version: "1.0.0".to_string(),
        };
        Arc::new(McpServer::new(info, ToolRegistry::new()).expect("server"))
    }

    #[tokio::test]
    async fn start_and_shutdown_on_ephemeral_port() {
        let http = HttpMcpServer::start(empty_server(), "127.0.0.1:0")
            .await
            .expect("should bind");

        assert!(http.local_addr().port() > 0);
        assert!(http.url().starts_with("http://127.0.0.1:"));

        http.shutdown().await;
    }

    fn post(body: impl Into<Bytes>) -> Request<Full<Bytes>> {
        let mut req = Request::new(Full::new(body.into()));
        *req.method_mut() = Method::POST;
        req
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("full body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("JSON body")
    }

    #[tokio::test]
    async fn post_body_is_dispatched() {
        let response = handle_mcp_request(
            empty_server(),
            post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
        )
        .await
        .expect("infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["id"], 1);
        assert!(reply["result"].is_object());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let response = handle_mcp_request(empty_server(), post(vec![b' '; MAX_BODY_BYTES + 1]))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let reply = body_json(response).await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn body_at_the_limit_is_read() {
        let mut body = br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#.to_vec();
        body.resize(MAX_BODY_BYTES, b' ');

        let response = handle_mcp_request(empty_server(), post(body))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], 2);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = HttpMcpServer::start(empty_server(), "127.0.0.1:0")
            .await
            .expect("should bind");
        let taken = first.local_addr().to_string();

        let second = HttpMcpServer::start(empty_server(), &taken).await;
        assert!(second.is_err());

        first.shutdown().await;
    }
}
