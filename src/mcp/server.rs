//! MCP Server Implementation
//!
//! Connection handling and message routing for the tools held in a
//! [`ToolRegistry`]. Messages are newline-delimited JSON-RPC 2.0.

use crate::mcp::errors::{ErrorHandler, McpError};
use crate::mcp::protocol::*;
use crate::mcp::tools::ToolRegistry;
use crate::mcp::validation::McpValidator;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    registry: ToolRegistry,
    connection_state: RwLock<ConnectionState>,
    validator: McpValidator,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Routes one decoded message to the matching server operation
pub struct MessageHandler<'a> {
    server: &'a McpServer,
}

impl McpServer {
    /// Create a new MCP server serving the tools in `registry`
    #[inline]
    pub fn new(server_info: Implementation, registry: ToolRegistry) -> Result<Self> {
        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let validator = McpValidator::with_tools(registry.definitions())?;

        Ok(Self {
            server_info,
            capabilities,
            registry,
            connection_state: RwLock::new(ConnectionState::Uninitialized),
            validator,
        })
    }

    #[inline]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Read messages from `reader` until EOF, writing replies to `writer`
    #[inline]
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some(reply) = self.handle_line(trimmed).await {
                        Self::send_message(&mut writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from input: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;

        info!("MCP server stopped");
        Ok(())
    }

    /// Decode, validate and dispatch one raw message. Returns the reply to
    /// send back, or `None` for notifications and client responses.
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                let error_response = JsonRpcErrorResponse::new(JsonRpcError::parse_error(), None);
                return Some(JsonRpcMessage::ErrorResponse(error_response));
            }
        };

        match self.validator.validate_raw_message(&raw_value) {
            Ok(message) => MessageHandler::new(self).process_message(message).await,
            Err(e) => {
                let id = raw_value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                let error = McpError::InvalidRequest {
                    message: format!("Invalid Request: {}", e),
                };
                error.log();
                Some(error.to_error_response(id))
            }
        }
    }

    async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }
}

impl<'a> MessageHandler<'a> {
    #[inline]
    pub fn new(server: &'a McpServer) -> Self {
        Self { server }
    }

    /// Process an incoming message, producing the reply if one is owed
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request: {}", request.method);

        if let Err(e) = self
            .server
            .validator
            .validate_method_params(&request.method, request.params.as_ref())
        {
            e.log();
            return e.to_error_response(Some(request.id));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        match result {
            Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(value, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                *self.server.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or_default())
            .map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid initialize parameters: {}", e),
            })?;

        let protocol_version = self
            .server
            .validator
            .negotiate_protocol_version(&params.protocol_version);
        if protocol_version != params.protocol_version {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, protocol_version
            );
        }

        *self.server.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: Some(format!(
                "Available tools: {}",
                self.server.registry.tool_names().join(", ")
            )),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    #[inline]
    pub fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.server.registry.list_tools(),
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or_default())
            .map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid tool call parameters: {}", e),
            })?;

        let tool = self
            .server
            .registry
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound {
                name: params.name.clone(),
            })?;

        self.server
            .validator
            .validate_tool_arguments(&params.name, params.arguments.as_ref())?;

        debug!("Calling tool: {}", params.name);
        let result = tool.handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}
