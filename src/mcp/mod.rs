//! MCP (Model Context Protocol) Server Implementation
//!
//! A small JSON-RPC 2.0 server speaking the tool subset of MCP over stdio or
//! HTTP POST.


pub mod errors;
pub mod http;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod validation;

pub use errors::{ErrorHandler, McpError, McpResult};
pub use http::HttpMcpServer;
pub use protocol::*;
pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
pub use tools::{AddHandler, FlowerHandler, ToolRegistry};
