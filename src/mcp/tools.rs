//! MCP Tools Implementation
//!
//! The explicit tool registry built at startup, and the two tools this server
//! exposes: an integer adder and a flower image lookup.

use crate::config::AssetConfig;
use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

pub const ADD_TOOL: &str = "add";
pub const FLOWER_TOOL: &str = "get_name_and_image_of_flower";
pub const FLOWER_NAME: &str = "Lily";

/// Integer addition tool handler
pub struct AddHandler;

/// Flower name and image tool handler
pub struct FlowerHandler {
    image_path: PathBuf,
    mime_type: String,
}

impl AddHandler {
    /// Create the add tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: ADD_TOOL.to_string(),
            description: Some(
                "Add two numbers. Returns the sum of the two integers, as a string.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "a": {
                        "type": "integer",
                        "description": "the first integer to be added"
                    },
                    "b": {
                        "type": "integer",
                        "description": "the second integer to be added"
                    }
                },
                "required": ["a", "b"],
                "additionalProperties": false
            }),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "result": {
                        "type": "integer",
                        "description": "a + b"
                    }
                },
                "required": ["result"]
            })),
        }
    }

    /// Sum two 64-bit integers, rejecting overflow
    #[inline]
    pub fn add(a: i64, b: i64) -> McpResult<i64> {
        a.checked_add(b).ok_or_else(|| McpError::ToolExecutionFailed {
            tool: ADD_TOOL.to_string(),
            message: format!("{} + {} overflows a 64-bit integer", a, b),
        })
    }
}

fn integer_argument(args: &HashMap<String, Value>, name: &str) -> McpResult<i64> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| McpError::InvalidToolParameters {
            tool: ADD_TOOL.to_string(),
            message: format!("'{}' must be a 64-bit integer", name),
        })
}

#[async_trait]
impl ToolHandler for AddHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let a = integer_argument(&args, "a")?;
        let b = integer_argument(&args, "b")?;

        let sum = Self::add(a, b)?;
        debug!("add: {} + {} = {}", a, b, sum);

        Ok(CallToolResult::success(vec![ToolContent::text(sum.to_string())])
            .with_structured_content(json!({ "result": sum })))
    }
}

impl FlowerHandler {
    #[inline]
    pub fn new(image_path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            mime_type: mime_type.into(),
        }
    }

    #[inline]
    pub fn from_config(assets: &AssetConfig) -> Self {
        Self::new(&assets.flower_image, &assets.flower_mime_type)
    }

    /// Create the get_name_and_image_of_flower tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: FLOWER_TOOL.to_string(),
            description: Some(
                "Get the name and image of flower. Returns the name of the flower and its image."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            output_schema: None,
        }
    }
}

#[async_trait]
impl ToolHandler for FlowerHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Reading flower image from {}", self.image_path.display());

        let bytes = tokio::fs::read(&self.image_path).await.map_err(|e| {
            error!(
                "Failed to read flower image {}: {}",
                self.image_path.display(),
                e
            );
            McpError::ToolExecutionFailed {
                tool: FLOWER_TOOL.to_string(),
                message: format!(
                    "Failed to read image file {}: {}",
                    self.image_path.display(),
                    e
                ),
            }
        })?;

        let encoded = STANDARD.encode(&bytes);

        Ok(CallToolResult::success(vec![
            ToolContent::text(FLOWER_NAME),
            ToolContent::image(encoded, self.mime_type.as_str()),
        ]))
    }
}

/// A tool definition paired with the handler that executes it
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

/// Tool registry mapping tool names to their definition and handler.
/// Tools are listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new tool registry
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier tool with the same name
    #[inline]
    pub fn register<H>(&mut self, definition: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let entry = RegisteredTool {
            definition,
            handler: Arc::new(handler),
        };

        match self
            .tools
            .iter_mut()
            .find(|tool| tool.definition.name == entry.definition.name)
        {
            Some(existing) => {
                debug!("Replacing tool: {}", entry.definition.name);
                *existing = entry;
            }
            None => {
                debug!("Registered tool: {}", entry.definition.name);
                self.tools.push(entry);
            }
        }
    }

    /// Get all registered tool definitions
    #[inline]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.definitions().cloned().collect()
    }

    #[inline]
    pub fn definitions(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().map(|tool| &tool.definition)
    }

    #[inline]
    pub fn tool_names(&self) -> Vec<&str> {
        self.definitions().map(|tool| tool.name.as_str()).collect()
    }

    /// Get a specific tool by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.definition.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Create the registry with the adder and flower tools
    #[inline]
    pub fn with_default_tools(assets: &AssetConfig) -> Self {
        let mut registry = Self::new();

        registry.register(AddHandler::tool_definition(), AddHandler);
        registry.register(
            FlowerHandler::tool_definition(),
            FlowerHandler::from_config(assets),
        );

        registry
    }
}
