//! MCP Message Validation
//!
//! JSON schema validation for incoming JSON-RPC envelopes, the parameters of
//! the methods this server implements, and the arguments of each registered
//! tool.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

const TOOL_SCHEMA_PREFIX: &str = "tool:";

/// JSON Schema validator for MCP messages and tool arguments
#[derive(Debug)]
pub struct McpValidator {
    schemas: HashMap<String, JSONSchema>,
}

impl McpValidator {
    /// Create a new MCP validator with built-in schemas
    #[inline]
    pub fn new() -> Result<Self> {
        let mut validator = Self {
            schemas: HashMap::new(),
        };

        validator.load_builtin_schemas()?;

        Ok(validator)
    }

    /// Create a validator that also knows the input schema of every given tool
    #[inline]
    pub fn with_tools<'a, I>(tools: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Tool>,
    {
        let mut validator = Self::new()?;
        for tool in tools {
            validator.add_tool_schema(tool)?;
        }
        Ok(validator)
    }

    fn load_builtin_schemas(&mut self) -> Result<()> {
        let id_schema = json!({
            "oneOf": [
                {"type": "string"},
                {"type": "integer"}
            ]
        });

        let request_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "method": {"type": "string"},
                "params": {"type": ["object", "array"]},
                "id": id_schema
            },
            "required": ["jsonrpc", "method", "id"]
        });
        self.add_schema("jsonrpc_request", &request_schema)?;

        let notification_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "method": {"type": "string"},
                "params": {"type": ["object", "array"]}
            },
            "required": ["jsonrpc", "method"],
            "not": {"required": ["id"]}
        });
        self.add_schema("jsonrpc_notification", &notification_schema)?;

        let response_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "result": {},
                "id": id_schema
            },
            "required": ["jsonrpc", "result", "id"]
        });
        self.add_schema("jsonrpc_response", &response_schema)?;

        let error_response_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "error": {
                    "type": "object",
                    "properties": {
                        "code": {"type": "integer"},
                        "message": {"type": "string"}
                    },
                    "required": ["code", "message"]
                }
            },
            "required": ["jsonrpc", "error", "id"]
        });
        self.add_schema("jsonrpc_error_response", &error_response_schema)?;

        let initialize_params_schema = json!({
            "type": "object",
            "properties": {
                "protocolVersion": {"type": "string"},
                "capabilities": {"type": "object"},
                "clientInfo": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "version": {"type": "string"}
                    },
                    "required": ["name", "version"]
                }
            },
            "required": ["protocolVersion", "clientInfo"]
        });
        self.add_schema("initialize_params", &initialize_params_schema)?;

        let call_tool_params_schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "arguments": {"type": "object"}
            },
            "required": ["name"]
        });
        self.add_schema("call_tool_params", &call_tool_params_schema)?;

        Ok(())
    }

    /// Add a JSON schema to the validator
    #[inline]
    pub fn add_schema(&mut self, name: &str, schema: &Value) -> Result<()> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| anyhow!("Failed to compile schema '{}': {}", name, e))?;

        self.schemas.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Compile a tool's declared input schema for argument checks
    #[inline]
    pub fn add_tool_schema(&mut self, tool: &Tool) -> Result<()> {
        let name = format!("{}{}", TOOL_SCHEMA_PREFIX, tool.name);
        self.add_schema(&name, &tool.input_schema)
    }

    /// Validate the envelope of a JSON-RPC request
    #[inline]
    pub fn validate_request(&self, request: &JsonRpcRequest) -> Result<()> {
        let request_value = serde_json::to_value(request)?;
        self.validate_with_schema("jsonrpc_request", &request_value)
    }

    /// Validate the parameters of a method that takes them. Absent and
    /// malformed parameters both fail with `InvalidParameters`.
    #[inline]
    pub fn validate_method_params(&self, method: &str, params: Option<&Value>) -> McpResult<()> {
        let schema_name = match method {
            "initialize" => "initialize_params",
            "tools/call" => "call_tool_params",
            _ => {
                debug!("No parameter validation schema for method: {}", method);
                return Ok(());
            }
        };

        let Some(params) = params else {
            return Err(McpError::InvalidParameters {
                message: format!("{} request missing parameters", method),
            });
        };

        self.validate_with_schema(schema_name, params)
            .map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid {} parameters: {}", method, e),
            })
    }

    /// Validate tool arguments against the tool's declared input schema.
    /// Missing arguments are checked as an empty object.
    #[inline]
    pub fn validate_tool_arguments(
        &self,
        tool_name: &str,
        arguments: Option<&HashMap<String, Value>>,
    ) -> McpResult<()> {
        let schema_name = format!("{}{}", TOOL_SCHEMA_PREFIX, tool_name);
        let schema = self
            .schemas
            .get(&schema_name)
            .ok_or_else(|| McpError::ToolNotFound {
                name: tool_name.to_string(),
            })?;

        let instance = match arguments {
            Some(args) => serde_json::to_value(args)?,
            None => json!({}),
        };

        if let Err(errors) = schema.validate(&instance) {
            let messages: Vec<String> = errors.map(|e| describe_error(&e)).collect();
            return Err(McpError::InvalidToolParameters {
                tool: tool_name.to_string(),
                message: messages.join(", "),
            });
        }

        Ok(())
    }

    /// Validate a value against a named schema
    #[inline]
    pub fn validate_with_schema(&self, schema_name: &str, value: &Value) -> Result<()> {
        let schema = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| anyhow!("Schema '{}' not found", schema_name))?;

        if let Err(errors) = schema.validate(value) {
            let error_messages: Vec<String> = errors.map(|e| describe_error(&e)).collect();

            return Err(anyhow!(
                "Schema validation failed for '{}': {}",
                schema_name,
                error_messages.join(", ")
            ));
        }

        Ok(())
    }

    /// Validate a raw JSON value as a JSON-RPC message
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> Result<JsonRpcMessage> {
        if let Ok(request) = serde_json::from_value::<JsonRpcRequest>(value.clone()) {
            self.validate_request(&request)?;
            return Ok(JsonRpcMessage::Request(request));
        }

        if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value.clone()) {
            self.validate_with_schema("jsonrpc_response", value)?;
            return Ok(JsonRpcMessage::Response(response));
        }

        if let Ok(error_response) = serde_json::from_value::<JsonRpcErrorResponse>(value.clone()) {
            self.validate_with_schema("jsonrpc_error_response", value)?;
            return Ok(JsonRpcMessage::ErrorResponse(error_response));
        }

        if let Ok(notification) = serde_json::from_value::<JsonRpcNotification>(value.clone()) {
            self.validate_with_schema("jsonrpc_notification", value)?;
            return Ok(JsonRpcMessage::Notification(notification));
        }

        Err(anyhow!(
            "Value does not match any known JSON-RPC message type"
        ))
    }

    /// Pick the protocol version to answer an initialize request with: the
    /// requested one when supported, otherwise the latest this server speaks
    #[inline]
    pub fn negotiate_protocol_version(&self, requested: &str) -> &'static str {
        SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .copied()
            .find(|version| *version == requested)
            .unwrap_or(MCP_VERSION)
    }
}

fn describe_error(error: &jsonschema::ValidationError<'_>) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", path, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder_tool() -> Tool {
        Tool {
            name: "add".to_string(),
            description: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"],
                "additionalProperties": false
            }),
            output_schema: None,
        }
    }

    #[test]
    fn validator_creation() {
        assert!(McpValidator::new().is_ok());
    }

    #[test]
    fn protocol_version_negotiation() {
        let validator = McpValidator::new().expect("validator");
        assert_eq!(validator.negotiate_protocol_version("2024-11-05"), "2024-11-05");
        assert_eq!(validator.negotiate_protocol_version(MCP_VERSION), MCP_VERSION);
        assert_eq!(validator.negotiate_protocol_version("2099-01-01"), MCP_VERSION);
        assert_eq!(validator.negotiate_protocol_version(""), MCP_VERSION);
    }

    #[test]
    fn request_validation() {
        let validator = McpValidator::new().expect("validator");

        let request = JsonRpcRequest::new("tools/list", None, RequestId::Number(1));
        assert!(validator.validate_request(&request).is_ok());

        let mut wrong_version = request;
        wrong_version.jsonrpc = "1.0".to_string();
        assert!(validator.validate_request(&wrong_version).is_err());
    }

    #[test]
    fn initialize_params_validation() {
        let validator = McpValidator::new().expect("validator");

        let valid = json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "inspector", "version": "0.1.0"}
        });
        assert!(
            validator
                .validate_method_params("initialize", Some(&valid))
                .is_ok()
        );

        let missing_client = json!({"protocolVersion": MCP_VERSION});
        let err = validator
            .validate_method_params("initialize", Some(&missing_client))
            .expect_err("clientInfo is required");
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("clientInfo"));
    }

    #[test]
    fn call_tool_params_validation() {
        let validator = McpValidator::new().expect("validator");

        let empty = validator
            .validate_method_params("tools/call", Some(&json!({})))
            .expect_err("name is required");
        let absent = validator
            .validate_method_params("tools/call", None)
            .expect_err("params are required");
        assert_eq!(
            empty.to_jsonrpc_error().code,
            error_codes::INVALID_PARAMS
        );
        assert_eq!(
            absent.to_jsonrpc_error().code,
            error_codes::INVALID_PARAMS
        );

        assert!(validator.validate_method_params("tools/list", None).is_ok());
    }

    #[test]
    fn request_envelope_ignores_method_params() {
        let validator = McpValidator::new().expect("validator");

        let message = validator
            .validate_raw_message(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {}
            }))
            .expect("envelope is valid");
        assert!(matches!(message, JsonRpcMessage::Request(_)));
    }

    #[test]
    fn raw_message_classification() {
        let validator = McpValidator::new().expect("validator");

        let request = validator
            .validate_raw_message(&json!({"jsonrpc": "2.0", "id": "a", "method": "ping"}))
            .expect("request");
        assert!(matches!(request, JsonRpcMessage::Request(_)));

        let notification = validator
            .validate_raw_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .expect("notification");
        assert!(matches!(notification, JsonRpcMessage::Notification(_)));

        assert!(validator.validate_raw_message(&json!([1, 2, 3])).is_err());
        assert!(
            validator
                .validate_raw_message(&json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"}))
                .is_err()
        );
    }

    #[test]
    fn tool_arguments_checked_against_input_schema() {
        let validator = McpValidator::with_tools([&adder_tool()]).expect("validator");

        let mut args = HashMap::new();
        args.insert("a".to_string(), json!(2));
        args.insert("b".to_string(), json!(3));
        assert!(validator.validate_tool_arguments("add", Some(&args)).is_ok());

        args.insert("b".to_string(), json!("three"));
        let err = validator
            .validate_tool_arguments("add", Some(&args))
            .expect_err("string argument should be rejected");
        assert!(matches!(err, McpError::InvalidToolParameters { .. }));

        let err = validator
            .validate_tool_arguments("add", None)
            .expect_err("missing arguments should be rejected");
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn unknown_tool_arguments() {
        let validator = McpValidator::new().expect("validator");
        let err = validator
            .validate_tool_arguments("multiply", None)
            .expect_err("unknown tool");
        assert!(matches!(err, McpError::ToolNotFound { .. }));
    }
}
