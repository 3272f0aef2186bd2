use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, TransportMode, get_config_dir, show_config};
use crate::mcp::{HttpMcpServer, Implementation, McpServer, ToolRegistry};

/// Name reported to clients during initialize
pub const SERVER_NAME: &str = "mcp-starter";

/// Command line values that take precedence over `config.toml`
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub transport: Option<TransportMode>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ServerOverrides {
    #[inline]
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(host) = &self.host {
            config.server.set_host(host.clone())?;
        }
        if let Some(port) = self.port {
            config.server.set_port(port)?;
        }
        Ok(())
    }
}

/// Load configuration from `config_dir`, or from the default directory
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let config_dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir().context("Failed to determine config directory")?,
    };
    Config::load(&config_dir)
}

/// Build the server with the default tool registry
#[inline]
pub fn build_server(config: &Config) -> Result<McpServer> {
    let registry = ToolRegistry::with_default_tools(&config.assets);
    let server_info = Implementation {
        name: SERVER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    McpServer::new(server_info, registry).context("Failed to create MCP server")
}

/// Start the MCP server on the configured transport and block until the
/// client disconnects or Ctrl+C is received
#[inline]
pub async fn serve_mcp(config: Config) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    info!("Starting {}", SERVER_NAME);

    if !config.assets.flower_image.exists() {
        warn!(
            "Flower image {} does not exist yet; get_name_and_image_of_flower will fail until it does",
            config.assets.flower_image.display()
        );
    }

    let server = Arc::new(build_server(&config)?);
    info!(
        "MCP server initialized with tools: {}",
        server.registry().tool_names().join(", ")
    );

    match config.server.transport {
        TransportMode::Stdio => {
            tokio::select! {
                result = server.serve_stdio() => {
                    if let Err(e) = &result {
                        error!("MCP server error: {:#}", e);
                    }
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received interrupt signal, shutting down");
                }
            }
        }
        TransportMode::Http => {
            let http = HttpMcpServer::start(Arc::clone(&server), &config.server.bind_address())
                .await?;
            info!("Serving MCP over HTTP at {}", http.url());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for interrupt signal")?;
            info!("Received interrupt signal, shutting down");
            http.shutdown().await;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Print the effective configuration after overrides
#[inline]
pub fn show_configuration(config: &Config) -> Result<()> {
    show_config(config).context("Failed to render configuration")
}
