use clap::{Args, Parser, Subcommand};
use mcp_starter::Result;
use mcp_starter::commands::{ServerOverrides, load_config, serve_mcp, show_configuration};
use mcp_starter::config::TransportMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-starter")]
#[command(about = "MCP server with an integer adder and a flower image tool")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.mcp-starter)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server (the default when no command is given)
    Serve(ServeArgs),
    /// Show the effective configuration
    Config(ServeArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Transport to serve on
    #[arg(long, value_enum)]
    transport: Option<TransportMode>,
    /// Bind host for the http transport
    #[arg(long)]
    host: Option<String>,
    /// Bind port for the http transport
    #[arg(long)]
    port: Option<u16>,
}

impl From<ServeArgs> for ServerOverrides {
    fn from(args: ServeArgs) -> Self {
        Self {
            transport: args.transport,
            host: args.host,
            port: args.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config_dir.as_deref())?;

    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            ServerOverrides::from(args).apply(&mut config)?;
            serve_mcp(config).await?;
        }
        Commands::Config(args) => {
            ServerOverrides::from(args).apply(&mut config)?;
            show_configuration(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn no_command_defaults_to_serve() {
        let cli = Cli::try_parse_from(["mcp-starter"]).expect("should parse");
        assert!(cli.command.is_none());
        assert!(cli.config_dir.is_none());
    }

    #[test]
    fn serve_command_with_overrides() {
        let cli = Cli::try_parse_from([
            "mcp-starter",
            "serve",
            "--transport",
            "http",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .expect("should parse");

        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.transport, Some(TransportMode::Http));
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(9000));
            }
            _ => panic!("Expected serve command"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["mcp-starter", "config", "--config-dir", "/tmp/starter"])
            .expect("should parse");

        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/starter")));
        assert!(matches!(cli.command, Some(Commands::Config(_))));
    }

    #[test]
    fn invalid_transport() {
        let cli = Cli::try_parse_from(["mcp-starter", "serve", "--transport", "websocket"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidValue);
        } else {
            panic!("Expected invalid transport to be rejected");
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mcp-starter", "invalid"]);

        if let Err(err) = cli {
            assert!(matches!(
                err.kind(),
                ErrorKind::InvalidSubcommand | ErrorKind::UnknownArgument
            ));
        } else {
            panic!("Expected invalid subcommand to be rejected");
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mcp-starter", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
