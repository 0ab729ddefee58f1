//! Conduit CLI: talk to MCP servers from the terminal.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use conduit_mcp::{McpClient, McpConfig, McpManager, McpServerConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conduit", version, about = "Inspect and call MCP servers over stdio")]
struct Cli {
    /// Config file (default: ~/.conduit/mcp.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Configured server to talk to
    #[arg(short, long)]
    server: Option<String>,

    /// Program to spawn instead of a configured server
    #[arg(long, conflicts_with = "server")]
    exec: Option<String>,

    /// Argument for --exec (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true, requires = "exec")]
    exec_args: Vec<String>,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured servers
    Servers,
    /// Print namespaced tool definitions for every configured server
    Definitions,
    #[command(flatten)]
    Server(ServerCommand),
}

/// Subcommands that talk to a single server.
#[derive(Subcommand)]
enum ServerCommand {
    /// List the server's tools
    Tools,
    /// Call a tool
    Call {
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List the server's resources
    Resources,
    /// Read a resource by URI
    Read { uri: String },
    /// List the server's prompts
    Prompts,
    /// Render a prompt
    Prompt {
        name: String,
        /// Prompt argument as KEY=VALUE (repeatable)
        #[arg(short = 'a', long = "argument", value_parser = parse_key_value)]
        arguments: Vec<(String, String)>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_dir().join("mcp.toml"));
    let config = McpConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!(
        "Loaded {} MCP server(s) from {}",
        config.servers.len(),
        config_path.display()
    );

    match &cli.command {
        Command::Servers => {
            let mut names: Vec<_> = config.servers.iter().collect();
            names.sort_by(|a, b| a.0.cmp(b.0));
            for (name, server) in names {
                println!("{name}\t{} {}", server.command, server.args.join(" "));
            }
            Ok(())
        }
        Command::Definitions => {
            let manager = McpManager::start(&config).await;
            let definitions = manager.tool_definitions().await;
            manager.shutdown().await;
            print_json(&definitions)
        }
        Command::Server(command) => {
            let (name, server) = select_server(&cli, &config)?;
            let client = McpClient::connect_stdio(name.clone(), &server)
                .await
                .with_context(|| format!("Failed to connect to MCP server '{name}'"))?;
            let outcome = run(&client, command).await;
            client.shutdown().await;
            outcome
        }
    }
}

async fn run(client: &McpClient, command: &ServerCommand) -> Result<()> {
    match command {
        ServerCommand::Tools => print_json(&client.list_tools().await?),
        ServerCommand::Call { name, args } => {
            let arguments: Value =
                serde_json::from_str(args).context("--args must be a JSON object")?;
            if !arguments.is_object() {
                bail!("--args must be a JSON object");
            }
            let result = client.call_tool(name, arguments).await?;
            print_json(&result)?;
            if result.is_error {
                bail!("Tool '{name}' reported an error");
            }
            Ok(())
        }
        ServerCommand::Resources => print_json(&client.list_resources().await?),
        ServerCommand::Read { uri } => print_json(&client.read_resource(uri).await?),
        ServerCommand::Prompts => print_json(&client.list_prompts().await?),
        ServerCommand::Prompt { name, arguments } => {
            let arguments: HashMap<String, String> = arguments.iter().cloned().collect();
            print_json(&client.get_prompt(name, &arguments).await?)
        }
    }
}

/// Resolve which server to talk to: `--exec`, `--server`, or the only configured one.
fn select_server(cli: &Cli, config: &McpConfig) -> Result<(String, McpServerConfig)> {
    let (name, mut server) = if let Some(program) = &cli.exec {
        (
            program.clone(),
            McpServerConfig::new(program.clone(), cli.exec_args.clone()),
        )
    } else if let Some(name) = &cli.server {
        let server = config
            .servers
            .get(name)
            .with_context(|| format!("No server named '{name}' in config"))?;
        (name.clone(), server.clone())
    } else {
        let mut servers = config.servers.iter();
        match (servers.next(), servers.next()) {
            (Some((name, server)), None) => (name.clone(), server.clone()),
            _ => bail!("Choose a server with --server <NAME> or spawn one with --exec <PROGRAM>"),
        }
    };

    if let Some(timeout_ms) = cli.timeout_ms {
        server.timeout_ms = timeout_ms;
    }
    Ok((name, server))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

/// Get the Conduit config directory path (~/.conduit/).
fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CONDUIT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conduit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_prompt_arguments() {
        let cli = Cli::parse_from([
            "conduit", "--server", "fs", "prompt", "review", "-a", "lang=rust", "-a", "style=a=b",
        ]);
        match cli.command {
            Command::Server(ServerCommand::Prompt { name, arguments }) => {
                assert_eq!(name, "review");
                assert_eq!(arguments[0], ("lang".to_string(), "rust".to_string()));
                assert_eq!(arguments[1], ("style".to_string(), "a=b".to_string()));
            }
            _ => panic!("Expected prompt command"),
        }
    }

    #[test]
    fn top_level_and_server_commands_parse() {
        assert!(matches!(
            Cli::parse_from(["conduit", "definitions"]).command,
            Command::Definitions
        ));
        match Cli::parse_from(["conduit", "read", "file:///a.txt"]).command {
            Command::Server(ServerCommand::Read { uri }) => assert_eq!(uri, "file:///a.txt"),
            _ => panic!("Expected read command"),
        }
    }

    #[test]
    fn key_value_requires_equals() {
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn exec_builds_adhoc_server() {
        let cli = Cli::parse_from([
            "conduit", "--exec", "npx", "--arg", "-y", "--arg", "server-fs", "--timeout-ms", "500",
            "tools",
        ]);
        let (name, server) = select_server(&cli, &McpConfig::default()).unwrap();
        assert_eq!(name, "npx");
        assert_eq!(server.args, vec!["-y", "server-fs"]);
        assert_eq!(server.timeout_ms, 500);
    }

    #[test]
    fn single_configured_server_is_default() {
        let config = McpConfig::parse("[servers.only]\ncommand = \"cat\"\n").unwrap();
        let cli = Cli::parse_from(["conduit", "tools"]);
        let (name, server) = select_server(&cli, &config).unwrap();
        assert_eq!(name, "only");
        assert_eq!(server.command, "cat");
    }

    #[test]
    fn ambiguous_server_is_an_error() {
        let config =
            McpConfig::parse("[servers.a]\ncommand = \"cat\"\n[servers.b]\ncommand = \"cat\"\n")
                .unwrap();
        let cli = Cli::parse_from(["conduit", "tools"]);
        assert!(select_server(&cli, &config).is_err());
    }
}
