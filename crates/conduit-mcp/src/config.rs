//! Configuration types for MCP servers.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Top-level MCP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

impl McpConfig {
    /// Load a TOML config file. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, McpError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No MCP config at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(McpError::Io(e)),
        };
        Self::parse(&content)
            .map_err(|e| McpError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text.
    pub fn parse(content: &str) -> Result<Self, McpError> {
        let config: Self = toml::from_str(content).map_err(|e| McpError::Config(e.to_string()))?;
        for (name, server) in &config.servers {
            if server.command.trim().is_empty() {
                return Err(McpError::Config(format!(
                    "server '{name}' has an empty command"
                )));
            }
        }
        Ok(config)
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to run (e.g., "npx", "python"). Executed directly, not via a shell.
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Timeout for requests in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl McpServerConfig {
    /// A server launched as `command args...` with default settings.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_server() {
        let toml_str = r#"
[servers.filesystem]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/home/user"]
"#;
        let config = McpConfig::parse(toml_str).unwrap();
        assert_eq!(config.servers.len(), 1);
        let fs = &config.servers["filesystem"];
        assert_eq!(fs.command, "npx");
        assert_eq!(fs.args.len(), 3);
        assert_eq!(fs.timeout_ms, 30000); // default
        assert!(fs.cwd.is_none());
    }

    #[test]
    fn parse_multiple_servers() {
        let toml_str = r#"
[servers.filesystem]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem"]

[servers.github]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-github"]
timeout_ms = 60000
cwd = "/srv/github"
"#;
        let config = McpConfig::parse(toml_str).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["github"].timeout_ms, 60000);
        assert_eq!(
            config.servers["github"].cwd.as_deref(),
            Some(Path::new("/srv/github"))
        );
    }

    #[test]
    fn parse_env_vars() {
        let toml_str = r#"
[servers.github]
command = "npx"
env = { GITHUB_TOKEN = "ghp_xxxx" }
"#;
        let config = McpConfig::parse(toml_str).unwrap();
        assert_eq!(config.servers["github"].env["GITHUB_TOKEN"], "ghp_xxxx");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = McpConfig::parse("[servers.bad]\ncommand = \"  \"\n").unwrap_err();
        assert!(matches!(err, McpError::Config(msg) if msg.contains("bad")));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = McpConfig::parse("[servers.x\ncommand=").unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = McpConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.toml");
        std::fs::write(&path, "[servers.echo]\ncommand = \"cat\"\n").unwrap();
        let config = McpConfig::load(&path).unwrap();
        assert_eq!(config.servers["echo"].command, "cat");
    }

    #[test]
    fn default_config_is_empty() {
        let config = McpConfig::default();
        assert!(config.servers.is_empty());
    }
}
