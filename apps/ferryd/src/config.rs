//! Daemon configuration.
//!
//! Read from the TOML file named by `FERRY_CONFIG`, else `ferry.toml` in
//! the working directory. Every field has a default and a missing file
//! means all defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ferry_protocol::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use ferry_transfer::DispatchMode;
use ferry_transfer::dispatch::DEFAULT_MAX_HANDLERS;

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "FERRY_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "ferry.toml";

/// How the socket listener schedules connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketMode {
    /// One upload at a time.
    #[default]
    Serial,
    /// Up to `max_handlers` uploads at once.
    Pooled,
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding stored files (created if missing).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Socket framing port.
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,

    /// Call framing (WebSocket) port.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Largest chunk read, accepted or produced, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub socket_mode: SocketMode,

    /// Concurrent connections per pooled listener.
    #[serde(default = "default_max_handlers")]
    pub max_handlers: usize,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_socket_port() -> u16 {
    ferry_socket::DEFAULT_SOCKET_PORT
}

fn default_rpc_port() -> u16 {
    ferry_rpc::DEFAULT_RPC_PORT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_handlers() -> usize {
    DEFAULT_MAX_HANDLERS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            socket_port: default_socket_port(),
            rpc_port: default_rpc_port(),
            chunk_size: default_chunk_size(),
            socket_mode: SocketMode::default(),
            max_handlers: default_max_handlers(),
        }
    }
}

impl Config {
    /// Loads the configuration from [`config_path`].
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads the configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(path = %path.display(), "configuration file read");
            config
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_size <= MAX_CHUNK_SIZE,
            "chunk_size must not exceed {MAX_CHUNK_SIZE} bytes"
        );
        anyhow::ensure!(self.max_handlers > 0, "max_handlers must be positive");
        Ok(())
    }

    pub fn socket_dispatch(&self) -> DispatchMode {
        match self.socket_mode {
            SocketMode::Serial => DispatchMode::Serial,
            SocketMode::Pooled => DispatchMode::Pooled {
                max_handlers: self.max_handlers,
            },
        }
    }

    /// The call listener always runs pooled.
    pub fn rpc_dispatch(&self) -> DispatchMode {
        DispatchMode::Pooled {
            max_handlers: self.max_handlers,
        }
    }
}

/// `FERRY_CONFIG` if set, else `ferry.toml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
