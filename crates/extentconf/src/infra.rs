//! Configuration sections.

use extent::{FlushPolicy, DEFAULT_EXTENT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default TCP port of the extent server, shared by server and client.
pub const DEFAULT_PORT: u16 = 8989;

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one file per persisted extent.
    /// Default: .extents (relative to the working directory)
    #[serde(default = "PathsConfig::default_extent_dir")]
    pub extent_dir: PathBuf,
}

impl PathsConfig {
    fn default_extent_dir() -> PathBuf {
        PathBuf::from(".extents")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            extent_dir: Self::default_extent_dir(),
        }
    }
}

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8989
    #[serde(default = "BindConfig::default_port")]
    pub port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_PORT
    }

    /// `host:port` for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Client-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "ClientConfig::default_server_host")]
    pub server_host: String,

    #[serde(default = "ClientConfig::default_server_port")]
    pub server_port: u16,

    /// Maximum extent size in bytes when splitting files.
    /// Default: 4096
    #[serde(default = "ClientConfig::default_chunk_size")]
    pub chunk_size: usize,
}

impl ClientConfig {
    fn default_server_host() -> String {
        "localhost".to_string()
    }

    fn default_server_port() -> u16 {
        DEFAULT_PORT
    }

    fn default_chunk_size() -> usize {
        DEFAULT_EXTENT_SIZE
    }

    /// `host:port` for `TcpStream::connect`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: Self::default_server_host(),
            server_port: Self::default_server_port(),
            chunk_size: Self::default_chunk_size(),
        }
    }
}

/// Extent store behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which extents are written when a connection closes.
    #[serde(default)]
    pub flush_policy: FlushPolicy,
}

/// Logging and tracing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `extentd=debug,warn`.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Unset means local logging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}
