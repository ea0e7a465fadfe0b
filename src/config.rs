// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for tempusd.
//!
//! JSON5 configuration format supporting:
//! - Listening port and single-interface restriction
//! - Address family enable/disable
//! - Multicast groups to join at startup
//! - Comments and trailing commas

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

use crate::recvbuf::RECV_INIT;

/// Startup/running configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// UDP port to bind on every interface
    #[serde(default = "default_port")]
    pub port: u16,

    /// Restrict listening to a single named interface.
    /// Unset means listen on every usable interface.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub interface: Option<String>,

    /// Accept interface aliases (names containing ':')
    #[serde(default)]
    pub listen_virtual: bool,

    /// Enable IPv4 sockets (subject to a kernel support probe)
    #[serde(default = "default_true")]
    pub enable_ipv4: bool,

    /// Enable IPv6 sockets (subject to a kernel support probe)
    #[serde(default = "default_true")]
    pub enable_ipv6: bool,

    /// Act as a broadcast client (open broadcast reception sockets)
    #[serde(default)]
    pub broadcast_client: bool,

    /// Multicast groups to join at startup
    #[serde(default)]
    pub multicast_groups: Vec<IpAddr>,

    /// Receive buffers to preallocate
    #[serde(default = "default_recv_buffers")]
    pub recv_buffers: usize,

    /// Seconds between statistics log lines (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_port() -> u16 {
    123
}

fn default_true() -> bool {
    true
}

fn default_recv_buffers() -> usize {
    RECV_INIT
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            interface: None,
            listen_virtual: false,
            enable_ipv4: true,
            enable_ipv6: true,
            broadcast_client: false,
            multicast_groups: Vec::new(),
            recv_buffers: default_recv_buffers(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to JSON5 string (with pretty formatting)
    pub fn to_json5(&self) -> String {
        // json5 crate doesn't have pretty printing, so we use serde_json for output
        // and rely on json5 for input (which handles comments and trailing commas)
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort { port: 0 });
        }

        if let Some(name) = &self.interface {
            validate_interface_name(name)?;
        }

        if !self.enable_ipv4 && !self.enable_ipv6 {
            return Err(ConfigError::NoAddressFamily);
        }

        for group in &self.multicast_groups {
            if !group.is_multicast() {
                return Err(ConfigError::InvalidMulticastAddress { address: *group });
            }
        }

        if self.recv_buffers == 0 {
            return Err(ConfigError::InvalidBufferCount {
                count: self.recv_buffers,
            });
        }

        Ok(())
    }
}

/// Validate an interface name
fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::InvalidInterfaceName {
            name: name.to_string(),
            reason: "interface name cannot be empty".to_string(),
        });
    }
    if name.len() > 15 {
        // Linux IFNAMSIZ limit
        return Err(ConfigError::InvalidInterfaceName {
            name: name.to_string(),
            reason: "interface name too long (max 15 chars)".to_string(),
        });
    }
    // Aliases like "eth0:1" are valid names here; alias acceptance is decided
    // separately by the listen_virtual policy.
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ':')
    {
        return Err(ConfigError::InvalidInterfaceName {
            name: name.to_string(),
            reason: "interface name contains invalid characters".to_string(),
        });
    }
    if name.chars().next().map(|c| c.is_ascii_digit()) == Some(true) {
        return Err(ConfigError::InvalidInterfaceName {
            name: name.to_string(),
            reason: "interface name cannot start with a digit".to_string(),
        });
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(std::path::PathBuf, String),
    ParseError(String),
    InvalidPort { port: u16 },
    InvalidInterfaceName { name: String, reason: String },
    NoAddressFamily,
    InvalidMulticastAddress { address: IpAddr },
    InvalidBufferCount { count: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to read config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidPort { port } => write!(f, "invalid listen port {}", port),
            ConfigError::InvalidInterfaceName { name, reason } => {
                write!(f, "invalid interface name '{}': {}", name, reason)
            }
            ConfigError::NoAddressFamily => {
                write!(f, "both address families disabled; nothing to bind")
            }
            ConfigError::InvalidMulticastAddress { address } => {
                write!(f, "invalid multicast group address {}", address)
            }
            ConfigError::InvalidBufferCount { count } => {
                write!(f, "invalid receive buffer count {}", count)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
