use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use navmap_merge::MergeConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default port of the HTTP API.
pub const DEFAULT_PORT: u16 = 7420;

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Refuse requests that carry no bearer token.
    pub require_auth: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            require_auth: false,
        }
    }
}

/// Where documents are persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".navmap"),
        }
    }
}

/// Top-level configuration file, `navmap.toml`.
///
/// ```toml
/// [server]
/// bind_addr = "0.0.0.0:7420"
///
/// [store]
/// root = "/var/lib/navmap"
///
/// [merge]
/// max_attempts = 8
/// rejection_policy = "demote_route"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavmapConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub merge: MergeConfig,
}

impl NavmapConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load a config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
