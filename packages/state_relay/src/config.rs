use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [relay]
//                    handshake_timeout_secs = 5
//
//   env var:         RELAY_RELAY__HANDSHAKE_TIMEOUT_SECS=5   (double underscore = nesting)
//
//   CLI flags override host, port and static dir after merging.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of static UI assets served outside `/ws`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// Relay tunables (lives under `[relay]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Frames queued per connection before the client counts as unreachable.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
            client_buffer: default_client_buffer(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}
fn default_handshake_timeout_secs() -> u64 {
    10
}
fn default_client_buffer() -> usize {
    64
}

/// Build a figment that layers: defaults → config.toml → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__PORT=8080`  →  `server.port = 8080`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used by the sessions)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// How long a new connection may take to send its role
    pub handshake_timeout: Duration,
    /// Outbound queue capacity per connection
    pub client_buffer: usize,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(fc.handshake_timeout_secs.max(1)),
            client_buffer: fc.client_buffer.max(1),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&RelayFileConfig::default())
    }
}
