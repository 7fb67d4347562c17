//! Viewer configuration: baked-in defaults, an optional TOML file, and
//! environment overrides, resolved in that order.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::discovery;

const DEFAULT_DISCOVERY_PORT: u16 = 46144;

/// Viewer configuration. Read from `~/.config/lenslink/config.toml` or
/// `/etc/lenslink/config.toml`, whichever exists first; each field can then
/// be overridden through `LENSLINK_STREAM_PORT`, `LENSLINK_DISCOVERY_PORT`
/// and `LENSLINK_DISCOVERY_GROUP`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Streamer WebSocket port.
    pub stream_port: u16,
    /// Discovery UDP port.
    pub discovery_port: u16,
    /// Discovery group or host probes are sent to.
    pub discovery_group: IpAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_port: lenslink_core::DEFAULT_STREAM_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_group: IpAddr::V4(discovery::MULTICAST_GROUP),
        }
    }
}

impl Config {
    /// Where discovery probes are sent.
    pub fn discovery_dest(&self) -> SocketAddr {
        SocketAddr::new(self.discovery_group, self.discovery_port)
    }
}

/// Resolve the effective configuration.
pub fn load() -> Config {
    let mut cfg = from_file().unwrap_or_default();
    override_from_env("LENSLINK_STREAM_PORT", &mut cfg.stream_port);
    override_from_env("LENSLINK_DISCOVERY_PORT", &mut cfg.discovery_port);
    override_from_env("LENSLINK_DISCOVERY_GROUP", &mut cfg.discovery_group);
    cfg
}

/// Parse the first config file present on disk. A file that exists but
/// cannot be read or parsed is reported and skipped.
fn from_file() -> Option<Config> {
    let candidates = [
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/lenslink/config.toml")),
        Some(PathBuf::from("/etc/lenslink/config.toml")),
    ];
    let path = candidates.into_iter().flatten().find(|p| p.exists())?;
    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| toml::from_str(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(cfg) => Some(cfg),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring invalid config file");
            None
        }
    }
}

/// Replace `slot` when `var` is set to a parseable value; an unset or
/// malformed variable leaves the current value in place.
fn override_from_env<T: FromStr>(var: &str, slot: &mut T) {
    if let Some(value) = std::env::var(var).ok().and_then(|raw| raw.parse().ok()) {
        *slot = value;
    }
}
