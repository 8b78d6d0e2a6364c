//! V2Ray config artifact model.
//!
//! The process launcher consumes a JSON config document describing the local
//! inbound listeners and the single outbound built from a parsed share link.
//! The structs here mirror that document; everything a descriptor carries —
//! address, port, identity, transport/security parameters — is encoded
//! losslessly so the launcher sees exactly what was parsed.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::parser::{ConnectionDescriptor, Protocol};

pub mod inbound;
pub mod outbound;
pub mod util;

use inbound::Inbound;
use outbound::Outbound;

/// Local HTTP inbound port used when the caller supplies none.
pub const DEFAULT_HTTP_PORT: u16 = 2300;

/// Local SOCKS inbound port used when the caller supplies none.
pub const DEFAULT_SOCKS_PORT: u16 = 2301;

// ============================================================================
// Config Document
// ============================================================================

/// Complete config artifact handed to the launcher.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct V2RayConfig {
    /// Local listener configurations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbounds: Vec<Inbound>,

    /// Upstream proxy configurations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<Outbound>,
}

impl V2RayConfig {
    /// Serialize the configuration to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize the configuration to a pretty-printed JSON string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Building From a Descriptor
// ============================================================================

/// Resolves a caller-supplied port, substituting `default` for anything that
/// is not a usable port number (non-positive or above 65535).
pub fn effective_port(requested: i32, default: u16) -> u16 {
    u16::try_from(requested)
        .ok()
        .filter(|p| *p > 0)
        .unwrap_or(default)
}

/// Renders the launcher config for a descriptor: HTTP and SOCKS inbounds on
/// loopback plus one protocol outbound.
pub fn build_config(
    descriptor: &ConnectionDescriptor,
    http_port: u16,
    socks_port: u16,
) -> V2RayConfig {
    let outbound = match descriptor.protocol {
        Protocol::Vless => Outbound::vless(descriptor),
        Protocol::Vmess => Outbound::vmess(descriptor),
        Protocol::Shadowsocks => Outbound::shadowsocks(descriptor),
    };

    V2RayConfig {
        inbounds: vec![
            Inbound::http("127.0.0.1", http_port),
            Inbound::socks("127.0.0.1", socks_port),
        ],
        outbounds: vec![outbound],
    }
}

/// Writes the pretty-printed config artifact for a descriptor to `path`.
pub fn write_config_artifact(
    descriptor: &ConnectionDescriptor,
    http_port: u16,
    socks_port: u16,
    path: &Path,
) -> Result<()> {
    let config = build_config(descriptor, http_port, socks_port);
    let json = config
        .to_json_pretty()
        .context("Failed to serialize config artifact")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write config artifact to {}", path.display()))?;
    Ok(())
}
